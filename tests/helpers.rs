//! Shared helpers for the integration tests.
//!
//! Deterministic volume generators and float comparison utilities.

#![allow(dead_code)]

use num_complex::Complex64;
use sb_deblur::{Dims, Volume};

/// Minimal linear congruential generator for reproducible test data.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Uniform f64 in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform f64 in [lo, hi).
    pub fn next_f64_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// Volume with real and imaginary parts uniform in [-1, 1).
pub fn random_volume(dims: Dims, seed: u64) -> Volume {
    let mut rng = Lcg::new(seed);
    let n = dims.iter().product::<usize>();
    let data = (0..n)
        .map(|_| Complex64::new(rng.next_f64_range(-1.0, 1.0), rng.next_f64_range(-1.0, 1.0)))
        .collect();
    Volume::from_shape_vec(&dims, data).unwrap()
}

/// Kernel that is 1 at `offset` and 0 elsewhere; convolution shifts by `offset`.
pub fn delta_kernel(dims: Dims, offset: [usize; 3]) -> Volume {
    let mut kernel = Volume::zeros(dims).unwrap();
    let [nx, ny, _] = dims;
    kernel.as_mut_slice()[offset[0] + offset[1] * nx + offset[2] * nx * ny] =
        Complex64::new(1.0, 0.0);
    kernel
}

/// Normalised 3-tap box blur along x, centred on the origin.
pub fn box_kernel_x(dims: Dims) -> Volume {
    let mut kernel = Volume::zeros(dims).unwrap();
    let nx = dims[0];
    let w = Complex64::new(1.0 / 3.0, 0.0);
    let k = kernel.as_mut_slice();
    k[0] = w;
    k[1 % nx] += w;
    k[(nx - 1) % nx] += w;
    kernel
}

/// Largest elementwise distance between two volumes.
pub fn max_abs_diff(a: &Volume, b: &Volume) -> f64 {
    assert_eq!(a.dims(), b.dims());
    a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(x, y)| (x - y).norm())
        .fold(0.0, f64::max)
}
