//! Directional first differences
//!
//! Forward difference along a single axis and its exact adjoint, on complex
//! volumes in Fortran order. Work is split over z-slabs with rayon.

use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::volume::Dims;

/// Spatial axis of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Axis from its index (0 = x, 1 = y, 2 = z).
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Axis::X),
            1 => Some(Axis::Y),
            2 => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// How the difference treats the last sample along the axis.
///
/// `Periodic`: `x[n] == x[0]`, so constant volumes have zero difference and the
/// operator commutes with circular convolution.
/// `Zero`: the difference at the last sample is zero (Neumann-style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    #[default]
    Periodic,
    Zero,
}

#[inline(always)]
fn forward_neighbor(pos: usize, n: usize, boundary: Boundary) -> Option<usize> {
    if pos + 1 < n {
        Some(pos + 1)
    } else {
        match boundary {
            Boundary::Periodic => Some(0),
            Boundary::Zero => None,
        }
    }
}

#[inline(always)]
fn backward_neighbor(pos: usize, n: usize, boundary: Boundary) -> Option<usize> {
    if pos > 0 {
        Some(pos - 1)
    } else {
        match boundary {
            Boundary::Periodic => Some(n - 1),
            Boundary::Zero => None,
        }
    }
}

/// Flat index of the neighbour of `(i, j, k)` along `axis`, if any.
#[inline(always)]
fn neighbor(
    (i, j, k): (usize, usize, usize),
    dims: Dims,
    axis: Axis,
    boundary: Boundary,
    step: fn(usize, usize, Boundary) -> Option<usize>,
) -> Option<usize> {
    let [nx, ny, nz] = dims;
    match axis {
        Axis::X => step(i, nx, boundary).map(|ip| ip + j * nx + k * nx * ny),
        Axis::Y => step(j, ny, boundary).map(|jp| i + jp * nx + k * nx * ny),
        Axis::Z => step(k, nz, boundary).map(|kp| i + j * nx + kp * nx * ny),
    }
}

/// Forward difference `out[i] = x[i+1] - x[i]` along `axis`.
pub fn forward_difference_inplace(
    out: &mut [Complex64],
    x: &[Complex64],
    dims: Dims,
    axis: Axis,
    boundary: Boundary,
) {
    let [nx, ny, _] = dims;
    let slab = nx * ny;
    debug_assert_eq!(out.len(), x.len());

    out.par_chunks_mut(slab).enumerate().for_each(|(k, out_slab)| {
        for j in 0..ny {
            for i in 0..nx {
                let idx = i + j * nx + k * slab;
                out_slab[i + j * nx] =
                    match neighbor((i, j, k), dims, axis, boundary, forward_neighbor) {
                        Some(next) => x[next] - x[idx],
                        None => Complex64::new(0.0, 0.0),
                    };
            }
        }
    });
}

/// Adjoint of [`forward_difference_inplace`]: `out[i] = y[i-1] - y[i]`,
/// restricted to the terms the forward boundary policy actually produced.
pub fn forward_difference_adjoint_inplace(
    out: &mut [Complex64],
    y: &[Complex64],
    dims: Dims,
    axis: Axis,
    boundary: Boundary,
) {
    let [nx, ny, _] = dims;
    let slab = nx * ny;
    debug_assert_eq!(out.len(), y.len());

    out.par_chunks_mut(slab).enumerate().for_each(|(k, out_slab)| {
        for j in 0..ny {
            for i in 0..nx {
                let pos = (i, j, k);
                let idx = i + j * nx + k * slab;
                let mut acc = Complex64::new(0.0, 0.0);
                if let Some(prev) = neighbor(pos, dims, axis, boundary, backward_neighbor) {
                    acc += y[prev];
                }
                if neighbor(pos, dims, axis, boundary, forward_neighbor).is_some() {
                    acc -= y[idx];
                }
                out_slab[i + j * nx] = acc;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::vector_ops::dot;

    fn field(n: usize, a: f64, b: f64) -> Vec<Complex64> {
        (0..n)
            .map(|i| Complex64::new((i as f64 * a).sin(), (i as f64 * b).cos()))
            .collect()
    }

    #[test]
    fn test_difference_of_constant_is_zero() {
        let dims = [4, 3, 5];
        let x = vec![Complex64::new(2.0, -1.0); 60];
        let mut out = vec![Complex64::new(9.0, 9.0); 60];
        for axis in Axis::ALL {
            forward_difference_inplace(&mut out, &x, dims, axis, Boundary::Periodic);
            assert!(out.iter().all(|v| v.norm() == 0.0));
        }
    }

    #[test]
    fn test_difference_values() {
        // x = i along the x axis, so the difference is 1 except at the wrap.
        let dims = [4, 2, 2];
        let x: Vec<Complex64> = (0..16).map(|n| Complex64::new((n % 4) as f64, 0.0)).collect();
        let mut out = vec![Complex64::new(0.0, 0.0); 16];

        forward_difference_inplace(&mut out, &x, dims, Axis::X, Boundary::Periodic);
        assert_eq!(out[0].re, 1.0);
        assert_eq!(out[3].re, -3.0);

        forward_difference_inplace(&mut out, &x, dims, Axis::X, Boundary::Zero);
        assert_eq!(out[2].re, 1.0);
        assert_eq!(out[3].re, 0.0);
    }

    #[test]
    fn test_adjoint_identity_all_axes_and_boundaries() {
        let dims = [5, 4, 3];
        let n = 60;
        let x = field(n, 0.7, 0.3);
        let y = field(n, 0.2, 1.3);
        let mut dx = vec![Complex64::new(0.0, 0.0); n];
        let mut dty = vec![Complex64::new(0.0, 0.0); n];

        for boundary in [Boundary::Periodic, Boundary::Zero] {
            for axis in Axis::ALL {
                forward_difference_inplace(&mut dx, &x, dims, axis, boundary);
                forward_difference_adjoint_inplace(&mut dty, &y, dims, axis, boundary);
                let lhs = dot(&dx, &y);
                let rhs = dot(&x, &dty);
                assert!(
                    (lhs - rhs).norm() < 1e-10,
                    "{axis:?}/{boundary:?}: {lhs} vs {rhs}"
                );
            }
        }
    }
}
