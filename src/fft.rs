//! 3D FFT using rustfft
//!
//! Plans are created once per shape and shared; scratch buffers are allocated
//! per call so a plan can be used from `&self`. Data is in Fortran order, so
//! x-lines are contiguous and z-slabs are contiguous blocks of `nx*ny`.

use std::sync::Arc;

use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::volume::{idx3d, Dims};

/// Cached forward/inverse plans for one volume shape.
pub struct Fft3dPlan {
    dims: Dims,
    fft_x: Arc<dyn Fft<f64>>,
    fft_y: Arc<dyn Fft<f64>>,
    fft_z: Arc<dyn Fft<f64>>,
    ifft_x: Arc<dyn Fft<f64>>,
    ifft_y: Arc<dyn Fft<f64>>,
    ifft_z: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Fft3dPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft3dPlan").field("dims", &self.dims).finish()
    }
}

impl Fft3dPlan {
    pub fn new(dims: Dims) -> Self {
        let [nx, ny, nz] = dims;
        let mut planner = FftPlanner::new();

        Self {
            dims,
            fft_x: planner.plan_fft(nx, FftDirection::Forward),
            fft_y: planner.plan_fft(ny, FftDirection::Forward),
            fft_z: planner.plan_fft(nz, FftDirection::Forward),
            ifft_x: planner.plan_fft(nx, FftDirection::Inverse),
            ifft_y: planner.plan_fft(ny, FftDirection::Inverse),
            ifft_z: planner.plan_fft(nz, FftDirection::Inverse),
        }
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// In-place forward 3D FFT (unnormalised, numpy `fftn` convention).
    pub fn forward(&self, data: &mut [Complex64]) {
        self.transform(data, &self.fft_x, &self.fft_y, &self.fft_z);
    }

    /// In-place inverse 3D FFT with 1/N normalisation.
    pub fn inverse(&self, data: &mut [Complex64]) {
        self.transform(data, &self.ifft_x, &self.ifft_y, &self.ifft_z);

        let n_total = data.len() as f64;
        data.par_iter_mut().for_each(|v| *v /= n_total);
    }

    fn transform(
        &self,
        data: &mut [Complex64],
        plan_x: &Arc<dyn Fft<f64>>,
        plan_y: &Arc<dyn Fft<f64>>,
        plan_z: &Arc<dyn Fft<f64>>,
    ) {
        let [nx, ny, nz] = self.dims;
        debug_assert_eq!(data.len(), nx * ny * nz);
        let slab = nx * ny;

        // x-axis: contiguous lines
        data.par_chunks_mut(nx).for_each_init(
            || vec![Complex64::new(0.0, 0.0); plan_x.get_inplace_scratch_len()],
            |scratch, line| plan_x.process_with_scratch(line, scratch),
        );

        // y-axis: gather/scatter within each z-slab
        data.par_chunks_mut(slab).for_each_init(
            || {
                (
                    vec![Complex64::new(0.0, 0.0); ny],
                    vec![Complex64::new(0.0, 0.0); plan_y.get_inplace_scratch_len()],
                )
            },
            |(buffer_y, scratch), slab_data| {
                for i in 0..nx {
                    for j in 0..ny {
                        buffer_y[j] = slab_data[i + j * nx];
                    }
                    plan_y.process_with_scratch(buffer_y, scratch);
                    for j in 0..ny {
                        slab_data[i + j * nx] = buffer_y[j];
                    }
                }
            },
        );

        // z-axis: stride nx*ny, done serially
        if nz > 1 {
            let mut buffer_z = vec![Complex64::new(0.0, 0.0); nz];
            let mut scratch_z = vec![Complex64::new(0.0, 0.0); plan_z.get_inplace_scratch_len()];
            for j in 0..ny {
                for i in 0..nx {
                    for k in 0..nz {
                        buffer_z[k] = data[idx3d(i, j, k, nx, ny)];
                    }
                    plan_z.process_with_scratch(&mut buffer_z, &mut scratch_z);
                    for k in 0..nz {
                        data[idx3d(i, j, k, nx, ny)] = buffer_z[k];
                    }
                }
            }
        }
    }
}
