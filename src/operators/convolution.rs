//! Circular convolution with a fixed kernel

use num_complex::Complex64;
use rayon::prelude::*;
use tracing::debug;

use super::{check_io, check_weight, LinearOperator};
use crate::error::Result;
use crate::fft::Fft3dPlan;
use crate::volume::{try_zeroed, Dims, Volume};

/// Convolution `A x = k (*) x` with periodic boundaries.
///
/// The kernel has the same shape as the image and its origin at `(0, 0, 0)`,
/// so an impulse there is the identity. Its spectrum is computed once; apply
/// multiplies by `K` and the adjoint by `conj(K)` under the same periodic
/// policy, which keeps the pair exactly adjoint.
#[derive(Debug)]
pub struct ConvolutionOperator {
    kernel_hat: Vec<Complex64>,
    plan: Fft3dPlan,
    weight: f64,
}

impl ConvolutionOperator {
    pub fn new(kernel: &Volume, weight: f64) -> Result<Self> {
        check_weight("convolution", weight)?;

        let dims = kernel.dims();
        let plan = Fft3dPlan::new(dims);
        let mut kernel_hat = try_zeroed(kernel.len())?;
        kernel_hat.copy_from_slice(kernel.as_slice());
        plan.forward(&mut kernel_hat);

        debug!(?dims, weight, "convolution operator ready");
        Ok(Self {
            kernel_hat,
            plan,
            weight,
        })
    }

    fn filter(&self, input: &Volume, out: &mut Volume, conjugate: bool) {
        let data = out.as_mut_slice();
        data.copy_from_slice(input.as_slice());
        self.plan.forward(data);
        data.par_iter_mut()
            .zip(self.kernel_hat.par_iter())
            .for_each(|(v, k)| *v *= if conjugate { k.conj() } else { *k });
        self.plan.inverse(data);
    }
}

impl LinearOperator for ConvolutionOperator {
    fn name(&self) -> String {
        "convolution".to_string()
    }

    fn domain_dims(&self) -> Dims {
        self.plan.dims()
    }

    fn range_dims(&self) -> Dims {
        self.plan.dims()
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn apply_into(&self, x: &Volume, out: &mut Volume) -> Result<()> {
        check_io(self, x, self.domain_dims(), out, self.range_dims())?;
        self.filter(x, out, false);
        Ok(())
    }

    fn apply_adjoint_into(&self, y: &Volume, out: &mut Volume) -> Result<()> {
        check_io(self, y, self.range_dims(), out, self.domain_dims())?;
        self.filter(y, out, true);
        Ok(())
    }
}
