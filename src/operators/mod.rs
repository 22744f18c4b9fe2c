//! Linear operators on complex volumes
//!
//! - [`ConvolutionOperator`]: circular convolution with a fixed kernel (the blur model)
//! - [`DirectionalDifferenceOperator`]: first difference along one axis (regularization)
//! - [`NormalEquationOperator`]: `sum_i w_i A_i^H A_i` over a set of weighted operators
//!
//! Operators are immutable after construction and shared as
//! `Arc<dyn LinearOperator>` between the encoding model, the CG system and the
//! Split-Bregman bookkeeping.

pub mod convolution;
pub mod difference;
pub mod normal;

pub use convolution::*;
pub use difference::*;
pub use normal::*;

use crate::error::Result;
use crate::volume::{Dims, Volume};

/// A weighted linear map between volumes with an exact adjoint.
///
/// Implementations must satisfy `<apply(x), y> == <x, apply_adjoint(y)>` up to
/// rounding; conjugate gradient relies on it.
pub trait LinearOperator: Send + Sync {
    /// Short human-readable name used in logs.
    fn name(&self) -> String;

    /// Shape of the volumes `apply` accepts.
    fn domain_dims(&self) -> Dims;

    /// Shape of the volumes `apply` produces.
    fn range_dims(&self) -> Dims;

    /// Non-negative weight of this operator in the normal equations.
    fn weight(&self) -> f64;

    /// `out = A x`
    fn apply_into(&self, x: &Volume, out: &mut Volume) -> Result<()>;

    /// `out = A^H y`
    fn apply_adjoint_into(&self, y: &Volume, out: &mut Volume) -> Result<()>;

    /// Allocating form of [`LinearOperator::apply_into`].
    fn apply(&self, x: &Volume) -> Result<Volume> {
        let mut out = Volume::zeros(self.range_dims())?;
        self.apply_into(x, &mut out)?;
        Ok(out)
    }

    /// Allocating form of [`LinearOperator::apply_adjoint_into`].
    fn apply_adjoint(&self, y: &Volume) -> Result<Volume> {
        let mut out = Volume::zeros(self.domain_dims())?;
        self.apply_adjoint_into(y, &mut out)?;
        Ok(out)
    }
}

/// Reject weights that are negative or not finite.
pub(crate) fn check_weight(name: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(crate::error::DeblurError::config(
            format!("{name} weight"),
            weight,
            "a finite value >= 0",
        ));
    }
    Ok(())
}

/// Shape checks shared by every operator's `apply_into`/`apply_adjoint_into`.
pub(crate) fn check_io(
    op: &dyn LinearOperator,
    input: &Volume,
    input_dims: Dims,
    out: &Volume,
    out_dims: Dims,
) -> Result<()> {
    input.ensure_dims(input_dims, &format!("input of {}", op.name()))?;
    out.ensure_dims(out_dims, &format!("output of {}", op.name()))
}
