//! First difference along one spatial axis

use super::{check_io, check_weight, LinearOperator};
use crate::error::{DeblurError, Result};
use crate::utils::gradient::{
    forward_difference_adjoint_inplace, forward_difference_inplace, Axis, Boundary,
};
use crate::volume::{Dims, Volume};

/// `y[i] = x[i+1] - x[i]` along one axis; domain and range share a shape.
///
/// The boundary policy is fixed at construction and used by both `apply` and
/// `apply_adjoint`.
#[derive(Debug, Clone)]
pub struct DirectionalDifferenceOperator {
    axis: Axis,
    dims: Dims,
    boundary: Boundary,
    weight: f64,
}

impl DirectionalDifferenceOperator {
    /// Periodic difference along `axis`.
    pub fn new(axis: Axis, dims: Dims, weight: f64) -> Result<Self> {
        Self::with_boundary(axis, dims, Boundary::Periodic, weight)
    }

    /// Difference operator from an axis index (0 = x, 1 = y, 2 = z).
    pub fn from_axis_index(index: usize, dims: Dims, weight: f64) -> Result<Self> {
        let axis = Axis::from_index(index)
            .ok_or_else(|| DeblurError::config("axis", index, "0, 1 or 2"))?;
        Self::new(axis, dims, weight)
    }

    pub fn with_boundary(axis: Axis, dims: Dims, boundary: Boundary, weight: f64) -> Result<Self> {
        check_weight("difference", weight)?;
        if dims.contains(&0) {
            return Err(DeblurError::shape(format!(
                "difference operator shape {:?} has an empty axis",
                dims
            )));
        }
        Ok(Self {
            axis,
            dims,
            boundary,
            weight,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }
}

impl LinearOperator for DirectionalDifferenceOperator {
    fn name(&self) -> String {
        format!("difference[{:?}]", self.axis)
    }

    fn domain_dims(&self) -> Dims {
        self.dims
    }

    fn range_dims(&self) -> Dims {
        self.dims
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn apply_into(&self, x: &Volume, out: &mut Volume) -> Result<()> {
        check_io(self, x, self.dims, out, self.dims)?;
        forward_difference_inplace(
            out.as_mut_slice(),
            x.as_slice(),
            self.dims,
            self.axis,
            self.boundary,
        );
        Ok(())
    }

    fn apply_adjoint_into(&self, y: &Volume, out: &mut Volume) -> Result<()> {
        check_io(self, y, self.dims, out, self.dims)?;
        forward_difference_adjoint_inplace(
            out.as_mut_slice(),
            y.as_slice(),
            self.dims,
            self.axis,
            self.boundary,
        );
        Ok(())
    }
}
