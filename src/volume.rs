//! Dense complex 3D volumes
//!
//! Samples are stored in Fortran (column-major) order, `index = i + j*nx + k*nx*ny`,
//! so the x-axis is contiguous.

use num_complex::Complex64;

use crate::error::{DeblurError, Result, Stage};

/// Shape of a volume as `[nx, ny, nz]`.
pub type Dims = [usize; 3];

/// Index into a 3D array stored in Fortran order
#[inline(always)]
pub fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

/// Allocate a zero-filled buffer, surfacing allocation failure instead of aborting.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<Complex64>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| DeblurError::ResourceExhaustion {
            stage: Stage::Setup,
            elements: len,
        })?;
    data.resize(len, Complex64::new(0.0, 0.0));
    Ok(data)
}

/// A complex-valued volume with a fixed shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    dims: Dims,
    data: Vec<Complex64>,
}

impl Volume {
    /// Zero-filled volume of the given shape.
    pub fn zeros(dims: Dims) -> Result<Self> {
        let len = checked_len(&dims)?;
        Ok(Self {
            dims,
            data: try_zeroed(len)?,
        })
    }

    /// Volume with every sample set to `value`.
    pub fn filled(dims: Dims, value: Complex64) -> Result<Self> {
        let mut vol = Self::zeros(dims)?;
        vol.data.fill(value);
        Ok(vol)
    }

    /// Build a volume from an arbitrary shape and its samples.
    ///
    /// Anything but a rank-3 shape with non-zero extents is rejected; the core
    /// never guesses a missing axis.
    pub fn from_shape_vec(shape: &[usize], data: Vec<Complex64>) -> Result<Self> {
        if shape.len() != 3 {
            return Err(DeblurError::shape(format!(
                "expected a rank-3 volume, got rank {} with shape {:?}",
                shape.len(),
                shape
            )));
        }
        let dims = [shape[0], shape[1], shape[2]];
        let len = checked_len(&dims)?;
        if data.len() != len {
            return Err(DeblurError::shape(format!(
                "shape {:?} needs {} samples but {} were supplied",
                dims,
                len,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Build a volume from real samples (imaginary parts zero).
    pub fn from_real(dims: Dims, values: &[f64]) -> Result<Self> {
        let data = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        Self::from_shape_vec(&dims, data)
    }

    /// Zero volume with the same shape as `self`.
    pub fn zeros_like(&self) -> Result<Self> {
        Self::zeros(self.dims)
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    /// Sample at `(i, j, k)`, or `None` when any index is outside the shape.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<Complex64> {
        let [nx, ny, nz] = self.dims;
        if i >= nx || j >= ny || k >= nz {
            return None;
        }
        Some(self.data[idx3d(i, j, k, nx, ny)])
    }

    /// Elementwise magnitude `|v|`, in the same Fortran order.
    pub fn magnitude(&self) -> Vec<f64> {
        self.data.iter().map(|c| c.norm()).collect()
    }

    /// Fail with [`DeblurError::InputShape`] unless `self` has shape `dims`.
    pub fn ensure_dims(&self, dims: Dims, what: &str) -> Result<()> {
        if self.dims != dims {
            return Err(DeblurError::shape(format!(
                "{what} has shape {:?}, expected {:?}",
                self.dims, dims
            )));
        }
        Ok(())
    }
}

fn checked_len(dims: &Dims) -> Result<usize> {
    if dims.contains(&0) {
        return Err(DeblurError::shape(format!(
            "volume shape {:?} has an empty axis",
            dims
        )));
    }
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(DeblurError::ResourceExhaustion {
            stage: Stage::Setup,
            elements: usize::MAX,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_two_rejected() {
        let err = Volume::from_shape_vec(&[4, 4], vec![Complex64::new(1.0, 0.0); 16]).unwrap_err();
        assert!(matches!(err, DeblurError::InputShape { .. }), "{err}");
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Volume::from_shape_vec(&[2, 2, 2], vec![Complex64::new(0.0, 0.0); 7]).unwrap_err();
        assert!(matches!(err, DeblurError::InputShape { .. }));
    }

    #[test]
    fn test_empty_axis_rejected() {
        assert!(matches!(
            Volume::zeros([3, 0, 2]),
            Err(DeblurError::InputShape { .. })
        ));
    }

    #[test]
    fn test_overflowing_shape_is_resource_exhaustion() {
        let err = Volume::zeros([usize::MAX, 2, 2]).unwrap_err();
        assert!(matches!(err, DeblurError::ResourceExhaustion { .. }));
    }

    #[test]
    fn test_fortran_indexing() {
        let values: Vec<f64> = (0..24).map(|v| v as f64).collect();
        let vol = Volume::from_real([2, 3, 4], &values).unwrap();
        // i + j*nx + k*nx*ny
        assert_eq!(vol.get(1, 2, 3).unwrap().re, (1 + 2 * 2 + 3 * 6) as f64);
    }

    #[test]
    fn test_get_out_of_range() {
        let vol = Volume::zeros([2, 3, 4]).unwrap();
        assert!(vol.get(1, 2, 3).is_some());
        assert_eq!(vol.get(2, 0, 0), None);
        assert_eq!(vol.get(0, 3, 0), None);
        assert_eq!(vol.get(0, 0, 4), None);
    }

    #[test]
    fn test_magnitude() {
        let vol = Volume::filled([2, 2, 2], Complex64::new(3.0, 4.0)).unwrap();
        assert!(vol.magnitude().iter().all(|&m| (m - 5.0).abs() < 1e-12));
    }
}
