//! Regularization groups and their shrinkage
//!
//! A group is a set of operators that share one auxiliary variable `d` and one
//! Bregman multiplier `b`. Members of a group are shrunk jointly: per voxel the
//! magnitude is taken over all members, which gives isotropic coupling across
//! axes instead of independent per-axis thresholding.

use std::sync::Arc;

use num_complex::Complex64;
use rayon::prelude::*;

use crate::error::{DeblurError, Result};
use crate::operators::LinearOperator;
use crate::volume::{Dims, Volume};

/// Operators sharing one joint shrinkage/multiplier pair.
#[derive(Clone)]
pub struct RegularizationGroup {
    operators: Vec<Arc<dyn LinearOperator>>,
    sparsity_weight: f64,
}

impl std::fmt::Debug for RegularizationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.operators.iter().map(|op| op.name()).collect();
        f.debug_struct("RegularizationGroup")
            .field("operators", &names)
            .field("sparsity_weight", &self.sparsity_weight)
            .finish()
    }
}

impl RegularizationGroup {
    /// Group from one or more operators.
    ///
    /// Members must agree on domain, range and weight, since they share one
    /// threshold.
    pub fn new(operators: Vec<Arc<dyn LinearOperator>>) -> Result<Self> {
        let Some(first) = operators.first() else {
            return Err(DeblurError::config(
                "regularization group",
                "empty",
                "at least one operator",
            ));
        };
        let (domain, range, weight) = (first.domain_dims(), first.range_dims(), first.weight());

        for op in &operators[1..] {
            if op.domain_dims() != domain || op.range_dims() != range {
                return Err(DeblurError::shape(format!(
                    "{} maps {:?} -> {:?} but its group maps {:?} -> {:?}",
                    op.name(),
                    op.domain_dims(),
                    op.range_dims(),
                    domain,
                    range
                )));
            }
            if op.weight() != weight {
                return Err(DeblurError::config(
                    format!("{} weight", op.name()),
                    op.weight(),
                    format!("{weight} (shared by its group)"),
                ));
            }
        }

        Ok(Self {
            operators,
            sparsity_weight: 1.0,
        })
    }

    /// Group holding a single operator.
    pub fn single(operator: Arc<dyn LinearOperator>) -> Result<Self> {
        Self::new(vec![operator])
    }

    /// Scale of the L1 term this group penalises (default 1).
    pub fn with_sparsity_weight(mut self, sparsity_weight: f64) -> Result<Self> {
        if !sparsity_weight.is_finite() || sparsity_weight < 0.0 {
            return Err(DeblurError::config(
                "sparsity_weight",
                sparsity_weight,
                "a finite value >= 0",
            ));
        }
        self.sparsity_weight = sparsity_weight;
        Ok(self)
    }

    pub fn operators(&self) -> &[Arc<dyn LinearOperator>] {
        &self.operators
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Whether members are shrunk jointly.
    pub fn is_joint(&self) -> bool {
        self.operators.len() > 1
    }

    pub fn sparsity_weight(&self) -> f64 {
        self.sparsity_weight
    }

    /// Weight shared by every member.
    pub fn weight(&self) -> f64 {
        self.operators[0].weight()
    }

    pub fn domain_dims(&self) -> Dims {
        self.operators[0].domain_dims()
    }

    pub fn range_dims(&self) -> Dims {
        self.operators[0].range_dims()
    }

    /// Soft-threshold level `sparsity_weight / weight` (infinite for a zero weight).
    pub fn threshold(&self) -> f64 {
        let weight = self.weight();
        if weight > 0.0 {
            self.sparsity_weight / weight
        } else {
            f64::INFINITY
        }
    }
}

/// Auxiliary variable and multiplier of one group, one volume per member.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupState {
    pub d: Vec<Volume>,
    pub b: Vec<Volume>,
}

impl GroupState {
    /// Zero `d` and `b` shaped like the group's range.
    pub fn zeros(group: &RegularizationGroup) -> Result<Self> {
        let dims = group.range_dims();
        let d = (0..group.len())
            .map(|_| Volume::zeros(dims))
            .collect::<Result<Vec<_>>>()?;
        let b = d.clone();
        Ok(Self { d, b })
    }
}

/// Joint soft-thresholding of `z` into `d`.
///
/// Per voxel, with `s = sqrt(sum_j |z_j|^2)`, each component becomes
/// `d_j = max(s - threshold, 0) * z_j / s`. A single member reduces to the
/// complex soft threshold. At `threshold == 0` the output equals the input.
/// Every `z_j` and `d_j` must share one shape.
pub(crate) fn shrink_jointly(z: &[Volume], threshold: f64, d: &mut [Volume]) -> Result<()> {
    if z.len() != d.len() {
        return Err(DeblurError::shape(format!(
            "joint shrinkage of {} inputs into {} outputs",
            z.len(),
            d.len()
        )));
    }
    let Some(first) = z.first() else {
        return Ok(());
    };
    let dims = first.dims();
    for v in z.iter().chain(d.iter()) {
        v.ensure_dims(dims, "joint shrinkage member")?;
    }
    let n = first.len();

    let factors: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let s = z.iter().map(|zj| zj.as_slice()[i].norm_sqr()).sum::<f64>().sqrt();
            if s > threshold {
                (s - threshold) / s
            } else {
                0.0
            }
        })
        .collect();

    for (dj, zj) in d.iter_mut().zip(z) {
        dj.as_mut_slice()
            .par_iter_mut()
            .zip(zj.as_slice().par_iter().zip(factors.par_iter()))
            .for_each(|(out, (&zi, &f))| {
                *out = if f == 0.0 { Complex64::new(0.0, 0.0) } else { zi * f };
            });
    }
    Ok(())
}

/// `sum_voxels sqrt(sum_j |v_j|^2)`: the joint (mixed 2,1) norm of a group's output.
pub fn joint_l1_norm(v: &[Volume]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let n = v[0].len();
    let chunk = crate::utils::vector_ops::REDUCTION_CHUNK;
    let partials: Vec<f64> = (0..n.div_ceil(chunk))
        .into_par_iter()
        .map(|c| {
            (c * chunk..((c + 1) * chunk).min(n))
                .map(|i| v.iter().map(|vj| vj.as_slice()[i].norm_sqr()).sum::<f64>().sqrt())
                .sum::<f64>()
        })
        .collect();
    partials.into_iter().fold(0.0, |acc, p| acc + p)
}
