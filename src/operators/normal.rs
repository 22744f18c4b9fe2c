//! Weighted normal-equation operator `sum_i w_i A_i^H A_i`

use std::sync::Arc;

use super::{check_io, LinearOperator};
use crate::error::{DeblurError, Result};
use crate::utils::vector_ops::axpy;
use crate::volume::{Dims, Volume};

/// Sum of weighted normal terms over a fixed, ordered set of operators.
///
/// Terms are accumulated in registration order, so results are reproducible
/// for a given registration. Self-adjoint, and positive semi-definite as long
/// as every weight is non-negative.
#[derive(Clone)]
pub struct NormalEquationOperator {
    dims: Dims,
    terms: Vec<Arc<dyn LinearOperator>>,
}

impl std::fmt::Debug for NormalEquationOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.terms.iter().map(|t| t.name()).collect();
        f.debug_struct("NormalEquationOperator")
            .field("dims", &self.dims)
            .field("terms", &names)
            .finish()
    }
}

impl NormalEquationOperator {
    /// Empty operator over volumes of shape `dims`.
    pub fn new(dims: Dims) -> Self {
        Self {
            dims,
            terms: Vec::new(),
        }
    }

    /// Register another weighted operator.
    pub fn add_term(&mut self, term: Arc<dyn LinearOperator>) -> Result<()> {
        if term.domain_dims() != self.dims {
            return Err(DeblurError::shape(format!(
                "{} has domain {:?} but the normal equations act on {:?}",
                term.name(),
                term.domain_dims(),
                self.dims
            )));
        }
        self.terms.push(term);
        Ok(())
    }

    pub fn terms(&self) -> &[Arc<dyn LinearOperator>] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl LinearOperator for NormalEquationOperator {
    fn name(&self) -> String {
        format!("normal[{} terms]", self.terms.len())
    }

    fn domain_dims(&self) -> Dims {
        self.dims
    }

    fn range_dims(&self) -> Dims {
        self.dims
    }

    fn weight(&self) -> f64 {
        1.0
    }

    fn apply_into(&self, x: &Volume, out: &mut Volume) -> Result<()> {
        check_io(self, x, self.dims, out, self.dims)?;
        out.as_mut_slice().fill(num_complex::Complex64::new(0.0, 0.0));

        // one forward and one backward buffer per call, shared by every term
        let mut back = Volume::zeros(self.dims)?;
        let mut forward: Option<Volume> = None;
        for term in &self.terms {
            let range = term.range_dims();
            let buf = match forward.take() {
                Some(v) if v.dims() == range => v,
                _ => Volume::zeros(range)?,
            };
            let buf = forward.insert(buf);
            term.apply_into(x, buf)?;
            term.apply_adjoint_into(buf, &mut back)?;
            axpy(out.as_mut_slice(), term.weight(), back.as_slice());
        }
        Ok(())
    }

    fn apply_adjoint_into(&self, y: &Volume, out: &mut Volume) -> Result<()> {
        self.apply_into(y, out)
    }
}
