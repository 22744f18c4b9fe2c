//! Conjugate gradient solver
//!
//! Solves `A x = b` for a symmetric positive (semi-)definite operator `A`
//! given as a [`LinearOperator`], starting from a caller-supplied guess.
//!
//! ```text
//! r = b - A*x;  p = r;  rr = <r, r>
//! for k in 1..=max_iterations:
//!     Ap = A*p
//!     alpha = rr / <p, Ap>
//!     x += alpha * p
//!     r -= alpha * Ap
//!     if ||r|| < tolerance: converged
//!     beta = <r, r> / rr
//!     p = r + beta * p
//! ```
//!
//! The tolerance is absolute. Hitting the iteration cap is not an error; the
//! outcome says whether the tolerance was reached.

use tracing::{debug, trace, warn};

use crate::error::{DeblurError, Result, Stage};
use crate::operators::LinearOperator;
use crate::report::{CgSummary, ProgressReporter};
use crate::utils::vector_ops::{axpy, dot, norm_squared, xpby};
use crate::volume::Volume;

/// Default absolute residual tolerance.
pub const DEFAULT_CG_TOLERANCE: f64 = 1e-8;

/// Result of one CG run.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    pub solution: Volume,
    /// Iterations actually performed (0 when the initial guess already satisfied the tolerance).
    pub iterations: usize,
    /// `||b - A x||` at exit.
    pub residual_norm: f64,
    /// Whether `residual_norm < tolerance`.
    pub converged: bool,
}

impl CgOutcome {
    pub fn summary(&self) -> CgSummary {
        CgSummary {
            iterations: self.iterations,
            residual_norm: self.residual_norm,
            converged: self.converged,
        }
    }
}

/// Conjugate gradient configuration. The solve itself holds no state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConjugateGradientSolver {
    tolerance: f64,
    max_iterations: usize,
}

impl Default for ConjugateGradientSolver {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_CG_TOLERANCE,
            max_iterations: 20,
        }
    }
}

impl ConjugateGradientSolver {
    /// `tolerance` must be finite and >= 0, `max_iterations` at least 1.
    pub fn new(tolerance: f64, max_iterations: usize) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(DeblurError::config(
                "cg_tolerance",
                tolerance,
                "a finite value >= 0",
            ));
        }
        if max_iterations == 0 {
            return Err(DeblurError::config("cg_iterations", 0, ">= 1"));
        }
        Ok(Self {
            tolerance,
            max_iterations,
        })
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run CG on `op x = rhs` from `x0`.
    ///
    /// Divergence errors are tagged `Stage::InnerSolve { outer_iteration: 0 }`;
    /// callers inside an outer loop re-tag them with the real iteration.
    pub fn solve<'r>(
        &self,
        op: &dyn LinearOperator,
        rhs: &Volume,
        x0: Volume,
        mut reporter: Option<&mut (dyn ProgressReporter + 'r)>,
    ) -> Result<CgOutcome> {
        let dims = op.domain_dims();
        rhs.ensure_dims(dims, "CG right-hand side")?;
        x0.ensure_dims(dims, "CG initial guess")?;

        let mut x = x0;

        // r = b - A*x
        let mut r = op.apply(&x)?;
        xpby(r.as_mut_slice(), rhs.as_slice(), -1.0);

        let mut rr = norm_squared(r.as_slice());
        let mut residual = rr.sqrt();
        if !residual.is_finite() {
            return Err(divergence(0, residual, "initial residual is not finite"));
        }

        debug!(
            operator = %op.name(),
            tol = self.tolerance,
            max_iter = self.max_iterations,
            initial_residual = residual,
            "CG start"
        );

        if residual < self.tolerance {
            debug!("CG: initial guess already within tolerance");
            return Ok(finish(
                CgOutcome {
                    solution: x,
                    iterations: 0,
                    residual_norm: residual,
                    converged: true,
                },
                reporter,
            ));
        }

        let mut p = r.clone();
        let mut ap = Volume::zeros(dims)?;
        let mut iterations = 0;
        let mut converged = false;

        for k in 1..=self.max_iterations {
            op.apply_into(&p, &mut ap)?;

            // <p, Ap> is real for a self-adjoint operator
            let pap = dot(p.as_slice(), ap.as_slice()).re;
            if !pap.is_finite() {
                return Err(divergence(k, residual, "<p, Ap> is not finite"));
            }
            if pap <= 0.0 {
                warn!("CG: non-positive <p, Ap> = {pap:.4e} at iteration {k}");
                return Err(divergence(
                    k,
                    residual,
                    format!("<p, Ap> = {pap:.6e} <= 0; no further progress possible"),
                ));
            }

            let alpha = rr / pap;
            axpy(x.as_mut_slice(), alpha, p.as_slice());
            axpy(r.as_mut_slice(), -alpha, ap.as_slice());

            let rr_new = norm_squared(r.as_slice());
            residual = rr_new.sqrt();
            iterations = k;

            if !residual.is_finite() {
                return Err(divergence(k, residual, "residual is not finite"));
            }

            trace!("CG iter {k}: ||r|| = {residual:.6e}");
            if let Some(rep) = reporter.as_deref_mut() {
                rep.cg_iteration(k, residual);
            }

            if residual < self.tolerance {
                converged = true;
                debug!("CG converged at iteration {k}: ||r|| = {residual:.6e}");
                break;
            }

            // p = r + beta * p
            let beta = rr_new / rr;
            xpby(p.as_mut_slice(), r.as_slice(), beta);
            rr = rr_new;
        }

        if !converged {
            let message = format!(
                "CG stopped after {iterations} iterations without reaching tolerance {:.1e} (||r|| = {residual:.3e})",
                self.tolerance
            );
            debug!("{message}");
            if let Some(rep) = reporter.as_deref_mut() {
                rep.warning(&message);
            }
        }

        Ok(finish(
            CgOutcome {
                solution: x,
                iterations,
                residual_norm: residual,
                converged,
            },
            reporter,
        ))
    }
}

fn finish(outcome: CgOutcome, reporter: Option<&mut (dyn ProgressReporter + '_)>) -> CgOutcome {
    if let Some(rep) = reporter {
        rep.cg_finished(&outcome.summary());
    }
    outcome
}

fn divergence(iteration: usize, residual: f64, detail: impl Into<String>) -> DeblurError {
    DeblurError::NumericalDivergence {
        stage: Stage::InnerSolve { outer_iteration: 0 },
        iteration,
        residual,
        detail: detail.into(),
    }
}
