//! Split-Bregman deconvolution
//!
//! Solves
//!
//! ```text
//! min_x  mu/2 ||E x - f||^2 + sum_g s_g ||R_g x||_{2,1}
//! ```
//!
//! by splitting `d_g = R_g x` with multipliers `b_g`. Each outer iteration:
//!
//! 1. `d_g = shrink(R_g x + b_g, s_g / lambda_g)` (jointly over group members)
//! 2. `b_g = b_g + R_g x - d_g`
//! 3. `rhs = mu E^H f + sum_g lambda_g R_g^H (d_g - b_g)`
//! 4. `(mu E^H E + sum_g lambda_g R_g^H R_g) x = rhs` by CG, warm-started
//!
//! The outer loop runs a fixed number of iterations. Steps 1-3 are exposed on
//! their own ([`SplitBregmanSolver::bregman_update`],
//! [`SplitBregmanSolver::assemble_rhs`]) so the transition can be driven and
//! inspected without running a full solve.

use std::sync::Arc;

use tracing::{debug, info};

use super::cg::ConjugateGradientSolver;
use super::regularization::{joint_l1_norm, shrink_jointly, GroupState, RegularizationGroup};
use crate::error::{DeblurError, Result, Stage};
use crate::operators::{LinearOperator, NormalEquationOperator};
use crate::report::ProgressReporter;
use crate::utils::vector_ops::{axpy, norm_squared, scale, sub_into};
use crate::volume::{Dims, Volume};

/// Bregman variables of every group, indexed like the solver's groups.
#[derive(Debug, Clone, PartialEq)]
pub struct BregmanState {
    pub groups: Vec<GroupState>,
}

/// Diagnostics of one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OuterRecord {
    /// 1-based outer iteration index.
    pub iteration: usize,
    /// CG iterations summed over the inner solves of this outer iteration.
    pub cg_iterations: usize,
    /// Residual norm of the last inner solve.
    pub cg_residual: f64,
    /// Whether every inner solve reached the CG tolerance.
    pub cg_converged: bool,
    /// Objective value at the new estimate.
    pub objective: f64,
}

/// Final estimate plus per-iteration history.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub image: Volume,
    pub history: Vec<OuterRecord>,
}

impl SolveOutcome {
    /// Elementwise magnitude of the reconstructed image.
    pub fn magnitude(&self) -> Vec<f64> {
        self.image.magnitude()
    }
}

/// Outer Split-Bregman loop around a CG inner solver.
#[derive(Clone)]
pub struct SplitBregmanSolver {
    encoding: Arc<dyn LinearOperator>,
    groups: Vec<RegularizationGroup>,
    cg: ConjugateGradientSolver,
    outer_iterations: usize,
    inner_iterations: usize,
}

impl std::fmt::Debug for SplitBregmanSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitBregmanSolver")
            .field("encoding", &self.encoding.name())
            .field("groups", &self.groups)
            .field("cg", &self.cg)
            .field("outer_iterations", &self.outer_iterations)
            .field("inner_iterations", &self.inner_iterations)
            .finish()
    }
}

impl SplitBregmanSolver {
    /// Solver for the given encoding operator, whose weight plays the role of `mu`
    /// and must be strictly positive.
    pub fn new(encoding: Arc<dyn LinearOperator>, cg: ConjugateGradientSolver) -> Result<Self> {
        let mu = encoding.weight();
        if !mu.is_finite() || mu <= 0.0 {
            return Err(DeblurError::config("mu", mu, "a finite value > 0"));
        }
        Ok(Self {
            encoding,
            groups: Vec::new(),
            cg,
            outer_iterations: 10,
            inner_iterations: 1,
        })
    }

    /// Register a regularization group acting on the image domain.
    pub fn add_group(&mut self, group: RegularizationGroup) -> Result<()> {
        if group.domain_dims() != self.image_dims() {
            return Err(DeblurError::shape(format!(
                "regularization group acts on {:?} but the image is {:?}",
                group.domain_dims(),
                self.image_dims()
            )));
        }
        self.groups.push(group);
        Ok(())
    }

    /// Register an operator as a group of its own.
    pub fn add_regularization_operator(&mut self, op: Arc<dyn LinearOperator>) -> Result<()> {
        self.add_group(RegularizationGroup::single(op)?)
    }

    pub fn set_outer_iterations(&mut self, outer_iterations: usize) -> Result<()> {
        if outer_iterations == 0 {
            return Err(DeblurError::config("outer_iterations", 0, ">= 1"));
        }
        self.outer_iterations = outer_iterations;
        Ok(())
    }

    pub fn set_inner_iterations(&mut self, inner_iterations: usize) -> Result<()> {
        if inner_iterations == 0 {
            return Err(DeblurError::config("inner_iterations", 0, ">= 1"));
        }
        self.inner_iterations = inner_iterations;
        Ok(())
    }

    pub fn outer_iterations(&self) -> usize {
        self.outer_iterations
    }

    pub fn inner_iterations(&self) -> usize {
        self.inner_iterations
    }

    pub fn groups(&self) -> &[RegularizationGroup] {
        &self.groups
    }

    pub fn encoding(&self) -> &Arc<dyn LinearOperator> {
        &self.encoding
    }

    /// Shape of the image being reconstructed (the encoding domain).
    pub fn image_dims(&self) -> Dims {
        self.encoding.domain_dims()
    }

    /// `mu E^H E + sum_g lambda_g R_g^H R_g`, encoding term first, then groups in order.
    pub fn normal_operator(&self) -> Result<NormalEquationOperator> {
        let mut op = NormalEquationOperator::new(self.image_dims());
        op.add_term(Arc::clone(&self.encoding))?;
        for group in &self.groups {
            for member in group.operators() {
                op.add_term(Arc::clone(member))?;
            }
        }
        Ok(op)
    }

    /// Zero `d` and `b` for every group.
    pub fn initial_state(&self) -> Result<BregmanState> {
        let groups = self
            .groups
            .iter()
            .map(GroupState::zeros)
            .collect::<Result<Vec<_>>>()?;
        Ok(BregmanState { groups })
    }

    /// `mu E^H f`, the constant part of every right-hand side.
    pub fn data_term(&self, observation: &Volume) -> Result<Volume> {
        observation.ensure_dims(self.encoding.range_dims(), "observation")?;
        let mut rhs = self.encoding.apply_adjoint(observation)?;
        scale(rhs.as_mut_slice(), self.encoding.weight());
        Ok(rhs)
    }

    /// Shrinkage and multiplier update of every group at estimate `x`.
    pub fn bregman_update(&self, x: &Volume, state: &mut BregmanState) -> Result<()> {
        self.check_state(state)?;
        x.ensure_dims(self.image_dims(), "image estimate")?;

        for (group, gs) in self.groups.iter().zip(state.groups.iter_mut()) {
            // z_j = R_j x + b_j
            let mut z = Vec::with_capacity(group.len());
            for (op, b) in group.operators().iter().zip(&gs.b) {
                let mut zj = op.apply(x)?;
                axpy(zj.as_mut_slice(), 1.0, b.as_slice());
                z.push(zj);
            }

            shrink_jointly(&z, group.threshold(), &mut gs.d)?;

            // b_j + R_j x - d_j == z_j - d_j
            for ((b, zj), d) in gs.b.iter_mut().zip(&z).zip(&gs.d) {
                sub_into(b.as_mut_slice(), zj.as_slice(), d.as_slice());
            }
        }
        Ok(())
    }

    /// `data_term + sum_g lambda_g R_g^H (d_g - b_g)`.
    pub fn assemble_rhs(&self, data_term: &Volume, state: &BregmanState) -> Result<Volume> {
        self.check_state(state)?;
        data_term.ensure_dims(self.image_dims(), "data term")?;

        let mut rhs = data_term.clone();
        let mut diff = Volume::zeros(self.image_dims())?;
        let mut back = Volume::zeros(self.image_dims())?;
        for (group, gs) in self.groups.iter().zip(&state.groups) {
            if diff.dims() != group.range_dims() {
                diff = Volume::zeros(group.range_dims())?;
            }
            for ((op, d), b) in group.operators().iter().zip(&gs.d).zip(&gs.b) {
                sub_into(diff.as_mut_slice(), d.as_slice(), b.as_slice());
                op.apply_adjoint_into(&diff, &mut back)?;
                axpy(rhs.as_mut_slice(), op.weight(), back.as_slice());
            }
        }
        Ok(rhs)
    }

    /// `mu/2 ||E x - f||^2 + sum_g s_g ||R_g x||_{2,1}`
    pub fn objective(&self, x: &Volume, observation: &Volume) -> Result<f64> {
        observation.ensure_dims(self.encoding.range_dims(), "observation")?;
        let mut residual = self.encoding.apply(x)?;
        axpy(residual.as_mut_slice(), -1.0, observation.as_slice());
        let mut value = 0.5 * self.encoding.weight() * norm_squared(residual.as_slice());

        for group in &self.groups {
            let rx = group
                .operators()
                .iter()
                .map(|op| op.apply(x))
                .collect::<Result<Vec<_>>>()?;
            value += group.sparsity_weight() * joint_l1_norm(&rx);
        }
        Ok(value)
    }

    /// Run the outer loop.
    ///
    /// The estimate starts at `initial` when given, otherwise at the observation
    /// itself (which requires the encoding to map the image shape onto itself).
    pub fn solve<'r>(
        &self,
        observation: &Volume,
        initial: Option<Volume>,
        mut reporter: Option<&mut (dyn ProgressReporter + 'r)>,
    ) -> Result<SolveOutcome> {
        let dims = self.image_dims();
        observation.ensure_dims(self.encoding.range_dims(), "observation")?;
        let mut x = match initial {
            Some(guess) => {
                guess.ensure_dims(dims, "initial guess")?;
                guess
            }
            None => {
                observation.ensure_dims(dims, "observation used as initial guess")?;
                observation.clone()
            }
        };

        let normal = self.normal_operator()?;
        let mut state = self.initial_state()?;
        let data_term = self.data_term(observation)?;

        info!(
            ?dims,
            groups = self.groups.len(),
            outer = self.outer_iterations,
            inner = self.inner_iterations,
            cg_iterations = self.cg.max_iterations(),
            "Split-Bregman solve"
        );

        let mut history = Vec::with_capacity(self.outer_iterations);
        for k in 1..=self.outer_iterations {
            let outer_stage = Stage::OuterIterate { outer_iteration: k };

            self.bregman_update(&x, &mut state)
                .map_err(|e| e.at_stage(outer_stage))?;
            let rhs = self
                .assemble_rhs(&data_term, &state)
                .map_err(|e| e.at_stage(outer_stage))?;

            let mut cg_iterations = 0;
            let mut cg_residual = 0.0;
            let mut cg_converged = true;
            for _ in 0..self.inner_iterations {
                let outcome = self
                    .cg
                    .solve(&normal, &rhs, x, reporter.as_deref_mut())
                    .map_err(|e| e.at_stage(Stage::InnerSolve { outer_iteration: k }))?;
                cg_iterations += outcome.iterations;
                cg_residual = outcome.residual_norm;
                cg_converged &= outcome.converged;
                x = outcome.solution;
            }

            let objective = self
                .objective(&x, observation)
                .map_err(|e| e.at_stage(outer_stage))?;
            debug!(
                "SB iter {k}/{}: cg_iters={cg_iterations} ||r||={cg_residual:.3e} objective={objective:.6e}",
                self.outer_iterations
            );
            history.push(OuterRecord {
                iteration: k,
                cg_iterations,
                cg_residual,
                cg_converged,
                objective,
            });

            if let Some(rep) = reporter.as_deref_mut() {
                rep.outer_iteration(k, self.outer_iterations);
                if k < self.outer_iterations && !rep.should_continue() {
                    info!("Split-Bregman solve cancelled after {k} outer iterations");
                    return Err(DeblurError::Cancelled { completed: k });
                }
            }
        }

        Ok(SolveOutcome { image: x, history })
    }

    fn check_state(&self, state: &BregmanState) -> Result<()> {
        if state.groups.len() != self.groups.len() {
            return Err(DeblurError::shape(format!(
                "Bregman state has {} groups but the solver has {}",
                state.groups.len(),
                self.groups.len()
            )));
        }
        for (group, gs) in self.groups.iter().zip(&state.groups) {
            if gs.d.len() != group.len() || gs.b.len() != group.len() {
                return Err(DeblurError::shape(format!(
                    "Bregman state of a {}-member group holds {} d and {} b volumes",
                    group.len(),
                    gs.d.len(),
                    gs.b.len()
                )));
            }
            for v in gs.d.iter().chain(&gs.b) {
                v.ensure_dims(group.range_dims(), "Bregman variable")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{ConvolutionOperator, DirectionalDifferenceOperator};
    use crate::report::RecordingReporter;
    use crate::utils::gradient::Axis;
    use num_complex::Complex64;

    fn identity_kernel(dims: Dims) -> Volume {
        let mut kernel = Volume::zeros(dims).unwrap();
        kernel.as_mut_slice()[0] = Complex64::new(1.0, 0.0);
        kernel
    }

    fn solver(dims: Dims, mu: f64, lambda: f64) -> SplitBregmanSolver {
        let encoding = Arc::new(ConvolutionOperator::new(&identity_kernel(dims), mu).unwrap());
        let cg = ConjugateGradientSolver::new(1e-10, 50).unwrap();
        let mut sb = SplitBregmanSolver::new(encoding, cg).unwrap();
        let rx: Arc<dyn LinearOperator> =
            Arc::new(DirectionalDifferenceOperator::new(Axis::X, dims, lambda).unwrap());
        let ry: Arc<dyn LinearOperator> =
            Arc::new(DirectionalDifferenceOperator::new(Axis::Y, dims, lambda).unwrap());
        let rz: Arc<dyn LinearOperator> =
            Arc::new(DirectionalDifferenceOperator::new(Axis::Z, dims, lambda).unwrap());
        sb.add_group(RegularizationGroup::new(vec![rx, ry]).unwrap()).unwrap();
        sb.add_regularization_operator(rz).unwrap();
        sb
    }

    fn step_volume(dims: Dims) -> Volume {
        let [nx, ny, nz] = dims;
        let mut values = Vec::with_capacity(nx * ny * nz);
        for _k in 0..nz {
            for _j in 0..ny {
                for i in 0..nx {
                    values.push(if i < nx / 2 { 0.0 } else { 1.0 });
                }
            }
        }
        Volume::from_real(dims, &values).unwrap()
    }

    #[test]
    fn test_non_positive_mu_rejected() {
        let dims = [2, 2, 2];
        let encoding = Arc::new(ConvolutionOperator::new(&identity_kernel(dims), 0.0).unwrap());
        assert!(matches!(
            SplitBregmanSolver::new(encoding, ConjugateGradientSolver::default()),
            Err(DeblurError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            ConvolutionOperator::new(&identity_kernel(dims), -1.0),
            Err(DeblurError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_group_shape_mismatch_rejected() {
        let mut sb = solver([4, 4, 4], 1.0, 1.0);
        let op: Arc<dyn LinearOperator> =
            Arc::new(DirectionalDifferenceOperator::new(Axis::X, [4, 4, 3], 1.0).unwrap());
        assert!(matches!(
            sb.add_regularization_operator(op),
            Err(DeblurError::InputShape { .. })
        ));
    }

    #[test]
    fn test_first_bregman_update_from_zero_state() {
        let dims = [4, 4, 4];
        let sb = solver(dims, 1.0, 2.0);
        let x = step_volume(dims);
        let mut state = sb.initial_state().unwrap();
        sb.bregman_update(&x, &mut state).unwrap();

        // Rx x has entries +1 at i = 1 and -1 at the wrap i = 3; threshold = 1/2.
        let rx = sb.groups()[0].operators()[0].apply(&x).unwrap();
        let d = &state.groups[0].d[0];
        let b = &state.groups[0].b[0];
        for ((r, dv), bv) in rx.as_slice().iter().zip(d.as_slice()).zip(b.as_slice()) {
            if r.norm() > 0.0 {
                assert!((dv.norm() - 0.5).abs() < 1e-12);
                assert!((bv.norm() - 0.5).abs() < 1e-12);
            } else {
                assert_eq!(dv.norm(), 0.0);
                assert_eq!(bv.norm(), 0.0);
            }
        }
        // y and z differences of an x-step are zero
        assert!(state.groups[0].d[1].as_slice().iter().all(|c| c.norm() == 0.0));
        assert!(state.groups[1].d[0].as_slice().iter().all(|c| c.norm() == 0.0));
    }

    #[test]
    fn test_rhs_with_zero_state_is_data_term() {
        let dims = [3, 4, 2];
        let sb = solver(dims, 2.0, 1.0);
        let f = step_volume(dims);
        let data = sb.data_term(&f).unwrap();
        let rhs = sb.assemble_rhs(&data, &sb.initial_state().unwrap()).unwrap();
        for (r, v) in rhs.as_slice().iter().zip(f.as_slice()) {
            assert!((r - v * 2.0).norm() < 1e-12);
        }
    }

    #[test]
    fn test_state_mismatch_rejected() {
        let sb = solver([2, 2, 2], 1.0, 1.0);
        let mut state = sb.initial_state().unwrap();
        state.groups.pop();
        let x = Volume::zeros([2, 2, 2]).unwrap();
        assert!(matches!(
            sb.bregman_update(&x, &mut state),
            Err(DeblurError::InputShape { .. })
        ));
    }

    #[test]
    fn test_constant_volume_is_fixed_point() {
        let dims = [4, 4, 4];
        let mut sb = solver(dims, 1.0, 1.0);
        sb.set_outer_iterations(5).unwrap();
        let f = Volume::filled(dims, Complex64::new(1.0, 0.0)).unwrap();
        let out = sb.solve(&f, None, None).unwrap();

        assert_eq!(out.history.len(), 5);
        assert!(out.history.iter().all(|r| r.cg_iterations == 0));
        for v in out.image.as_slice() {
            assert!((v - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_solve_reduces_objective_of_noisy_step() {
        let dims = [6, 4, 4];
        let mut sb = solver(dims, 4.0, 4.0);
        sb.set_outer_iterations(20).unwrap();
        let mut f = step_volume(dims);
        for (n, v) in f.as_mut_slice().iter_mut().enumerate() {
            *v += Complex64::new(if n % 2 == 0 { 0.1 } else { -0.1 }, 0.0);
        }

        let before = sb.objective(&f, &f).unwrap();
        let out = sb.solve(&f, None, None).unwrap();
        let after = out.history.last().unwrap().objective;
        assert!(after < before, "{after} >= {before}");
        assert!(out.image.as_slice().iter().all(|c| c.re.is_finite() && c.im.is_finite()));
    }

    #[test]
    fn test_cancellation_between_outer_iterations() {
        let dims = [4, 4, 4];
        let mut sb = solver(dims, 1.0, 1.0);
        sb.set_outer_iterations(5).unwrap();
        let f = step_volume(dims);
        let mut rep = RecordingReporter {
            stop_after: Some(2),
            ..Default::default()
        };
        let err = sb.solve(&f, None, Some(&mut rep)).unwrap_err();
        assert!(matches!(err, DeblurError::Cancelled { completed: 2 }));
        assert_eq!(rep.outer_iterations, vec![1, 2]);
    }

    #[test]
    fn test_wrong_observation_shape() {
        let sb = solver([4, 4, 4], 1.0, 1.0);
        let f = Volume::zeros([4, 4, 2]).unwrap();
        let err = sb.solve(&f, None, None).unwrap_err();
        assert!(matches!(err, DeblurError::InputShape { stage: Stage::Setup, .. }));
    }

    #[test]
    fn test_zero_iteration_counts_rejected() {
        let mut sb = solver([2, 2, 2], 1.0, 1.0);
        assert!(sb.set_outer_iterations(0).is_err());
        assert!(sb.set_inner_iterations(0).is_err());
    }
}
