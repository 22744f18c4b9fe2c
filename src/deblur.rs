//! End-to-end volumetric deconvolution
//!
//! Wires a blurred observation and its kernel into a Split-Bregman solve with
//! total-variation regularization:
//!
//! ```text
//! min_x  mu/2 ||k * x - f||^2 + ||(Dx, Dy) x||_{2,1} + ||Dz x||_1
//! ```
//!
//! (grouping per [`RegularizationLayout`]), each difference weighted by `lambda`.

use std::sync::Arc;

use num_complex::Complex64;
use tracing::info;

use crate::config::{DeblurConfig, RegularizationLayout};
use crate::error::{DeblurError, Result};
use crate::operators::{ConvolutionOperator, DirectionalDifferenceOperator, LinearOperator};
use crate::report::{ProgressFn, ProgressReporter, TracingReporter};
use crate::solvers::{ConjugateGradientSolver, OuterRecord, RegularizationGroup, SplitBregmanSolver};
use crate::utils::gradient::Axis;
use crate::volume::{Dims, Volume};

/// Result of [`deblur`].
#[derive(Debug, Clone)]
pub struct DeblurOutput {
    pub image: Volume,
    /// `|image|`, when requested by the configuration.
    pub magnitude: Option<Vec<f64>>,
    pub history: Vec<OuterRecord>,
}

/// Build the configured solver for images shaped like `kernel`.
///
/// The configuration is validated first, so a bad parameter is reported
/// before the kernel is transformed.
pub fn build_solver(kernel: &Volume, config: &DeblurConfig) -> Result<SplitBregmanSolver> {
    config.validate()?;
    let dims = kernel.dims();

    let encoding = Arc::new(ConvolutionOperator::new(kernel, config.mu)?);
    let cg = ConjugateGradientSolver::new(config.cg_tolerance, config.cg_iterations)?;
    let mut solver = SplitBregmanSolver::new(encoding, cg)?;
    solver.set_outer_iterations(config.outer_iterations)?;
    solver.set_inner_iterations(config.inner_iterations)?;

    // lambda == 0 leaves a pure least-squares problem
    if config.lambda > 0.0 {
        for group in regularization_groups(dims, config)? {
            solver.add_group(group)?;
        }
    }
    Ok(solver)
}

fn regularization_groups(dims: Dims, config: &DeblurConfig) -> Result<Vec<RegularizationGroup>> {
    let diff = |axis: Axis| -> Result<Arc<dyn LinearOperator>> {
        Ok(Arc::new(DirectionalDifferenceOperator::with_boundary(
            axis,
            dims,
            config.boundary,
            config.lambda,
        )?))
    };

    let members: Vec<Vec<Axis>> = match config.layout {
        RegularizationLayout::IsotropicXy => vec![vec![Axis::X, Axis::Y], vec![Axis::Z]],
        RegularizationLayout::Anisotropic => Axis::ALL.iter().map(|&a| vec![a]).collect(),
        RegularizationLayout::Isotropic => vec![Axis::ALL.to_vec()],
    };

    members
        .into_iter()
        .map(|axes| {
            let ops = axes.into_iter().map(&diff).collect::<Result<Vec<_>>>()?;
            RegularizationGroup::new(ops)?.with_sparsity_weight(config.sparsity_weight)
        })
        .collect()
}

/// Deconvolve `observation` by `kernel`.
///
/// Both volumes must have the same shape. Progress goes to `reporter`, or to a
/// [`TracingReporter`] in the configured output mode when none is given.
pub fn deblur<'r>(
    observation: &Volume,
    kernel: &Volume,
    config: &DeblurConfig,
    reporter: Option<&mut (dyn ProgressReporter + 'r)>,
) -> Result<DeblurOutput> {
    let solver = build_solver(kernel, config)?;
    observation.ensure_dims(kernel.dims(), "observation (kernel shape)")?;

    info!(
        dims = ?observation.dims(),
        mu = config.mu,
        lambda = config.lambda,
        layout = ?config.layout,
        "deblurring"
    );

    let mut fallback = TracingReporter::new(config.output_mode);
    let reporter: &mut dyn ProgressReporter = match reporter {
        Some(r) => r,
        None => &mut fallback,
    };

    let outcome = solver.solve(observation, None, Some(reporter))?;
    let magnitude = config.magnitude.then(|| outcome.magnitude());
    Ok(DeblurOutput {
        image: outcome.image,
        magnitude,
        history: outcome.history,
    })
}

/// [`deblur`] with a `(iteration, total)` progress callback.
pub fn deblur_with_progress<F>(
    observation: &Volume,
    kernel: &Volume,
    config: &DeblurConfig,
    progress_callback: F,
) -> Result<DeblurOutput>
where
    F: FnMut(usize, usize),
{
    let mut reporter = ProgressFn(progress_callback);
    deblur(observation, kernel, config, Some(&mut reporter))
}

/// [`deblur`] on raw `(shape, samples)` pairs of any rank.
///
/// Parameters are checked before the shapes, so an invalid `mu` is reported
/// even when the arrays are malformed too.
pub fn deblur_arrays(
    observation: (&[usize], Vec<Complex64>),
    kernel: (&[usize], Vec<Complex64>),
    config: &DeblurConfig,
) -> Result<DeblurOutput> {
    config.validate()?;
    let (obs_shape, obs_data) = observation;
    let (kernel_shape, kernel_data) = kernel;
    if obs_shape.len() != 3 || kernel_shape.len() != 3 {
        return Err(DeblurError::shape(format!(
            "only rank-3 volumes are supported (observation rank {}, kernel rank {})",
            obs_shape.len(),
            kernel_shape.len()
        )));
    }
    let observation = Volume::from_shape_vec(obs_shape, obs_data)?;
    let kernel = Volume::from_shape_vec(kernel_shape, kernel_data)?;
    deblur(&observation, &kernel, config, None)
}
