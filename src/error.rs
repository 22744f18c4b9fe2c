//! Error types for the deconvolution core
//!
//! Every failure is fatal for the current solve and carries the [`Stage`] it
//! was raised in, so a failed batch run can be diagnosed from the error alone.

use std::fmt;

/// Where in a solve an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Operator construction, input validation, state allocation.
    Setup,
    /// Inside a conjugate gradient run of the given outer iteration.
    InnerSolve { outer_iteration: usize },
    /// Shrinkage, multiplier or right-hand-side work of an outer iteration.
    OuterIterate { outer_iteration: usize },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Setup => write!(f, "setup"),
            Stage::InnerSolve { outer_iteration } => {
                write!(f, "inner CG solve (outer iteration {outer_iteration})")
            }
            Stage::OuterIterate { outer_iteration } => {
                write!(f, "outer iteration {outer_iteration}")
            }
        }
    }
}

/// Primary error type for the solver core.
#[derive(Debug, thiserror::Error)]
pub enum DeblurError {
    /// Rank or shape mismatch between observation, kernel and operator domains.
    #[error("input shape error during {stage}: {detail}")]
    InputShape { stage: Stage, detail: String },

    /// A required parameter is outside its valid range.
    #[error("invalid configuration: {name} = {value} (expected {expected})")]
    InvalidConfiguration {
        name: String,
        value: String,
        expected: String,
    },

    /// The CG residual became non-finite or the iteration stopped making progress.
    #[error(
        "numerical divergence during {stage} at CG iteration {iteration} (last residual={residual:.3e}): {detail}"
    )]
    NumericalDivergence {
        stage: Stage,
        iteration: usize,
        residual: f64,
        detail: String,
    },

    /// A volume buffer could not be allocated.
    #[error("failed to allocate {elements} complex samples during {stage}")]
    ResourceExhaustion { stage: Stage, elements: usize },

    /// The progress reporter asked the outer loop to stop.
    #[error("solve cancelled by the caller after {completed} outer iterations")]
    Cancelled { completed: usize },
}

impl DeblurError {
    pub(crate) fn shape(detail: impl Into<String>) -> Self {
        DeblurError::InputShape {
            stage: Stage::Setup,
            detail: detail.into(),
        }
    }

    pub(crate) fn config(
        name: impl Into<String>,
        value: impl fmt::Display,
        expected: impl Into<String>,
    ) -> Self {
        DeblurError::InvalidConfiguration {
            name: name.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Re-tag a stage-carrying error with the stage it surfaced in.
    pub(crate) fn at_stage(self, stage: Stage) -> Self {
        match self {
            DeblurError::InputShape { detail, .. } => DeblurError::InputShape { stage, detail },
            DeblurError::NumericalDivergence {
                iteration,
                residual,
                detail,
                ..
            } => DeblurError::NumericalDivergence {
                stage,
                iteration,
                residual,
                detail,
            },
            DeblurError::ResourceExhaustion { elements, .. } => {
                DeblurError::ResourceExhaustion { stage, elements }
            }
            other => other,
        }
    }

    /// The stage the error was raised in, if it carries one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DeblurError::InputShape { stage, .. }
            | DeblurError::NumericalDivergence { stage, .. }
            | DeblurError::ResourceExhaustion { stage, .. } => Some(*stage),
            DeblurError::InvalidConfiguration { .. } => Some(Stage::Setup),
            DeblurError::Cancelled { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeblurError>;
