//! sb-deblur: Split-Bregman deconvolution of complex 3D volumes
//!
//! Recovers a sharp volume `x` from a blurred observation `f = k * x + noise`
//! by solving
//!
//! ```text
//! min_x  mu/2 ||k * x - f||^2 + sum_g ||R_g x||_{2,1}
//! ```
//!
//! with a Split-Bregman outer loop around a conjugate gradient inner solve.
//!
//! # Modules
//! - `volume`: dense complex volumes in Fortran order
//! - `fft`: 3D FFT plans using rustfft
//! - `operators`: convolution, directional difference and normal-equation operators
//! - `solvers`: conjugate gradient, regularization groups, Split-Bregman
//! - `deblur`: end-to-end entry points
//! - `config`: solver parameters (serde/TOML)
//! - `report`: progress reporting
//! - `array_io`: on-disk array format
//! - `utils`: difference stencils, vector reductions

// Core modules
pub mod error;
pub mod fft;
pub mod volume;

// Algorithm modules
pub mod operators;
pub mod solvers;
pub mod utils;

// Entry points
pub mod config;
pub mod deblur;
pub mod report;

// I/O modules
pub mod array_io;

pub use config::{ConfigError, DeblurConfig, RegularizationLayout};
pub use deblur::{build_solver, deblur, deblur_arrays, deblur_with_progress, DeblurOutput};
pub use error::{DeblurError, Result, Stage};
pub use operators::{
    ConvolutionOperator, DirectionalDifferenceOperator, LinearOperator, NormalEquationOperator,
};
pub use report::{OutputMode, ProgressFn, ProgressReporter, RecordingReporter, TracingReporter};
pub use solvers::{
    BregmanState, CgOutcome, ConjugateGradientSolver, OuterRecord, RegularizationGroup,
    SolveOutcome, SplitBregmanSolver,
};
pub use utils::gradient::{Axis, Boundary};
pub use volume::{Dims, Volume};
