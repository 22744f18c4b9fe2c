//! Solver configuration
//!
//! Defaults match the reference command-line tool: 20 CG iterations, one inner
//! iteration, 50 outer iterations, `mu = lambda = 1`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeblurError, Result};
use crate::report::OutputMode;
use crate::solvers::DEFAULT_CG_TOLERANCE;
use crate::utils::gradient::Boundary;

/// How the three directional differences are grouped for shrinkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizationLayout {
    /// `{Rx, Ry}` shrunk jointly, `Rz` on its own.
    #[default]
    IsotropicXy,
    /// Each axis is its own group.
    Anisotropic,
    /// `{Rx, Ry, Rz}` shrunk jointly.
    Isotropic,
}

/// Parameters of one deconvolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeblurConfig {
    /// Maximum CG iterations per inner solve.
    pub cg_iterations: usize,
    /// Absolute CG residual tolerance.
    pub cg_tolerance: f64,
    /// CG solves per outer iteration.
    pub inner_iterations: usize,
    pub outer_iterations: usize,
    /// Data-fidelity weight; must be > 0.
    pub mu: f64,
    /// Weight of every difference operator; 0 disables regularization.
    pub lambda: f64,
    /// Scale of the L1 penalty of every group.
    pub sparsity_weight: f64,
    pub boundary: Boundary,
    pub layout: RegularizationLayout,
    /// Whether the magnitude of the result is computed.
    pub magnitude: bool,
    pub output_mode: OutputMode,
}

impl Default for DeblurConfig {
    fn default() -> Self {
        Self {
            cg_iterations: 20,
            cg_tolerance: DEFAULT_CG_TOLERANCE,
            inner_iterations: 1,
            outer_iterations: 50,
            mu: 1.0,
            lambda: 1.0,
            sparsity_weight: 1.0,
            boundary: Boundary::Periodic,
            layout: RegularizationLayout::IsotropicXy,
            magnitude: true,
            output_mode: OutputMode::Warnings,
        }
    }
}

/// Failure to load a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] DeblurError),
}

impl DeblurConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> std::result::Result<Self, ConfigError> {
        let config: DeblurConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check every parameter range; runs before any array is touched.
    pub fn validate(&self) -> Result<()> {
        if !self.mu.is_finite() || self.mu <= 0.0 {
            return Err(DeblurError::config("mu", self.mu, "a finite value > 0"));
        }
        if !self.lambda.is_finite() || self.lambda < 0.0 {
            return Err(DeblurError::config("lambda", self.lambda, "a finite value >= 0"));
        }
        if !self.sparsity_weight.is_finite() || self.sparsity_weight < 0.0 {
            return Err(DeblurError::config(
                "sparsity_weight",
                self.sparsity_weight,
                "a finite value >= 0",
            ));
        }
        if !self.cg_tolerance.is_finite() || self.cg_tolerance < 0.0 {
            return Err(DeblurError::config(
                "cg_tolerance",
                self.cg_tolerance,
                "a finite value >= 0",
            ));
        }
        for (name, value) in [
            ("cg_iterations", self.cg_iterations),
            ("inner_iterations", self.inner_iterations),
            ("outer_iterations", self.outer_iterations),
        ] {
            if value == 0 {
                return Err(DeblurError::config(name, value, ">= 1"));
            }
        }
        Ok(())
    }
}
