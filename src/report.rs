//! Progress reporting for the iterative solvers
//!
//! The solvers never own a reporter; callers pass `Option<&mut dyn ProgressReporter>`
//! and every hook has a no-op default. [`TracingReporter`] forwards events to
//! `tracing`, filtered by an [`OutputMode`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How much a [`TracingReporter`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Nothing.
    Silent,
    /// Only warnings (e.g. CG hit its iteration cap).
    #[default]
    Warnings,
    /// Warnings plus per-iteration progress.
    Verbose,
}

/// Summary of one finished CG run, as seen by a reporter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgSummary {
    pub iterations: usize,
    pub residual_norm: f64,
    pub converged: bool,
}

/// Hooks the solvers call while they run.
pub trait ProgressReporter {
    /// After every CG iteration.
    fn cg_iteration(&mut self, _iteration: usize, _residual_norm: f64) {}

    /// When a CG run ends without error.
    fn cg_finished(&mut self, _summary: &CgSummary) {}

    /// At the end of each outer Split-Bregman iteration.
    fn outer_iteration(&mut self, _iteration: usize, _total: usize) {}

    /// Non-fatal condition worth surfacing.
    fn warning(&mut self, _message: &str) {}

    /// Polled between outer iterations; returning `false` cancels the solve.
    fn should_continue(&mut self) -> bool {
        true
    }
}

/// Reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
    mode: OutputMode,
}

impl TracingReporter {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }
}

impl ProgressReporter for TracingReporter {
    fn cg_iteration(&mut self, iteration: usize, residual_norm: f64) {
        if self.mode == OutputMode::Verbose {
            info!(iteration, residual_norm, "CG iteration");
        }
    }

    fn outer_iteration(&mut self, iteration: usize, total: usize) {
        if self.mode == OutputMode::Verbose {
            info!("Split-Bregman outer iteration {iteration}/{total}");
        }
    }

    fn warning(&mut self, message: &str) {
        if self.mode != OutputMode::Silent {
            warn!("{message}");
        }
    }
}

/// Adapts a `FnMut(iteration, total)` progress callback to a reporter.
///
/// Only outer iterations are forwarded.
pub struct ProgressFn<F>(pub F);

impl<F> ProgressReporter for ProgressFn<F>
where
    F: FnMut(usize, usize),
{
    fn outer_iteration(&mut self, iteration: usize, total: usize) {
        (self.0)(iteration, total)
    }
}

/// Reporter that records everything it sees; handy for diagnostics and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    pub cg_residuals: Vec<f64>,
    pub cg_runs: Vec<CgSummary>,
    pub outer_iterations: Vec<usize>,
    pub warnings: Vec<String>,
    /// Cancel once this many outer iterations have been reported.
    pub stop_after: Option<usize>,
}

impl ProgressReporter for RecordingReporter {
    fn cg_iteration(&mut self, _iteration: usize, residual_norm: f64) {
        self.cg_residuals.push(residual_norm);
    }

    fn cg_finished(&mut self, summary: &CgSummary) {
        self.cg_runs.push(*summary);
    }

    fn outer_iteration(&mut self, iteration: usize, _total: usize) {
        self.outer_iterations.push(iteration);
    }

    fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn should_continue(&mut self) -> bool {
        self.stop_after
            .map_or(true, |limit| self.outer_iterations.len() < limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fn_forwards_outer_iterations() {
        let mut seen = Vec::new();
        {
            let mut reporter = ProgressFn(|i, n| seen.push((i, n)));
            reporter.outer_iteration(1, 3);
            reporter.cg_iteration(1, 0.5);
            reporter.outer_iteration(2, 3);
        }
        assert_eq!(seen, vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn test_recording_reporter_stop_after() {
        let mut reporter = RecordingReporter {
            stop_after: Some(2),
            ..Default::default()
        };
        assert!(reporter.should_continue());
        reporter.outer_iteration(1, 5);
        assert!(reporter.should_continue());
        reporter.outer_iteration(2, 5);
        assert!(!reporter.should_continue());
    }

    #[test]
    fn test_output_mode_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: OutputMode,
        }
        let w: Wrapper = toml::from_str("mode = \"verbose\"").unwrap();
        assert_eq!(w.mode, OutputMode::Verbose);
    }
}
