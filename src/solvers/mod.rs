//! Iterative solvers
//!
//! - CG: conjugate gradient on the self-adjoint normal equations
//! - Split-Bregman: outer shrinkage/multiplier loop around CG

pub mod cg;
pub mod regularization;
pub mod split_bregman;

pub use cg::*;
pub use regularization::*;
pub use split_bregman::*;
