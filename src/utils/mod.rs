//! Utility kernels shared by the operators and solvers
//!
//! - Directional forward differences and their adjoints
//! - Deterministic vector reductions and elementwise updates

pub mod gradient;
pub mod vector_ops;

pub use gradient::*;
pub use vector_ops::*;
