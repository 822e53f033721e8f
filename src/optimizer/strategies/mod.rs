//! Reduction solvers
//!
//! - Linear program: exact solution via `good_lp` with the `minilp` backend
//! - Projected gradient: iterative gradient descent projected onto the bounds

pub mod gradient;
pub mod linear;

pub use gradient::*;
pub use linear::*;
