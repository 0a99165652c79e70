//! Right-hand side contract between the dynamical core and the schemes.
//!
//! - [`RhsEvaluator`]: explicit/implicit/full tendencies and the implicit solve
//! - [`ImplicitSolveConfig`]: iteration contract of the default implicit solve
//! - [`LinearSplitRhs`]: manufactured linear problem with an exact solution

mod evaluator;
mod linear;

pub use evaluator::{ImplicitSolveConfig, RhsEvaluator, fixed_point_solve};
pub use linear::{LinearSplitRhs, RhsCounts};
