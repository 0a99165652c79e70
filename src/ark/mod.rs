//! Additive Runge-Kutta integration with adaptive step control.
//!
//! [`ArkStep`] integrates y' = f(t, y) + g(t, y) with an explicit table on
//! the non-stiff part f and a diagonally implicit table on the stiff part g
//! (or one table on f + g). Implicit stages are solved with a matrix-free
//! Newton-GMRES iteration or an Anderson-accelerated fixed point.
//!
//! Vectors are owned by the caller through [`VectorOps`]; the integrator
//! works on handles only, so the same code runs on a plain `Vec` or on slots
//! of a [`StateContainer`](crate::state::StateContainer).

pub mod butcher;
pub mod config;
mod controller;
mod error;
mod gmres;
mod nonlinear;
mod stepper;
pub mod vector;

pub use butcher::{ButcherTable, MethodTables, table_id};
pub use config::{ArkStepConfig, IntegrationMode, NonlinearSolver};
pub use error::ArkError;
pub use gmres::GmresOutcome;
pub use nonlinear::NonlinearCounters;
pub use stepper::{ArkStats, ArkStep};
pub use vector::{ArkSystem, VectorOps, VectorPool};
