//! # atmos-ts
//!
//! Time integration core for atmospheric dynamical cores.
//!
//! The crate separates "how the state is advanced in time" from "how the
//! tendencies are computed":
//! - State storage in numbered instance slots ([`state`])
//! - The tendency contract a dynamical core implements ([`rhs`])
//! - Time-stepping schemes behind one trait ([`time`]): explicit RK, the
//!   ARS(3,4,3) IMEX scheme and an adaptive IMEX adapter
//! - An adaptive additive Runge-Kutta integrator with Newton-Krylov and
//!   fixed-point stage solvers ([`ark`])
//! - A driver running the step loop ([`model`]) and run diagnostics
//!   ([`diagnostics`])

pub mod ark;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod rhs;
pub mod state;
pub mod time;
pub mod types;

// Re-export main types for convenience
pub use error::{Result, TimestepError};
pub use model::{Model, SimulationConfig};
pub use rhs::{LinearSplitRhs, RhsEvaluator};
pub use state::{FieldLayout, StateBuffer, StateContainer};
pub use time::{
    Ars343, ArkodeAdapter, ArkodeConfig, BoxedScheme, SchemeConfig, StepInfo, TimestepScheme,
};
pub use types::InstanceIndex;
