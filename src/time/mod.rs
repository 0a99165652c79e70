//! Time integration schemes.
//!
//! - [`TimestepScheme`]: the contract between the model's step loop and a
//!   scheme (instance counts, `initialize`, `step`)
//! - [`ForwardEuler`], [`SspRk3`]: explicit schemes on the full tendency
//! - [`Ars343`]: fixed-step three-stage IMEX Runge-Kutta
//! - [`ArkodeAdapter`]: adaptive IMEX integration through [`crate::ark`]
//! - [`SchemeConfig`]: runtime selection by name

pub mod arkode;
mod ars343;
mod explicit;
mod scheme;
mod selection;

pub use arkode::{AdapterPhase, ArkodeAdapter, ArkodeConfig};
pub use ars343::{Ars343, GAMMA as ARS343_GAMMA};
pub use explicit::{ForwardEuler, SspRk3};
pub use scheme::{BoxedScheme, SchemeInfo, StepInfo, TimestepScheme, check_instance_counts, commit_staged};
pub use selection::SchemeConfig;
