//! Model state storage.
//!
//! - [`FieldLayout`]: component/tracer field counts and spatial extent
//! - [`StateBuffer`]: one full field snapshot
//! - [`StateContainer`]: instance slots handed to time-stepping schemes
//! - [`Integrable`]: vector-space operations used by stage combinations

mod buffer;
mod container;

pub use buffer::{FieldLayout, Integrable, StateBuffer};
pub use container::StateContainer;
