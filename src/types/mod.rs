//! Strongly-typed domain types for safer APIs.
//!
//! Instance slots are plain integers in the numerics; the newtype here keeps
//! them apart from field and point offsets.

mod indices;

pub use indices::{FieldKind, InstanceIndex};
