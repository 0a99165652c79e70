//! Strongly-typed index newtypes.
//!
//! Instance slots are addressed through [`InstanceIndex`] rather than a bare
//! `usize`, so a slot number cannot be confused with a field or point offset.

use std::fmt;

/// Macro to generate index newtypes with common functionality.
macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident, $display_prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Create a new index.
            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Get the raw index value.
            #[inline]
            pub const fn get(self) -> usize {
                self.0
            }

            /// First index (0).
            pub const ZERO: Self = Self(0);

            /// Create an iterator over [0, n) indices.
            pub fn iter(n: usize) -> impl ExactSizeIterator<Item = $name> {
                (0..n).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(idx: $name) -> usize {
                idx.0
            }
        }
    };
}

define_index!(
    /// Slot index inside a [`StateContainer`](crate::state::StateContainer).
    ///
    /// Instance 0 is the canonical "current" slot: it holds the model state
    /// between calls to `step`.
    ///
    /// # Example
    ///
    /// ```
    /// use atmos_ts::types::InstanceIndex;
    ///
    /// let slot = InstanceIndex::new(3);
    /// assert_eq!(slot.get(), 3);
    /// assert_eq!(InstanceIndex::CURRENT.get(), 0);
    /// ```
    InstanceIndex,
    "I"
);

impl InstanceIndex {
    /// The slot holding the state at the start and end of every step.
    pub const CURRENT: Self = Self(0);
}

/// Which part of a state an instance check refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Prognostic component fields (wind, density, potential temperature).
    Component,
    /// Passive tracer fields.
    Tracer,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Component => write!(f, "component"),
            FieldKind::Tracer => write!(f, "tracer"),
        }
    }
}
