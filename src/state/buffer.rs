//! Field layout and the state buffer type.
//!
//! A buffer stores every component field followed by every tracer field,
//! each field contiguous over the spatial points:
//! `components[c * n_points + p]`, `tracers[t * n_points + p]`.

use std::fmt;

use crate::error::{Result, TimestepError};
use crate::types::FieldKind;

/// Shape of one full field snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    /// Number of prognostic component fields (e.g. u, v, w, rho, theta)
    pub n_components: usize,
    /// Number of tracer fields
    pub n_tracers: usize,
    /// Number of spatial degrees of freedom per field
    pub n_points: usize,
}

impl FieldLayout {
    /// Create a new layout.
    pub const fn new(n_components: usize, n_tracers: usize, n_points: usize) -> Self {
        Self {
            n_components,
            n_tracers,
            n_points,
        }
    }

    /// Number of component values in one buffer.
    pub const fn component_len(&self) -> usize {
        self.n_components * self.n_points
    }

    /// Number of tracer values in one buffer.
    pub const fn tracer_len(&self) -> usize {
        self.n_tracers * self.n_points
    }

    /// Total number of scalar values in one buffer.
    pub const fn len(&self) -> usize {
        self.component_len() + self.tracer_len()
    }

    /// Whether the layout holds no values at all.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the layout carries tracer fields.
    pub const fn has_tracers(&self) -> bool {
        self.n_tracers > 0
    }
}

impl fmt::Display for FieldLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} components + {} tracers x {} points",
            self.n_components, self.n_tracers, self.n_points
        )
    }
}

/// Vector-space operations needed by the stage combinations of a scheme.
///
/// - `scale`: Multiply by scalar (x <- c * x)
/// - `axpy`: Add scaled vector (x <- x + c * y)
///
/// Implementations must not allocate.
pub trait Integrable: Clone + Send + Sized {
    /// Scale the state by a constant: self <- c * self
    fn scale(&mut self, c: f64);

    /// Add a scaled vector: self <- self + c * other
    fn axpy(&mut self, c: f64, other: &Self);

    /// Create a zero-initialized state with the same shape.
    ///
    /// Default implementation clones and scales by zero.
    fn zeros_like(&self) -> Self {
        let mut result = self.clone();
        result.scale(0.0);
        result
    }
}

/// One full field snapshot: component fields plus tracer fields.
#[derive(Clone, Debug, PartialEq)]
pub struct StateBuffer {
    layout: FieldLayout,
    /// Component values, field-major
    pub components: Vec<f64>,
    /// Tracer values, field-major
    pub tracers: Vec<f64>,
}

impl StateBuffer {
    /// Create a zero-initialized buffer.
    pub fn new(layout: FieldLayout) -> Self {
        Self {
            layout,
            components: vec![0.0; layout.component_len()],
            tracers: vec![0.0; layout.tracer_len()],
        }
    }

    /// Create from pre-filled data vectors.
    pub fn from_data(layout: FieldLayout, components: Vec<f64>, tracers: Vec<f64>) -> Result<Self> {
        if components.len() != layout.component_len() || tracers.len() != layout.tracer_len() {
            return Err(TimestepError::layout_mismatch(
                layout.to_string(),
                format!(
                    "{} component values, {} tracer values",
                    components.len(),
                    tracers.len()
                ),
            ));
        }
        Ok(Self {
            layout,
            components,
            tracers,
        })
    }

    /// Create a buffer with every value set to `value`.
    pub fn uniform(layout: FieldLayout, value: f64) -> Self {
        let mut buffer = Self::new(layout);
        buffer.fill(value);
        buffer
    }

    /// The layout this buffer was sized for.
    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    /// Values of component field `c`.
    pub fn component(&self, c: usize) -> &[f64] {
        let n = self.layout.n_points;
        &self.components[c * n..(c + 1) * n]
    }

    /// Mutable values of component field `c`.
    pub fn component_mut(&mut self, c: usize) -> &mut [f64] {
        let n = self.layout.n_points;
        &mut self.components[c * n..(c + 1) * n]
    }

    /// Values of tracer field `t`.
    pub fn tracer(&self, t: usize) -> &[f64] {
        let n = self.layout.n_points;
        &self.tracers[t * n..(t + 1) * n]
    }

    /// Mutable values of tracer field `t`.
    pub fn tracer_mut(&mut self, t: usize) -> &mut [f64] {
        let n = self.layout.n_points;
        &mut self.tracers[t * n..(t + 1) * n]
    }

    /// Iterate over all values, components first.
    pub fn values(&self) -> impl Iterator<Item = &f64> {
        self.components.iter().chain(self.tracers.iter())
    }

    /// Iterate mutably over all values, components first.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.components.iter_mut().chain(self.tracers.iter_mut())
    }

    /// Fill with a constant value.
    pub fn fill(&mut self, value: f64) {
        self.components.fill(value);
        self.tracers.fill(value);
    }

    /// Copy all values from another buffer of the same layout.
    pub fn copy_from(&mut self, other: &Self) {
        debug_assert_eq!(self.layout, other.layout);
        self.components.copy_from_slice(&other.components);
        self.tracers.copy_from_slice(&other.tracers);
    }

    /// Set self <- sum_j c_j * x_j.
    pub fn linear_combination(&mut self, terms: &[(f64, &StateBuffer)]) {
        self.fill(0.0);
        for &(c, x) in terms {
            if c != 0.0 {
                Integrable::axpy(self, c, x);
            }
        }
    }

    /// Maximum absolute value over all fields.
    pub fn max_abs(&self) -> f64 {
        self.values().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    /// Maximum absolute difference to another buffer.
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.values()
            .zip(other.values())
            .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()))
    }

    /// First value that is NaN or infinite, with its field kind and flat offset.
    pub fn first_non_finite(&self) -> Option<(FieldKind, usize, f64)> {
        if let Some((i, &v)) = self.components.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Some((FieldKind::Component, i, v));
        }
        self.tracers
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
            .map(|(i, &v)| (FieldKind::Tracer, i, v))
    }

    /// Check that another buffer has the same layout.
    pub fn check_layout(&self, expected: FieldLayout) -> Result<()> {
        if self.layout != expected {
            return Err(TimestepError::layout_mismatch(
                expected.to_string(),
                self.layout.to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(feature = "parallel"))]
fn scale_slice(x: &mut [f64], c: f64) {
    for v in x.iter_mut() {
        *v *= c;
    }
}

#[cfg(not(feature = "parallel"))]
fn axpy_slice(x: &mut [f64], c: f64, y: &[f64]) {
    for (xi, &yi) in x.iter_mut().zip(y.iter()) {
        *xi += c * yi;
    }
}

#[cfg(feature = "parallel")]
fn scale_slice(x: &mut [f64], c: f64) {
    use rayon::prelude::*;
    x.par_iter_mut().for_each(|v| *v *= c);
}

#[cfg(feature = "parallel")]
fn axpy_slice(x: &mut [f64], c: f64, y: &[f64]) {
    use rayon::prelude::*;
    x.par_iter_mut()
        .zip(y.par_iter())
        .for_each(|(xi, &yi)| *xi += c * yi);
}

impl Integrable for StateBuffer {
    fn scale(&mut self, c: f64) {
        scale_slice(&mut self.components, c);
        scale_slice(&mut self.tracers, c);
    }

    fn axpy(&mut self, c: f64, other: &Self) {
        debug_assert_eq!(self.layout, other.layout);
        axpy_slice(&mut self.components, c, &other.components);
        axpy_slice(&mut self.tracers, c, &other.tracers);
    }

    fn zeros_like(&self) -> Self {
        Self::new(self.layout)
    }
}
