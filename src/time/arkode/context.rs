//! Vectors and callbacks for the adaptive stepper, backed by container
//! instances.
//!
//! Each stepper vector is one instance slot of the [`StateContainer`].
//! Instance 0 is the solution itself; the others come from an
//! [`InstancePool`]. A [`CallbackContext`] lives for one `Step` call and
//! routes the stepper's right-hand-side callbacks to the [`RhsEvaluator`].

use crate::ark::{ArkError, ArkSystem, VectorOps, VectorPool};
use crate::error::TimestepError;
use crate::rhs::RhsEvaluator;
use crate::state::{StateBuffer, StateContainer};
use crate::types::InstanceIndex;

/// Free list of the instances available as stepper work vectors.
#[derive(Clone, Debug)]
pub struct InstancePool {
    free: Vec<InstanceIndex>,
    capacity: usize,
}

impl InstancePool {
    /// Pool over instances `1..n_instances`; instance 0 is never handed out.
    pub fn new(n_instances: usize) -> Self {
        // Reverse order so low indices are handed out first
        let free = (1..n_instances).rev().map(InstanceIndex::new).collect();
        Self {
            free,
            capacity: n_instances.saturating_sub(1),
        }
    }

    /// Take an instance.
    pub fn acquire(&mut self) -> Option<InstanceIndex> {
        self.free.pop()
    }

    /// Return an instance.
    pub fn release(&mut self, index: InstanceIndex) {
        if index != InstanceIndex::CURRENT && !self.free.contains(&index) {
            self.free.push(index);
        }
    }

    /// Instances currently handed out.
    pub fn in_use(&self) -> usize {
        self.capacity - self.free.len()
    }

    /// Instances still free.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// Everything the stepper's callbacks need during one `Step` call.
pub struct CallbackContext<'a> {
    state: &'a mut StateContainer,
    rhs: &'a mut dyn RhsEvaluator,
    pool: &'a mut InstancePool,
    scratch: Option<StateBuffer>,
    failure: Option<TimestepError>,
}

impl<'a> CallbackContext<'a> {
    /// Borrow the container, evaluator and instance pool for one `Step` call.
    pub fn new(
        state: &'a mut StateContainer,
        rhs: &'a mut dyn RhsEvaluator,
        pool: &'a mut InstancePool,
    ) -> Self {
        Self {
            state,
            rhs,
            pool,
            scratch: None,
            failure: None,
        }
    }

    /// The first evaluator or container error raised inside a callback.
    pub fn take_failure(&mut self) -> Option<TimestepError> {
        self.failure.take()
    }

    fn record(&mut self, err: TimestepError) -> ArkError {
        let message = err.to_string();
        self.failure.get_or_insert(err);
        ArkError::Vector(message)
    }

    /// Apply `f` elementwise from `x` into `z`.
    fn map(&mut self, x: InstanceIndex, z: InstanceIndex, f: impl Fn(f64) -> f64) -> Result<(), ArkError> {
        let result = if x == z {
            self.state.buffer_mut(z).map(|b| b.values_mut().for_each(|v| *v = f(*v)))
        } else {
            self.state.pair_mut(x, z).map(|(src, dst)| {
                for (d, s) in dst.values_mut().zip(src.values()) {
                    *d = f(*s);
                }
            })
        };
        result.map_err(|e| self.record(e))
    }

    fn read<T>(&self, f: impl FnOnce(&StateContainer) -> crate::error::Result<T>) -> Result<T, ArkError> {
        f(&*self.state).map_err(|e| ArkError::Vector(e.to_string()))
    }

    fn evaluate(
        &mut self,
        which: &'static str,
        t: f64,
        y: InstanceIndex,
        ydot: InstanceIndex,
        eval: impl FnOnce(&mut dyn RhsEvaluator, &StateBuffer, &mut StateBuffer) -> crate::error::Result<()>,
    ) -> Result<(), ArkError> {
        let result = match self.state.pair_mut(y, ydot) {
            Ok((src, dst)) => eval(&mut *self.rhs, src, dst),
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            let message = e.to_string();
            self.failure.get_or_insert(e);
            ArkError::RhsFailed {
                which,
                time: t,
                message,
            }
        })
    }
}

impl VectorPool for InstancePool {
    type Handle = InstanceIndex;

    fn clone_vector(&mut self, _template: InstanceIndex) -> Result<InstanceIndex, ArkError> {
        self.acquire().ok_or_else(|| {
            ArkError::MemoryFail(format!("all {} work instances are in use", self.in_use()))
        })
    }

    fn destroy_vector(&mut self, v: InstanceIndex) {
        self.release(v);
    }
}

impl VectorPool for CallbackContext<'_> {
    type Handle = InstanceIndex;

    fn clone_vector(&mut self, template: InstanceIndex) -> Result<InstanceIndex, ArkError> {
        self.pool.clone_vector(template)
    }

    fn destroy_vector(&mut self, v: InstanceIndex) {
        self.pool.destroy_vector(v);
    }
}

impl VectorOps for CallbackContext<'_> {
    fn linear_sum(
        &mut self,
        a: f64,
        x: InstanceIndex,
        b: f64,
        y: InstanceIndex,
        z: InstanceIndex,
    ) -> Result<(), ArkError> {
        self.state
            .linear_combination(z, &[(a, x), (b, y)])
            .map_err(|e| self.record(e))
    }

    fn linear_combination(&mut self, terms: &[(f64, InstanceIndex)], z: InstanceIndex) -> Result<(), ArkError> {
        self.state.linear_combination(z, terms).map_err(|e| self.record(e))
    }

    fn scale(&mut self, c: f64, x: InstanceIndex, z: InstanceIndex) -> Result<(), ArkError> {
        self.state
            .linear_combination(z, &[(c, x)])
            .map_err(|e| self.record(e))
    }

    fn constant(&mut self, c: f64, z: InstanceIndex) -> Result<(), ArkError> {
        self.state
            .buffer_mut(z)
            .map(|b| b.fill(c))
            .map_err(|e| self.record(e))
    }

    fn abs(&mut self, x: InstanceIndex, z: InstanceIndex) -> Result<(), ArkError> {
        self.map(x, z, f64::abs)
    }

    fn inv(&mut self, x: InstanceIndex, z: InstanceIndex) -> Result<(), ArkError> {
        self.map(x, z, f64::recip)
    }

    fn add_const(&mut self, x: InstanceIndex, b: f64, z: InstanceIndex) -> Result<(), ArkError> {
        self.map(x, z, |v| v + b)
    }

    fn dot(&self, x: InstanceIndex, y: InstanceIndex) -> Result<f64, ArkError> {
        self.read(|s| {
            let (x, y) = (s.buffer(x)?, s.buffer(y)?);
            Ok(x.values().zip(y.values()).map(|(a, b)| a * b).sum())
        })
    }

    fn wrms_norm(&self, x: InstanceIndex, w: InstanceIndex) -> Result<f64, ArkError> {
        self.read(|s| {
            let (x, w) = (s.buffer(x)?, s.buffer(w)?);
            let n = s.layout().len().max(1);
            let sum: f64 = x.values().zip(w.values()).map(|(a, b)| (a * b).powi(2)).sum();
            Ok((sum / n as f64).sqrt())
        })
    }

    fn max_norm(&self, x: InstanceIndex) -> Result<f64, ArkError> {
        self.read(|s| Ok(s.buffer(x)?.max_abs()))
    }
}

impl ArkSystem for CallbackContext<'_> {
    fn explicit_rhs(&mut self, t: f64, y: InstanceIndex, ydot: InstanceIndex) -> Result<(), ArkError> {
        self.evaluate("explicit", t, y, ydot, |rhs, src, dst| rhs.explicit_rhs(src, t, dst))
    }

    fn implicit_rhs(&mut self, t: f64, y: InstanceIndex, ydot: InstanceIndex) -> Result<(), ArkError> {
        self.evaluate("implicit", t, y, ydot, |rhs, src, dst| rhs.implicit_rhs(src, t, dst))
    }

    fn full_rhs(&mut self, t: f64, y: InstanceIndex, ydot: InstanceIndex) -> Result<(), ArkError> {
        // Allocated once per context and reused by every full evaluation
        let mut scratch = match self.scratch.take() {
            Some(buffer) => buffer,
            None => StateBuffer::new(self.state.layout()),
        };
        let result = self.evaluate("full", t, y, ydot, |rhs, src, dst| {
            rhs.full_rhs(src, t, dst, &mut scratch)
        });
        self.scratch = Some(scratch);
        result
    }
}
