//! Instance-slot storage for the model state.
//!
//! A time-stepping scheme declares how many component and tracer instances
//! it needs; the driver allocates exactly that many slots before the first
//! step. Instance 0 holds the current state between steps.

use std::cell::Cell;

use crate::error::{Result, TimestepError};
use crate::state::{FieldLayout, Integrable, StateBuffer};
use crate::types::{FieldKind, InstanceIndex};

/// Collection of state buffers addressed by [`InstanceIndex`].
#[derive(Clone, Debug)]
pub struct StateContainer {
    layout: FieldLayout,
    instances: Vec<StateBuffer>,
    component_instances: usize,
    tracer_instances: usize,
    /// Highest instance index handed out since the last reset
    max_accessed: Cell<Option<usize>>,
}

impl StateContainer {
    /// Allocate slots for the given instance counts.
    ///
    /// # Errors
    /// Returns a configuration error if no component instance is requested,
    /// or if the layout has tracers but no tracer instance is requested.
    pub fn allocate(
        layout: FieldLayout,
        component_instances: usize,
        tracer_instances: usize,
    ) -> Result<Self> {
        if component_instances == 0 {
            return Err(TimestepError::configuration(
                "at least one component instance is required",
            ));
        }
        if layout.has_tracers() && tracer_instances == 0 {
            return Err(TimestepError::configuration(
                "layout has tracers but no tracer instances were requested",
            ));
        }

        let n_slots = component_instances.max(tracer_instances);
        Ok(Self {
            layout,
            instances: (0..n_slots).map(|_| StateBuffer::new(layout)).collect(),
            component_instances,
            tracer_instances,
            max_accessed: Cell::new(None),
        })
    }

    /// Field layout shared by every slot.
    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    /// Number of component instances allocated.
    pub fn component_instances(&self) -> usize {
        self.component_instances
    }

    /// Number of tracer instances allocated.
    pub fn tracer_instances(&self) -> usize {
        self.tracer_instances
    }

    /// Number of slots usable for full-state (component + tracer) operations.
    pub fn usable_instances(&self) -> usize {
        if self.layout.has_tracers() {
            self.component_instances.min(self.tracer_instances)
        } else {
            self.component_instances
        }
    }

    /// Validate a full-state instance index and record the access.
    pub fn check(&self, index: InstanceIndex) -> Result<()> {
        let i = index.get();
        if i >= self.component_instances {
            return Err(TimestepError::InstanceOutOfRange {
                kind: FieldKind::Component,
                index,
                available: self.component_instances,
            });
        }
        if self.layout.has_tracers() && i >= self.tracer_instances {
            return Err(TimestepError::InstanceOutOfRange {
                kind: FieldKind::Tracer,
                index,
                available: self.tracer_instances,
            });
        }
        let seen = self.max_accessed.get().map_or(i, |m| m.max(i));
        self.max_accessed.set(Some(seen));
        Ok(())
    }

    /// Highest instance index accessed since allocation or the last reset.
    pub fn max_instance_accessed(&self) -> Option<InstanceIndex> {
        self.max_accessed.get().map(InstanceIndex::new)
    }

    /// Forget the recorded access high-water mark.
    pub fn reset_access_tracking(&self) {
        self.max_accessed.set(None);
    }

    /// Borrow an instance.
    pub fn buffer(&self, index: InstanceIndex) -> Result<&StateBuffer> {
        self.check(index)?;
        Ok(&self.instances[index.get()])
    }

    /// Borrow an instance mutably.
    pub fn buffer_mut(&mut self, index: InstanceIndex) -> Result<&mut StateBuffer> {
        self.check(index)?;
        Ok(&mut self.instances[index.get()])
    }

    /// The canonical current state.
    pub fn current(&self) -> &StateBuffer {
        &self.instances[0]
    }

    /// The canonical current state, mutably.
    pub fn current_mut(&mut self) -> &mut StateBuffer {
        &mut self.instances[0]
    }

    /// Replace the current state with a copy of `state`.
    pub fn set_current(&mut self, state: &StateBuffer) -> Result<()> {
        state.check_layout(self.layout)?;
        self.instances[0].copy_from(state);
        Ok(())
    }

    /// Borrow one instance for reading and a different one for writing.
    ///
    /// # Errors
    /// Returns a configuration error if `src == dst`; stage buffers are never
    /// aliased.
    pub fn pair_mut(
        &mut self,
        src: InstanceIndex,
        dst: InstanceIndex,
    ) -> Result<(&StateBuffer, &mut StateBuffer)> {
        self.check(src)?;
        self.check(dst)?;
        split_pair(&mut self.instances, src.get(), dst.get()).ok_or_else(|| {
            TimestepError::configuration(format!("instance {src} cannot be both source and target"))
        })
    }

    /// Like [`pair_mut`](Self::pair_mut), plus a third instance as work space.
    ///
    /// # Errors
    /// Returns a configuration error unless the three indices differ.
    pub fn triple_mut(
        &mut self,
        src: InstanceIndex,
        dst: InstanceIndex,
        work: InstanceIndex,
    ) -> Result<(&StateBuffer, &mut StateBuffer, &mut StateBuffer)> {
        let wanted = [src, dst, work];
        for &i in &wanted {
            self.check(i)?;
        }
        if src == dst || src == work || dst == work {
            return Err(TimestepError::configuration(format!(
                "instances {src}, {dst} and {work} must be distinct"
            )));
        }
        let mut picked: [Option<&mut StateBuffer>; 3] = [None, None, None];
        for (i, buffer) in self.instances.iter_mut().enumerate() {
            if let Some(slot) = wanted.iter().position(|w| w.get() == i) {
                picked[slot] = Some(buffer);
            }
        }
        match picked {
            [Some(a), Some(b), Some(c)] => Ok((&*a, b, c)),
            _ => Err(TimestepError::configuration("instance lookup failed")),
        }
    }

    /// Copy instance `src` into instance `dst`.
    pub fn copy(&mut self, dst: InstanceIndex, src: InstanceIndex) -> Result<()> {
        if dst == src {
            return self.check(dst);
        }
        let (from, to) = self.pair_mut(src, dst)?;
        to.copy_from(from);
        Ok(())
    }

    /// Set instance `dst` to `sum_j c_j * instance_j`.
    ///
    /// `dst` may appear among the terms; its old value is used.
    pub fn linear_combination(
        &mut self,
        dst: InstanceIndex,
        terms: &[(f64, InstanceIndex)],
    ) -> Result<()> {
        self.check(dst)?;
        for &(_, src) in terms {
            self.check(src)?;
        }

        let self_coef: f64 = terms
            .iter()
            .filter(|(_, src)| *src == dst)
            .map(|(c, _)| *c)
            .sum();
        if self_coef == 0.0 {
            self.instances[dst.get()].fill(0.0);
        } else {
            self.instances[dst.get()].scale(self_coef);
        }

        for &(c, src) in terms.iter().filter(|(_, src)| *src != dst) {
            if c == 0.0 {
                continue;
            }
            if let Some((from, to)) = split_pair(&mut self.instances, src.get(), dst.get()) {
                to.axpy(c, from);
            }
        }
        Ok(())
    }
}

/// Borrow `items[src]` shared and `items[dst]` exclusively.
fn split_pair<T>(items: &mut [T], src: usize, dst: usize) -> Option<(&T, &mut T)> {
    use std::cmp::Ordering;
    match src.cmp(&dst) {
        Ordering::Less => {
            let (head, tail) = items.split_at_mut(dst);
            Some((&head[src], &mut tail[0]))
        }
        Ordering::Greater => {
            let (head, tail) = items.split_at_mut(src);
            Some((&tail[0], &mut head[dst]))
        }
        Ordering::Equal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> StateContainer {
        StateContainer::allocate(FieldLayout::new(1, 1, 3), 4, 4).unwrap()
    }

    #[test]
    fn test_allocate_rejects_zero_instances() {
        assert!(StateContainer::allocate(FieldLayout::new(1, 0, 3), 0, 0).is_err());
        assert!(StateContainer::allocate(FieldLayout::new(1, 2, 3), 3, 0).is_err());
        assert!(StateContainer::allocate(FieldLayout::new(1, 0, 3), 3, 0).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        let c = container();
        let err = c.buffer(InstanceIndex::new(4)).unwrap_err();
        assert!(matches!(
            err,
            TimestepError::InstanceOutOfRange { available: 4, .. }
        ));
    }

    #[test]
    fn test_tracer_count_limits_full_state_access() {
        let c = StateContainer::allocate(FieldLayout::new(1, 1, 2), 5, 3).unwrap();
        assert_eq!(c.usable_instances(), 3);
        let err = c.check(InstanceIndex::new(3)).unwrap_err();
        assert!(matches!(
            err,
            TimestepError::InstanceOutOfRange {
                kind: FieldKind::Tracer,
                ..
            }
        ));
    }

    #[test]
    fn test_access_tracking() {
        let c = container();
        assert_eq!(c.max_instance_accessed(), None);
        c.buffer(InstanceIndex::new(2)).unwrap();
        c.buffer(InstanceIndex::new(1)).unwrap();
        assert_eq!(c.max_instance_accessed(), Some(InstanceIndex::new(2)));
        c.reset_access_tracking();
        assert_eq!(c.max_instance_accessed(), None);
    }

    #[test]
    fn test_pair_mut_rejects_alias() {
        let mut c = container();
        let i = InstanceIndex::new(1);
        assert!(c.pair_mut(i, i).is_err());
    }

    #[test]
    fn test_triple_mut() {
        let mut c = container();
        c.current_mut().fill(2.0);
        let (src, dst, work) = c
            .triple_mut(InstanceIndex::CURRENT, InstanceIndex::new(3), InstanceIndex::new(1))
            .unwrap();
        work.copy_from(src);
        dst.fill(1.0);
        assert_eq!(c.buffer(InstanceIndex::new(1)).unwrap(), c.current());
        assert!(c.buffer(InstanceIndex::new(3)).unwrap().values().all(|&v| v == 1.0));

        let i = InstanceIndex::new(2);
        assert!(c.triple_mut(InstanceIndex::CURRENT, i, i).is_err());
        assert!(c.triple_mut(InstanceIndex::CURRENT, i, InstanceIndex::new(9)).is_err());
    }

    #[test]
    fn test_copy_and_linear_combination() {
        let mut c = container();
        c.current_mut().fill(2.0);
        c.copy(InstanceIndex::new(1), InstanceIndex::CURRENT).unwrap();
        c.buffer_mut(InstanceIndex::new(2)).unwrap().fill(1.0);

        // I1 <- 0.5 * I1 + 3 * I2 = 1 + 3
        c.linear_combination(
            InstanceIndex::new(1),
            &[(0.5, InstanceIndex::new(1)), (3.0, InstanceIndex::new(2))],
        )
        .unwrap();
        for &v in c.buffer(InstanceIndex::new(1)).unwrap().values() {
            assert!((v - 4.0).abs() < 1e-14);
        }
        // Source untouched
        assert!((c.current().components[0] - 2.0).abs() < 1e-14);
    }
}
