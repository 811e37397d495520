//! The likelihood accelerator contract.
//!
//! An accelerator holds cached sufficient statistics for one chain. The
//! cheap [`LikelihoodAccelerator::evaluate`] reads those statistics plus the
//! extrinsic parameters of a state; the `update_*` hooks recompute the parts
//! of the cache that depend on intrinsic parameters. The sampler takes a
//! [`LikelihoodAccelerator::snapshot`] before any update that might be
//! rejected and hands it back through [`LikelihoodAccelerator::restore`].

use crate::parameters::ParameterState;
use std::ops::{Deref, DerefMut};

/// Cached, incrementally updatable log-likelihood.
pub trait LikelihoodAccelerator: Send {
    /// Owned copy of every mutable cache field, including any tracking of
    /// which intrinsic values the cache was last built for.
    type Snapshot: Clone + Send;

    /// Log-likelihood of `state` from the current cache.
    fn evaluate(&self, state: &ParameterState) -> f64;

    /// Full recomputation after the shared intrinsic parameters change.
    fn update_intrinsic(&mut self, state: &ParameterState);

    /// Recompute the distance-dependent statistics of one unit.
    fn update_unit_distance(&mut self, state: &ParameterState, unit: usize);

    /// Recompute the noise-dependent statistics of the given units.
    fn update_unit_noise(&mut self, state: &ParameterState, units: &[usize]);

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Zero the statistics of every unit except `unit`, and the terms of
    /// `unit` that do not depend on its own phase or distance.
    ///
    /// Only used inside a snapshot/restore bracket while estimating per-unit
    /// curvature.
    fn isolate_unit(&mut self, unit: usize);

    /// Cheap physical admissibility check run before any cache update.
    fn is_admissible(&self, _state: &ParameterState) -> bool {
        true
    }

    /// Whether the cache was built for the intrinsic values in `state`.
    fn is_synchronized(&self, _state: &ParameterState) -> bool {
        true
    }
}

/// Restores an accelerator to the snapshot taken at construction when
/// dropped, including during unwinding.
pub struct CacheGuard<'a, A: LikelihoodAccelerator> {
    accelerator: &'a mut A,
    snapshot: Option<A::Snapshot>,
}

impl<'a, A: LikelihoodAccelerator> CacheGuard<'a, A> {
    pub fn new(accelerator: &'a mut A) -> Self {
        let snapshot = Some(accelerator.snapshot());
        Self {
            accelerator,
            snapshot,
        }
    }

    /// Restore the guarded snapshot now, keeping the guard alive.
    pub fn reset(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            self.accelerator.restore(snapshot.clone());
        }
    }
}

impl<A: LikelihoodAccelerator> Deref for CacheGuard<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        &*self.accelerator
    }
}

impl<A: LikelihoodAccelerator> DerefMut for CacheGuard<'_, A> {
    fn deref_mut(&mut self) -> &mut A {
        &mut *self.accelerator
    }
}

impl<A: LikelihoodAccelerator> Drop for CacheGuard<'_, A> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.accelerator.restore(snapshot);
        }
    }
}
