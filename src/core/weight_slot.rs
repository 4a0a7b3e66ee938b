//! Single-slot weight hand-off between learner and sampler.
//!
//! Swap semantics keep memory bounded: a new publication overwrites any
//! pending update, so at most one model waits in the slot at any time and
//! the sampler holds at most its current model plus one pending update.
//! Taking from the slot is a bounded lock acquisition, never an indefinite
//! wait - this is what keeps `ensure_weights_updated` non-blocking in
//! single-process mode.

use parking_lot::Mutex;
use std::sync::Arc;

/// Single-slot container carrying `(model, policy_version)` pairs.
pub struct WeightSlot<M> {
    pending: Mutex<Option<(M, u64)>>,
}

impl<M> WeightSlot<M> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    /// Publish new weights, overwriting any pending update.
    ///
    /// Returns true if a pending update was dropped.
    pub fn publish(&self, model: M, version: u64) -> bool {
        let mut guard = self.pending.lock();
        let was_pending = guard.is_some();
        *guard = Some((model, version));
        was_pending
    }

    /// Take the pending weights, leaving the slot empty.
    pub fn take(&self) -> Option<(M, u64)> {
        self.pending.lock().take()
    }

    /// Whether an update is waiting.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Version of the pending update without taking it.
    pub fn pending_version(&self) -> Option<u64> {
        self.pending.lock().as_ref().map(|(_, v)| *v)
    }
}

impl<M> Default for WeightSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared weight slot.
pub type SharedWeightSlot<M> = Arc<WeightSlot<M>>;

/// Create a new shared weight slot.
pub fn weight_slot<M>() -> SharedWeightSlot<M> {
    Arc::new(WeightSlot::new())
}
