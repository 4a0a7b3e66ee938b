//! Parameter synchronization client.
//!
//! Owns the sampler-side copy of the model and tracks which policy version
//! it corresponds to. Fresh weights arrive through a shared [`WeightSlot`];
//! pulling them is a bounded swap, so the sampler never waits on the
//! learner.

use crate::core::weight_slot::SharedWeightSlot;

/// Sampler-side weight holder.
pub struct ParameterClient<M> {
    slot: SharedWeightSlot<M>,
    model: Option<M>,
    latest_version: u64,
}

impl<M> ParameterClient<M> {
    /// Client with no weights yet; `weights_initialized` must run before
    /// inference.
    pub fn new(slot: SharedWeightSlot<M>) -> Self {
        Self {
            slot,
            model: None,
            latest_version: 0,
        }
    }

    /// Install the initial weight snapshot.
    pub fn weights_initialized(&mut self, model: M, policy_version: u64) {
        self.model = Some(model);
        self.latest_version = policy_version;
    }

    /// Pull newer weights if any are pending. Returns true if the model was
    /// swapped. Synchronous and non-blocking: an empty slot is a no-op.
    pub fn ensure_weights_updated(&mut self) -> bool {
        match self.slot.take() {
            Some((model, version)) => {
                self.model = Some(model);
                self.latest_version = version;
                true
            }
            None => false,
        }
    }

    /// Version of the currently installed weights.
    pub fn latest_policy_version(&self) -> u64 {
        self.latest_version
    }

    /// The currently installed model, if initialized.
    pub fn model(&self) -> Option<&M> {
        self.model.as_ref()
    }

    /// Release held resources. Any weights still pending in the slot stay
    /// there for other clients.
    pub fn cleanup(&mut self) {
        self.model = None;
    }
}
