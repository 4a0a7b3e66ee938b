//! Policy version stamping on the publishing side.
//!
//! Trajectories record which weight snapshot produced each action, so the
//! consumer can measure staleness. The version number is assigned here, at
//! the moment weights are published: the publisher owns a forward-only
//! counter and stamps every snapshot it pushes into the shared slot.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::weight_slot::SharedWeightSlot;

/// Forward-only version counter. 0 means "initial snapshot, no update yet".
#[derive(Debug, Default)]
pub struct VersionCounter {
    version: AtomicU64,
}

impl VersionCounter {
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
        }
    }

    /// Advance the counter, returning the version just assigned.
    pub fn increment(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last assigned version.
    pub fn current(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Learner-side handle pairing a weight slot with the version counter.
///
/// Every `publish` stamps the snapshot with the next version, so versions
/// seen by samplers are dense and monotonic even when an unconsumed
/// snapshot gets overwritten in the slot.
pub struct WeightPublisher<M> {
    slot: SharedWeightSlot<M>,
    version: VersionCounter,
}

impl<M> WeightPublisher<M> {
    pub fn new(slot: SharedWeightSlot<M>) -> Self {
        Self {
            slot,
            version: VersionCounter::new(),
        }
    }

    /// Stamp `model` with the next version and push it into the slot,
    /// overwriting any pending snapshot. Returns the assigned version.
    pub fn publish(&self, model: M) -> u64 {
        let version = self.version.increment();
        self.slot.publish(model, version);
        version
    }

    /// Version of the most recently published snapshot.
    pub fn current_version(&self) -> u64 {
        self.version.current()
    }
}
