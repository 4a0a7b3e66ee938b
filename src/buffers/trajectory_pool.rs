//! Fixed pool of pooled trajectory slices.
//!
//! The pool owns an arena of rollout-sized [`TensorDict`] slices addressed
//! by opaque integer handles. A bounded lock-free free-list provides the
//! non-blocking acquire path; checking a slice out moves its storage out of
//! the arena, so the Rust ownership system enforces the single-writer
//! discipline: a slice is Free (in the arena), Filling (owned by exactly
//! one driver), or handed off (moved into an outbound event) - never two of
//! these at once. The consumer returns a slice with [`TrajectoryPool::recycle`],
//! which is the moment a "buffer released" wake-up becomes meaningful.

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::core::tensor::{Tensor, TensorDict};

/// Opaque handle identifying one arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliceHandle(usize);

impl SliceHandle {
    /// Raw slot index, for logging.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Shape description for one trajectory slice.
///
/// Every per-step leaf has a leading time axis of `rollout + 1` rows - the
/// trailing row holds the observation/recurrent state the consumer needs
/// for its bootstrap value estimate - and an agent axis of `num_agents`.
#[derive(Debug, Clone)]
pub struct TrajectoryLayout {
    /// Steps per collected rollout (time axis is `rollout + 1`).
    pub rollout: usize,
    /// Agent slots per step.
    pub num_agents: usize,
    /// Observation leaves: (key, per-agent shape).
    pub obs_shapes: Vec<(String, Vec<usize>)>,
    /// Recurrent state width per agent.
    pub rnn_size: usize,
    /// Action components per agent.
    pub action_dims: usize,
    /// Additional policy-output leaves: (key, per-agent shape).
    pub extra_outputs: Vec<(String, Vec<usize>)>,
}

impl TrajectoryLayout {
    pub fn new(rollout: usize, num_agents: usize) -> Self {
        Self {
            rollout,
            num_agents,
            obs_shapes: Vec::new(),
            rnn_size: 1,
            action_dims: 1,
            extra_outputs: Vec::new(),
        }
    }

    /// Add an observation leaf with the given per-agent shape.
    pub fn with_obs(mut self, key: impl Into<String>, shape: &[usize]) -> Self {
        self.obs_shapes.push((key.into(), shape.to_vec()));
        self
    }

    /// Set the recurrent state width.
    pub fn with_rnn_size(mut self, rnn_size: usize) -> Self {
        self.rnn_size = rnn_size;
        self
    }

    /// Set the number of action components.
    pub fn with_action_dims(mut self, action_dims: usize) -> Self {
        self.action_dims = action_dims;
        self
    }

    /// Add a policy-specific output leaf with the given per-agent shape.
    pub fn with_extra_output(mut self, key: impl Into<String>, shape: &[usize]) -> Self {
        self.extra_outputs.push((key.into(), shape.to_vec()));
        self
    }

    fn step_shape(&self, per_agent: &[usize]) -> Vec<usize> {
        let mut shape = vec![self.rollout + 1, self.num_agents];
        shape.extend_from_slice(per_agent);
        shape
    }

    /// Build one zeroed slice with this layout.
    pub fn build_slice(&self) -> TensorDict {
        let mut obs = TensorDict::new();
        for (key, shape) in &self.obs_shapes {
            obs.insert_leaf(key.clone(), Tensor::zeros(&self.step_shape(shape)));
        }

        let mut slice = TensorDict::new();
        slice.insert_node("obs", obs);
        slice.insert_leaf(
            "rnn_states",
            Tensor::zeros(&self.step_shape(&[self.rnn_size])),
        );
        slice.insert_leaf("actions", Tensor::zeros(&self.step_shape(&[self.action_dims])));
        slice.insert_leaf("values", Tensor::zeros(&self.step_shape(&[])));
        slice.insert_leaf("rewards", Tensor::zeros(&self.step_shape(&[])));
        slice.insert_leaf("dones", Tensor::zeros(&self.step_shape(&[])));
        slice.insert_leaf("policy_id", Tensor::zeros_i32(&self.step_shape(&[])));
        slice.insert_leaf("policy_version", Tensor::zeros_i32(&self.step_shape(&[])));
        for (key, shape) in &self.extra_outputs {
            slice.insert_leaf(key.clone(), Tensor::zeros(&self.step_shape(shape)));
        }
        slice
    }
}

/// Bounded pool of trajectory slices.
pub struct TrajectoryPool {
    layout: TrajectoryLayout,
    slots: Vec<Mutex<Option<TensorDict>>>,
    free: ArrayQueue<usize>,
}

impl TrajectoryPool {
    /// Allocate `capacity` slices with the given layout; all start free.
    pub fn new(layout: TrajectoryLayout, capacity: usize) -> Self {
        let slots: Vec<Mutex<Option<TensorDict>>> = (0..capacity)
            .map(|_| Mutex::new(Some(layout.build_slice())))
            .collect();
        let free = ArrayQueue::new(capacity.max(1));
        for i in 0..capacity {
            // Queue capacity equals slot count; push cannot fail here.
            let _ = free.push(i);
        }
        Self {
            layout,
            slots,
            free,
        }
    }

    pub fn layout(&self) -> &TrajectoryLayout {
        &self.layout
    }

    /// Total number of slices (fixed at construction).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slices currently free.
    pub fn free_slices(&self) -> usize {
        self.free.len()
    }

    /// Non-blocking attempt to check a free slice out.
    ///
    /// Returns the handle plus the slice storage, moved out of the arena.
    /// None is the backpressure signal: the caller must defer and retry
    /// when a release wake-up arrives, not wait here.
    pub fn try_acquire(&self) -> Option<(SliceHandle, TensorDict)> {
        let index = self.free.pop()?;
        let slice = self.slots[index].lock().take();
        debug_assert!(slice.is_some(), "free-list handle pointed at an empty slot");
        slice.map(|s| (SliceHandle(index), s))
    }

    /// Consumer-side return path: put a slice back and mark it free.
    ///
    /// Called once the downstream consumer is finished with a handed-off
    /// slice; the matching "buffer released" event should follow so a
    /// deferred driver wakes up.
    pub fn recycle(&self, handle: SliceHandle, slice: TensorDict) {
        let mut guard = self.slots[handle.0].lock();
        debug_assert!(guard.is_none(), "recycled a slice into an occupied slot");
        *guard = Some(slice);
        // Capacity matches the slot count, so this cannot overflow.
        let _ = self.free.push(handle.0);
    }
}

/// Thread-safe shared pool.
pub type SharedTrajectoryPool = Arc<TrajectoryPool>;

/// Create a new shared trajectory pool.
pub fn trajectory_pool(layout: TrajectoryLayout, capacity: usize) -> SharedTrajectoryPool {
    Arc::new(TrajectoryPool::new(layout, capacity))
}
