//! Core types shared across the sampler.

pub mod episode_stats;
pub mod policy_version;
pub mod tensor;
pub mod weight_slot;

pub use episode_stats::{EpisodeReport, EpisodeTracker};
pub use policy_version::{VersionCounter, WeightPublisher};
pub use tensor::{Device, Tensor, TensorDict, TensorError, TensorTree};
pub use weight_slot::{weight_slot, SharedWeightSlot, WeightSlot};
