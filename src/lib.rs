//! # sampler-rl: Event-Driven Rollout Collection
//!
//! Threaded rollout sampling for reinforcement learning: each sampler
//! thread owns a vectorized environment, runs the current policy over it
//! and writes fixed-length trajectories into pooled shared buffers.
//!
//! ## Architecture Overview
//!
//! ```text
//!   orchestrator thread                    sampler thread
//!  ┌──────────────────┐  SamplerCommand  ┌────────────────┐
//!  │ request rollouts │ ───────────────> │  Sampler       │
//!  │ recycle slices   │                  │   env          │
//!  │ consume events   │ <─────────────── │   PolicyBridge │
//!  └───────┬──────────┘   SamplerEvent   └───────┬────────┘
//!          │                                     │
//!          │        ┌────────────────┐           │
//!          ├──────> │ TrajectoryPool │ <─────────┤  checkout / handoff
//!          │        │ (slice arena)  │           │
//!          │        └────────────────┘           │
//!          │        ┌────────────────┐           │
//!          └──────> │  WeightSlot    │ ──────────┘  swap-based weight sync
//!                   │ (single slot)  │
//!                   └────────────────┘
//! ```
//!
//! A trajectory slice is a nested [`TensorDict`] with a time axis of
//! `rollout + 1` rows; the trailing row carries the observation and
//! recurrent state the consumer needs for its bootstrap value estimate.
//! Slices are checked out of the pool by moving their storage, so exactly
//! one thread can ever write a slice, and a handed-off slice stays valid
//! until the consumer recycles it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sampler_rl::{
//!     trajectory_pool, weight_slot, SamplerCommand, SamplerConfig, TrajectoryLayout,
//!     sampler::spawn_sampler,
//! };
//!
//! let layout = TrajectoryLayout::new(32, 16)
//!     .with_obs("obs", &[4])
//!     .with_rnn_size(64)
//!     .with_action_dims(1);
//! let pool = trajectory_pool(layout, 8);
//! let slot = weight_slot();
//!
//! let handle = spawn_sampler(SamplerConfig::default(), pool, slot, env_factory)?;
//! handle.cmd_tx.send(SamplerCommand::Init { model, policy_version: 0 })?;
//! handle.cmd_tx.send(SamplerCommand::RequestTrajectories)?;
//! ```

pub mod buffers;
pub mod config;
pub mod core;
pub mod env;
pub mod messages;
pub mod policy;
pub mod sampler;

// Re-export commonly used types
pub use crate::core::episode_stats::{EpisodeReport, EpisodeTracker};
pub use crate::core::policy_version::{VersionCounter, WeightPublisher};
pub use crate::core::tensor::{Device, Tensor, TensorDict, TensorError, TensorTree};
pub use crate::core::weight_slot::{weight_slot, SharedWeightSlot, WeightSlot};

pub use crate::buffers::trajectory_pool::{
    trajectory_pool, SharedTrajectoryPool, SliceHandle, TrajectoryLayout, TrajectoryPool,
};

pub use crate::config::{ConfigError, SamplerConfig};

pub use crate::env::{AgentInfo, EnvCapabilities, EnvStepResult, StepInfo, VectorizedEnv};

pub use crate::messages::{ReportMsg, SamplerCommand, SamplerEvent};

pub use crate::policy::bridge::{PolicyBridge, PolicyModel, PolicyOutputs};
pub use crate::policy::param_client::ParameterClient;

pub use crate::sampler::driver::{spawn_sampler, DriverState, Sampler, SamplerError, SamplerHandle};
