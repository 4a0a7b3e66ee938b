//! Shared trajectory storage.

pub mod trajectory_pool;

pub use trajectory_pool::{
    trajectory_pool, SharedTrajectoryPool, SliceHandle, TrajectoryLayout, TrajectoryPool,
};
