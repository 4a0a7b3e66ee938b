//! The event-driven rollout sampler.
//!
//! One driver per worker thread: it owns its environment, pulls weights
//! through a shared slot, writes transitions into pooled trajectory slices
//! and hands each filled slice off exactly once.

pub mod driver;
pub mod process;

#[cfg(test)]
mod tests;

pub use driver::{spawn_sampler, DriverState, Sampler, SamplerError, SamplerHandle};
