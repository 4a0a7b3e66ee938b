//! Sampler configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rollout length must be positive")]
    ZeroRollout,
    #[error("num_agents must be positive")]
    ZeroAgents,
}

/// Recognized sampler options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Multiplier applied to raw rewards before clipping.
    pub reward_scale: f32,
    /// Symmetric clamp bound applied after scaling.
    pub reward_clip: f32,
    /// Add `gamma * value * time_out` to rewards at artificial truncations.
    /// Valid only when intra-episode reward at the boundary is negligible.
    pub value_bootstrap: bool,
    /// Discount factor used by the bootstrap correction.
    pub gamma: f32,
    /// Environment steps per collected rollout.
    pub rollout: usize,
    /// Agent slots in the vectorized environment.
    pub num_agents: usize,
    /// Policy id stamped into every transition.
    pub policy_id: u32,
    /// Requested process niceness; denial is logged, never fatal.
    pub niceness: Option<i32>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            reward_scale: 1.0,
            reward_clip: 1000.0,
            value_bootstrap: false,
            gamma: 0.99,
            rollout: 32,
            num_agents: 1,
            policy_id: 0,
            niceness: None,
        }
    }
}

impl SamplerConfig {
    /// Set the reward scale.
    pub fn with_reward_scale(mut self, reward_scale: f32) -> Self {
        self.reward_scale = reward_scale;
        self
    }

    /// Set the symmetric reward clamp bound.
    pub fn with_reward_clip(mut self, reward_clip: f32) -> Self {
        self.reward_clip = reward_clip;
        self
    }

    /// Enable or disable the time-out value bootstrap.
    pub fn with_value_bootstrap(mut self, value_bootstrap: bool) -> Self {
        self.value_bootstrap = value_bootstrap;
        self
    }

    /// Set the discount factor.
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the rollout length.
    pub fn with_rollout(mut self, rollout: usize) -> Self {
        self.rollout = rollout;
        self
    }

    /// Set the number of agent slots.
    pub fn with_num_agents(mut self, num_agents: usize) -> Self {
        self.num_agents = num_agents;
        self
    }

    /// Set the policy id.
    pub fn with_policy_id(mut self, policy_id: u32) -> Self {
        self.policy_id = policy_id;
        self
    }

    /// Request a process niceness at init.
    pub fn with_niceness(mut self, niceness: i32) -> Self {
        self.niceness = Some(niceness);
        self
    }

    /// Reject configurations the driver cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rollout == 0 {
            return Err(ConfigError::ZeroRollout);
        }
        if self.num_agents == 0 {
            return Err(ConfigError::ZeroAgents);
        }
        Ok(())
    }
}
