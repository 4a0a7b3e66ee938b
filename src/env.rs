//! Vectorized environment abstraction.
//!
//! The simulator is a collaborator: the sampler only consumes its
//! reset/step contract. Observations arrive as a [`TensorDict`] keyed the
//! same way the trajectory slices are, so a step result can be written
//! straight into a slice.

use std::collections::HashMap;

use crate::core::tensor::{Tensor, TensorDict};

/// Capability flags declared by an environment.
///
/// These drive action post-processing in the policy bridge: integer action
/// spaces get a fixed-width integer coercion, and environments that cannot
/// consume device-resident tensors receive host copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCapabilities {
    /// Actions are discrete indices; coerce to i32 before stepping.
    pub integer_actions: bool,
    /// The environment can consume device-resident action tensors.
    pub gpu_actions: bool,
}

/// Per-agent auxiliary info attached to one step.
#[derive(Debug, Clone, Default)]
pub struct AgentInfo {
    /// Environment-defined success measure; falls back to total reward.
    pub true_objective: Option<f32>,
    /// Extra per-episode stats surfaced in episode reports.
    pub extra_stats: HashMap<String, f32>,
    /// Episode was cut by a time limit rather than a true terminal.
    pub time_out: bool,
}

/// Canonical auxiliary-info shape for a vectorized step.
///
/// One representation only: a per-agent list of records, or nothing.
/// Environments that produce a dict-of-arrays must convert in their
/// [`VectorizedEnv`] impl; when info is absent the episode tracker falls
/// back to defaults (true objective = reward, no extra stats).
#[derive(Debug, Clone, Default)]
pub enum StepInfo {
    #[default]
    None,
    PerAgent(Vec<AgentInfo>),
}

impl StepInfo {
    /// Info record for one agent, when per-agent info is present.
    pub fn agent(&self, index: usize) -> Option<&AgentInfo> {
        match self {
            StepInfo::None => None,
            StepInfo::PerAgent(infos) => infos.get(index),
        }
    }

    /// Per-agent time-out flags as 0.0/1.0, or None when no agent carries
    /// the signal (value bootstrap is skipped in that case).
    pub fn time_outs(&self, num_agents: usize) -> Option<Vec<f32>> {
        match self {
            StepInfo::None => None,
            StepInfo::PerAgent(infos) => {
                if infos.iter().all(|i| !i.time_out) {
                    return None;
                }
                let mut flags = vec![0.0; num_agents];
                for (flag, info) in flags.iter_mut().zip(infos) {
                    *flag = if info.time_out { 1.0 } else { 0.0 };
                }
                Some(flags)
            }
        }
    }
}

/// Result of stepping all agents once. Ephemeral; consumed immediately.
#[derive(Debug, Clone)]
pub struct EnvStepResult {
    /// Per-agent observations, agent-major `[num_agents, ...]` per leaf.
    pub observations: TensorDict,
    /// Raw (unshaped) rewards per agent.
    pub rewards: Vec<f32>,
    /// Episode-completion flags per agent.
    pub dones: Vec<bool>,
    /// Auxiliary info.
    pub info: StepInfo,
}

/// A vectorized simulation environment stepping all agents in lockstep.
pub trait VectorizedEnv: Send {
    /// Number of agent slots.
    fn num_agents(&self) -> usize;

    /// Declared capability flags.
    fn capabilities(&self) -> EnvCapabilities;

    /// Reset all agents, returning the initial observations.
    fn reset(&mut self) -> TensorDict;

    /// Step all agents with one action row per agent.
    fn step(&mut self, actions: &Tensor) -> EnvStepResult;
}
