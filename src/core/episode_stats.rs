//! Per-agent episode bookkeeping.
//!
//! The tracker owns one pair of running accumulators (reward sum, step
//! count) per agent slot, reused across episodes for the lifetime of the
//! driver. Each step every agent accumulates; every agent whose done flag
//! is set emits exactly one episode report and is reset exactly once.

use std::collections::HashMap;

use crate::env::StepInfo;

/// Summary of one finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeReport {
    /// Total (raw) reward accumulated over the episode.
    pub reward: f32,
    /// Episode length in steps.
    pub len: u32,
    /// Environment-defined success measure; defaults to total reward.
    pub true_objective: f32,
    /// Extra stats carried from per-agent auxiliary info, if any.
    pub extra_stats: Option<HashMap<String, f32>>,
}

/// Running episode accumulators for all agent slots.
#[derive(Debug)]
pub struct EpisodeTracker {
    reward: Vec<f32>,
    len: Vec<u32>,
}

impl EpisodeTracker {
    /// Zeroed accumulators for `num_agents` slots.
    pub fn new(num_agents: usize) -> Self {
        Self {
            reward: vec![0.0; num_agents],
            len: vec![0; num_agents],
        }
    }

    pub fn num_agents(&self) -> usize {
        self.reward.len()
    }

    /// Running reward sum for one agent since its last reset.
    pub fn reward(&self, agent: usize) -> f32 {
        self.reward[agent]
    }

    /// Running step count for one agent since its last reset.
    pub fn len(&self, agent: usize) -> u32 {
        self.len[agent]
    }

    /// Zero all accumulators.
    pub fn reset_all(&mut self) {
        self.reward.iter_mut().for_each(|r| *r = 0.0);
        self.len.iter_mut().for_each(|l| *l = 0);
    }

    /// Fold one step of raw rewards and done flags into the accumulators.
    ///
    /// Returns one report per agent whose done flag is set, in agent order.
    /// True objective and extra stats come from per-agent info when it is
    /// present and indexable for that agent; otherwise the documented
    /// defaults apply (true objective = total reward, no extra stats).
    /// Finished agents are reset to (0, 0) before this method returns.
    pub fn process_step(
        &mut self,
        rewards: &[f32],
        dones: &[bool],
        info: &StepInfo,
    ) -> Vec<EpisodeReport> {
        debug_assert_eq!(rewards.len(), self.reward.len());
        debug_assert_eq!(dones.len(), self.len.len());

        for (acc, &r) in self.reward.iter_mut().zip(rewards) {
            *acc += r;
        }
        for acc in self.len.iter_mut() {
            *acc += 1;
        }

        let mut reports = Vec::new();
        for (agent, &done) in dones.iter().enumerate() {
            if !done {
                continue;
            }

            let reward = self.reward[agent];
            let len = self.len[agent];

            let (true_objective, extra_stats) = match info.agent(agent) {
                Some(agent_info) => (
                    agent_info.true_objective.unwrap_or(reward),
                    if agent_info.extra_stats.is_empty() {
                        None
                    } else {
                        Some(agent_info.extra_stats.clone())
                    },
                ),
                None => (reward, None),
            };

            reports.push(EpisodeReport {
                reward,
                len,
                true_objective,
                extra_stats,
            });

            self.reward[agent] = 0.0;
            self.len[agent] = 0;
        }

        reports
    }
}
