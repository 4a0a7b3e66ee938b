//! Typed events for the sampler.
//!
//! The original design used implicit signal/slot dispatch; here the contract
//! is explicit: one inbound command enum consumed from the orchestration
//! layer, one outbound event enum emitted to it. Both travel over crossbeam
//! channels.

use crate::buffers::trajectory_pool::SliceHandle;
use crate::core::episode_stats::EpisodeReport;
use crate::core::tensor::TensorDict;

/// Commands consumed by the sampler, generic over the model type.
#[derive(Debug)]
pub enum SamplerCommand<M> {
    /// Initial model state is available: build the environment, reset it
    /// and become ready to collect.
    Init {
        /// Initial weight snapshot.
        model: M,
        /// Version of that snapshot.
        policy_version: u64,
    },

    /// A rollout has been requested. Deferred if no slice is free.
    RequestTrajectories,

    /// A consumer recycled a slice; wake up and retry a deferred request.
    BufferReleased(SliceHandle),

    /// Tear down in an orderly fashion and stop processing events.
    Stop,
}

/// Events emitted by the sampler.
#[derive(Debug)]
pub enum SamplerEvent {
    /// One-time init finished; the sampler is ready for requests.
    Initialized,

    /// A filled trajectory slice, handed off exactly once. Ownership of the
    /// storage transfers to the receiver, which must eventually recycle it
    /// through the pool.
    NewTrajectory {
        handle: SliceHandle,
        slice: TensorDict,
    },

    /// Metrics payload for one completed rollout.
    Report(ReportMsg),

    /// Stop acknowledgment; no further events follow.
    Stopped,
}

/// Metrics for one completed rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMsg {
    /// Transitions collected: `num_agents * rollout`.
    pub samples_collected: usize,
    /// Policy that produced them.
    pub policy_id: u32,
    /// Episode summaries finished during the rollout.
    pub episodic: Vec<EpisodeReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_msg_fields() {
        let report = ReportMsg {
            samples_collected: 64,
            policy_id: 0,
            episodic: Vec::new(),
        };
        assert_eq!(report.samples_collected, 64);
        assert!(report.episodic.is_empty());
    }

    #[test]
    fn test_commands_travel_over_channels() {
        let (tx, rx) = crossbeam_channel::bounded::<SamplerCommand<Vec<f32>>>(4);
        tx.send(SamplerCommand::RequestTrajectories).unwrap();
        tx.send(SamplerCommand::Stop).unwrap();

        assert!(matches!(
            rx.recv().unwrap(),
            SamplerCommand::RequestTrajectories
        ));
        assert!(matches!(rx.recv().unwrap(), SamplerCommand::Stop));
    }
}
