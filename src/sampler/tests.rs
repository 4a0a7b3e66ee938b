use crossbeam_channel::{unbounded, Receiver};

use crate::buffers::trajectory_pool::{trajectory_pool, SharedTrajectoryPool, TrajectoryLayout};
use crate::config::SamplerConfig;
use crate::core::tensor::{Tensor, TensorDict};
use crate::core::policy_version::WeightPublisher;
use crate::core::weight_slot::{weight_slot, SharedWeightSlot};
use crate::env::{AgentInfo, EnvCapabilities, EnvStepResult, StepInfo, VectorizedEnv};
use crate::messages::{SamplerCommand, SamplerEvent};
use crate::policy::bridge::{PolicyModel, PolicyOutputs};
use crate::sampler::driver::{spawn_sampler, DriverState, Sampler};

/// Deterministic two-purpose mock: observations encode the step number and
/// rewards encode (step, agent), so every cell of a filled slice can be
/// checked against a closed form.
struct ScriptedEnv {
    num_agents: usize,
    step_count: usize,
    /// Step at which agent 0 finishes its episode.
    done_step: Option<usize>,
    /// Mark that finish as a time limit, with per-agent info attached.
    time_out: bool,
    caps: EnvCapabilities,
    expect_dtype: &'static str,
}

impl ScriptedEnv {
    fn new(num_agents: usize) -> Self {
        Self {
            num_agents,
            step_count: 0,
            done_step: None,
            time_out: false,
            caps: EnvCapabilities::default(),
            expect_dtype: "f32",
        }
    }

    fn obs_filled(&self, value: f32) -> TensorDict {
        let mut obs = TensorDict::new();
        obs.insert_leaf(
            "obs",
            Tensor::from_vec(&[self.num_agents, 3], vec![value; self.num_agents * 3]),
        );
        obs
    }
}

impl VectorizedEnv for ScriptedEnv {
    fn num_agents(&self) -> usize {
        self.num_agents
    }

    fn capabilities(&self) -> EnvCapabilities {
        self.caps
    }

    fn reset(&mut self) -> TensorDict {
        self.step_count = 0;
        self.obs_filled(0.0)
    }

    fn step(&mut self, actions: &Tensor) -> EnvStepResult {
        assert_eq!(actions.dtype(), self.expect_dtype);
        assert_eq!(actions.shape()[0], self.num_agents);

        let k = self.step_count;
        self.step_count += 1;

        let rewards: Vec<f32> = (0..self.num_agents)
            .map(|agent| (k + 1) as f32 + 100.0 * agent as f32)
            .collect();
        let mut dones = vec![false; self.num_agents];
        if self.done_step == Some(k) {
            dones[0] = true;
        }

        let info = if self.time_out && dones[0] {
            let mut infos = vec![AgentInfo::default(); self.num_agents];
            infos[0].time_out = true;
            StepInfo::PerAgent(infos)
        } else {
            StepInfo::None
        };

        EnvStepResult {
            observations: self.obs_filled((k + 1) as f32),
            rewards,
            dones,
            info,
        }
    }
}

/// Constant policy whose recurrent state increments by one each step, so
/// state carrying and done-masking are observable in the stored rows.
struct StepPolicy {
    value: f32,
}

impl PolicyModel for StepPolicy {
    fn normalize(&self, obs: &TensorDict) -> TensorDict {
        obs.clone()
    }

    fn forward(&self, _obs: &TensorDict, rnn_states: &Tensor) -> PolicyOutputs {
        let n = rnn_states.shape()[0];
        let next: Vec<f32> = rnn_states.to_f32_vec().iter().map(|x| x + 1.0).collect();
        PolicyOutputs {
            actions: Tensor::from_vec(&[n, 1], vec![2.0; n]),
            values: Tensor::from_vec(&[n], vec![self.value; n]),
            rnn_states: Tensor::from_vec(&[n, 1], next),
            extras: TensorDict::new(),
        }
    }
}

fn layout(rollout: usize, num_agents: usize) -> TrajectoryLayout {
    TrajectoryLayout::new(rollout, num_agents)
        .with_obs("obs", &[3])
        .with_rnn_size(1)
        .with_action_dims(1)
}

type TestSampler = Sampler<StepPolicy, ScriptedEnv>;

fn make_sampler(
    config: SamplerConfig,
    capacity: usize,
    env: ScriptedEnv,
) -> (
    TestSampler,
    Receiver<SamplerEvent>,
    SharedTrajectoryPool,
    SharedWeightSlot<StepPolicy>,
) {
    let pool = trajectory_pool(layout(config.rollout, config.num_agents), capacity);
    let slot = weight_slot();
    let (event_tx, event_rx) = unbounded();
    let sampler = Sampler::new(config, pool.clone(), slot.clone(), move || env, event_tx).unwrap();
    (sampler, event_rx, pool, slot)
}

fn expect_trajectory(event_rx: &Receiver<SamplerEvent>) -> TensorDict {
    match event_rx.try_recv().unwrap() {
        SamplerEvent::NewTrajectory { slice, .. } => slice,
        other => panic!("expected NewTrajectory, got {other:?}"),
    }
}

fn row(slice: &TensorDict, key: &str, step: usize) -> Vec<f32> {
    slice.leaf(key).unwrap().index(step).unwrap().to_f32_vec()
}

#[test]
fn test_full_rollout_contents() {
    let config = SamplerConfig::default()
        .with_rollout(5)
        .with_num_agents(2)
        .with_policy_id(7);
    let mut env = ScriptedEnv::new(2);
    env.done_step = Some(3);
    let (mut sampler, event_rx, _pool, _slot) = make_sampler(config, 2, env);

    assert_eq!(sampler.state(), DriverState::Uninitialized);
    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.5 },
            policy_version: 3,
        })
        .unwrap();
    assert!(matches!(
        event_rx.try_recv().unwrap(),
        SamplerEvent::Initialized
    ));

    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    let slice = expect_trajectory(&event_rx);
    assert_eq!(sampler.state(), DriverState::Idle);

    // Observations: row t is the environment's step-t frame, including the
    // trailing bootstrap row.
    let obs = slice.node("obs").unwrap().leaf("obs").unwrap();
    assert_eq!(obs.shape(), &[6, 2, 3]);
    for t in 0..6 {
        let frame = obs.index(t).unwrap();
        assert!(frame.as_f32().unwrap().iter().all(|&x| x == t as f32));
    }

    // Recurrent state increments per step and is zeroed for agent 0 after
    // its done at step 3.
    assert_eq!(row(&slice, "rnn_states", 0), vec![0.0, 0.0]);
    assert_eq!(row(&slice, "rnn_states", 3), vec![3.0, 3.0]);
    assert_eq!(row(&slice, "rnn_states", 4), vec![0.0, 4.0]);
    assert_eq!(row(&slice, "rnn_states", 5), vec![1.0, 5.0]);

    for t in 0..5 {
        assert_eq!(row(&slice, "actions", t), vec![2.0, 2.0]);
        assert_eq!(row(&slice, "values", t), vec![0.5, 0.5]);
        assert_eq!(
            row(&slice, "rewards", t),
            vec![(t + 1) as f32, (t + 101) as f32]
        );
        assert_eq!(row(&slice, "policy_id", t), vec![7.0, 7.0]);
        assert_eq!(row(&slice, "policy_version", t), vec![3.0, 3.0]);
    }
    assert_eq!(row(&slice, "dones", 3), vec![1.0, 0.0]);
    assert_eq!(row(&slice, "dones", 2), vec![0.0, 0.0]);

    // Bootstrap row carries only observation and recurrent state.
    assert_eq!(row(&slice, "values", 5), vec![0.0, 0.0]);
    assert_eq!(row(&slice, "policy_version", 5), vec![0.0, 0.0]);

    match event_rx.try_recv().unwrap() {
        SamplerEvent::Report(report) => {
            assert_eq!(report.samples_collected, 10);
            assert_eq!(report.policy_id, 7);
            assert_eq!(report.episodic.len(), 1);
            // Raw rewards 1+2+3+4 over 4 steps; true objective falls back
            // to the episode reward.
            assert_eq!(report.episodic[0].reward, 10.0);
            assert_eq!(report.episodic[0].len, 4);
            assert_eq!(report.episodic[0].true_objective, 10.0);
        }
        other => panic!("expected Report, got {other:?}"),
    }
    assert!(event_rx.try_recv().is_err());
}

#[test]
fn test_reward_scale_and_clip_in_slice_only() {
    let config = SamplerConfig::default()
        .with_rollout(1)
        .with_num_agents(2)
        .with_reward_scale(0.1)
        .with_reward_clip(0.3);
    let mut env = ScriptedEnv::new(2);
    env.done_step = Some(0);
    let (mut sampler, event_rx, _pool, _slot) = make_sampler(config, 1, env);

    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.0 },
            policy_version: 1,
        })
        .unwrap();
    let _ = event_rx.try_recv();

    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    let slice = expect_trajectory(&event_rx);

    // Raw rewards [1, 101]: scaled to [0.1, 10.1], clamped to [0.1, 0.3].
    assert_eq!(row(&slice, "rewards", 0), vec![0.1, 0.3]);

    // The episode report sees the raw reward.
    match event_rx.try_recv().unwrap() {
        SamplerEvent::Report(report) => {
            assert_eq!(report.episodic[0].reward, 1.0);
        }
        other => panic!("expected Report, got {other:?}"),
    }
}

#[test]
fn test_value_bootstrap_on_time_out() {
    let config = SamplerConfig::default()
        .with_rollout(1)
        .with_num_agents(2)
        .with_value_bootstrap(true)
        .with_gamma(0.99);
    let mut env = ScriptedEnv::new(2);
    env.done_step = Some(0);
    env.time_out = true;
    let (mut sampler, event_rx, _pool, _slot) = make_sampler(config, 1, env);

    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.5 },
            policy_version: 1,
        })
        .unwrap();
    let _ = event_rx.try_recv();

    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    let slice = expect_trajectory(&event_rx);

    // Agent 0 timed out: reward 1.0 + gamma * value = 1.0 + 0.99 * 0.5.
    // Agent 1 did not: its reward is stored unchanged.
    let rewards = row(&slice, "rewards", 0);
    assert!((rewards[0] - 1.495).abs() < 1e-6);
    assert_eq!(rewards[1], 101.0);
}

#[test]
fn test_backpressure_defers_until_release() {
    let config = SamplerConfig::default().with_rollout(2).with_num_agents(2);
    let (mut sampler, event_rx, pool, _slot) = make_sampler(config, 1, ScriptedEnv::new(2));

    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.0 },
            policy_version: 1,
        })
        .unwrap();
    let _ = event_rx.try_recv();

    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    let (handle, slice) = match event_rx.try_recv().unwrap() {
        SamplerEvent::NewTrajectory { handle, slice } => (handle, slice),
        other => panic!("expected NewTrajectory, got {other:?}"),
    };
    let _ = event_rx.try_recv(); // report
    assert_eq!(pool.free_slices(), 0);

    // Second request finds no free slice: nothing emitted, request pending.
    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    assert!(event_rx.try_recv().is_err());
    assert!(sampler.is_request_pending());
    assert_eq!(sampler.state(), DriverState::Idle);

    // Consumer returns the slice, then the wake-up lands.
    pool.recycle(handle, slice);
    sampler
        .handle(SamplerCommand::BufferReleased(handle))
        .unwrap();
    assert!(matches!(
        event_rx.try_recv().unwrap(),
        SamplerEvent::NewTrajectory { .. }
    ));
    assert!(!sampler.is_request_pending());
}

#[test]
fn test_request_before_init_runs_after_init() {
    let config = SamplerConfig::default().with_rollout(2).with_num_agents(1);
    let (mut sampler, event_rx, _pool, _slot) = make_sampler(config, 1, ScriptedEnv::new(1));

    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    assert!(event_rx.try_recv().is_err());
    assert!(sampler.is_request_pending());

    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.0 },
            policy_version: 1,
        })
        .unwrap();

    assert!(matches!(
        event_rx.try_recv().unwrap(),
        SamplerEvent::Initialized
    ));
    assert!(matches!(
        event_rx.try_recv().unwrap(),
        SamplerEvent::NewTrajectory { .. }
    ));
}

#[test]
fn test_published_weights_stamp_next_rollout() {
    let config = SamplerConfig::default().with_rollout(1).with_num_agents(1);
    let (mut sampler, event_rx, pool, slot) = make_sampler(config, 2, ScriptedEnv::new(1));
    let publisher = WeightPublisher::new(slot);

    // The initial snapshot carries version 0; updates are stamped by the
    // publisher's counter from then on.
    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.0 },
            policy_version: 0,
        })
        .unwrap();
    let _ = event_rx.try_recv();

    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    let first = expect_trajectory(&event_rx);
    let _ = event_rx.try_recv();
    assert_eq!(row(&first, "policy_version", 0), vec![0.0]);

    assert_eq!(publisher.publish(StepPolicy { value: 1.0 }), 1);
    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    let second = expect_trajectory(&event_rx);
    assert_eq!(row(&second, "policy_version", 0), vec![1.0]);
    assert_eq!(row(&second, "values", 0), vec![1.0]);

    assert_eq!(pool.free_slices(), 0);
}

#[test]
fn test_integer_actions_reach_env_as_i32() {
    let config = SamplerConfig::default().with_rollout(2).with_num_agents(2);
    let mut env = ScriptedEnv::new(2);
    env.caps.integer_actions = true;
    env.expect_dtype = "i32";
    let (mut sampler, event_rx, _pool, _slot) = make_sampler(config, 1, env);

    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.0 },
            policy_version: 1,
        })
        .unwrap();
    let _ = event_rx.try_recv();

    sampler.handle(SamplerCommand::RequestTrajectories).unwrap();
    // Stored actions stay f32 in the slice even for integer action spaces.
    let slice = expect_trajectory(&event_rx);
    assert_eq!(row(&slice, "actions", 0), vec![2.0, 2.0]);
}

#[test]
fn test_stop_acknowledges_and_detaches() {
    let config = SamplerConfig::default().with_rollout(2).with_num_agents(1);
    let (mut sampler, event_rx, _pool, _slot) = make_sampler(config, 1, ScriptedEnv::new(1));

    sampler
        .handle(SamplerCommand::Init {
            model: StepPolicy { value: 0.0 },
            policy_version: 1,
        })
        .unwrap();
    let _ = event_rx.try_recv();

    assert!(!sampler.handle(SamplerCommand::Stop).unwrap());
    assert!(matches!(
        event_rx.try_recv().unwrap(),
        SamplerEvent::Stopped
    ));
    assert_eq!(sampler.state(), DriverState::Terminated);

    // Terminated driver ignores further events.
    assert!(!sampler.handle(SamplerCommand::RequestTrajectories).unwrap());
    assert!(event_rx.try_recv().is_err());
}

#[test]
fn test_spawned_sampler_round_trip() {
    use std::time::Duration;

    let config = SamplerConfig::default().with_rollout(3).with_num_agents(2);
    let pool = trajectory_pool(layout(3, 2), 2);
    let slot = weight_slot();

    let handle =
        spawn_sampler(config, pool, slot, move || ScriptedEnv::new(2)).unwrap();

    handle
        .cmd_tx
        .send(SamplerCommand::Init {
            model: StepPolicy { value: 0.25 },
            policy_version: 1,
        })
        .unwrap();
    handle.cmd_tx.send(SamplerCommand::RequestTrajectories).unwrap();

    let timeout = Duration::from_secs(5);
    assert!(matches!(
        handle.events.recv_timeout(timeout).unwrap(),
        SamplerEvent::Initialized
    ));
    match handle.events.recv_timeout(timeout).unwrap() {
        SamplerEvent::NewTrajectory { slice, .. } => {
            assert_eq!(slice.leaf("rewards").unwrap().shape(), &[4, 2]);
        }
        other => panic!("expected NewTrajectory, got {other:?}"),
    }
    match handle.events.recv_timeout(timeout).unwrap() {
        SamplerEvent::Report(report) => assert_eq!(report.samples_collected, 6),
        other => panic!("expected Report, got {other:?}"),
    }

    handle.stop();
    assert!(matches!(
        handle.events.recv_timeout(timeout).unwrap(),
        SamplerEvent::Stopped
    ));
    handle.join().unwrap();
}
