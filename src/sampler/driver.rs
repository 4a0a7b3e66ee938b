//! The rollout driver.
//!
//! A reactive object: it consumes typed commands, collects one fixed-length
//! rollout per granted request, and emits trajectory/report events. It
//! never blocks on buffer availability - an empty pool leaves the request
//! pending and the driver idle until a release wake-up re-invokes it.
//!
//! # State machine
//!
//! ```text
//! Uninitialized --Init--> Ready --request--> Collecting --> Idle
//!                           ^                                 |
//!                           |        (request / wake-up)      |
//!                           +---------------------------------+
//! any state --Stop--> Terminated
//! ```

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, error};

use crate::buffers::trajectory_pool::SharedTrajectoryPool;
use crate::config::{ConfigError, SamplerConfig};
use crate::core::episode_stats::{EpisodeReport, EpisodeTracker};
use crate::core::tensor::{Tensor, TensorDict, TensorError};
use crate::core::weight_slot::SharedWeightSlot;
use crate::env::{StepInfo, VectorizedEnv};
use crate::messages::{ReportMsg, SamplerCommand, SamplerEvent};
use crate::policy::bridge::{PolicyBridge, PolicyModel, PolicyOutputs};
use crate::policy::param_client::ParameterClient;
use crate::sampler::process::request_niceness;

/// Fatal driver errors. Flow-control conditions (empty pool) are not
/// errors and never appear here.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Programmer error in a container write; not recoverable.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Rejected configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A collection path ran before `Init` delivered weights.
    #[error("inference requested before weights were initialized")]
    NotInitialized,
}

/// Driver lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed; waiting for the initial model state.
    Uninitialized,
    /// Initialized; no rollout collected yet.
    Ready,
    /// Inside the collection loop.
    Collecting,
    /// Between rollouts; waiting for the next request.
    Idle,
    /// Stopped; no further events are processed.
    Terminated,
}

/// The rollout driver.
///
/// Exclusively owns its episode accumulators and the carried observation /
/// recurrent state; shares only the trajectory pool (through ownership
/// transfer) and the weight slot (through swap) with other threads.
pub struct Sampler<M: PolicyModel, E: VectorizedEnv> {
    config: SamplerConfig,
    pool: SharedTrajectoryPool,
    bridge: PolicyBridge<M>,
    env_factory: Option<Box<dyn FnOnce() -> E + Send>>,
    env: Option<E>,
    state: DriverState,
    trajectories_requested: bool,
    last_obs: TensorDict,
    last_rnn: Tensor,
    tracker: EpisodeTracker,
    event_tx: Sender<SamplerEvent>,
}

impl<M: PolicyModel, E: VectorizedEnv> Sampler<M, E> {
    /// Build a driver. The environment is constructed lazily on `Init`.
    pub fn new(
        config: SamplerConfig,
        pool: SharedTrajectoryPool,
        weight_slot: SharedWeightSlot<M>,
        env_factory: impl FnOnce() -> E + Send + 'static,
        event_tx: Sender<SamplerEvent>,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        let tracker = EpisodeTracker::new(config.num_agents);
        Ok(Self {
            config,
            pool,
            bridge: PolicyBridge::new(ParameterClient::new(weight_slot)),
            env_factory: Some(Box::new(env_factory)),
            env: None,
            state: DriverState::Uninitialized,
            trajectories_requested: false,
            last_obs: TensorDict::new(),
            last_rnn: Tensor::zeros(&[0]),
            tracker,
            event_tx,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Whether a collection request is deferred, waiting for a free slice.
    pub fn is_request_pending(&self) -> bool {
        self.trajectories_requested
    }

    /// Process one command. Returns false once the driver has terminated
    /// and should receive no further events.
    pub fn handle(&mut self, cmd: SamplerCommand<M>) -> Result<bool, SamplerError> {
        if self.state == DriverState::Terminated {
            return Ok(false);
        }
        match cmd {
            SamplerCommand::Init {
                model,
                policy_version,
            } => {
                self.init(model, policy_version)?;
                Ok(true)
            }
            SamplerCommand::RequestTrajectories => {
                self.trajectories_requested = true;
                self.collect()?;
                Ok(true)
            }
            SamplerCommand::BufferReleased(handle) => {
                debug!(slice = handle.index(), "trajectory slice released");
                self.collect()?;
                Ok(true)
            }
            SamplerCommand::Stop => {
                self.stop();
                Ok(false)
            }
        }
    }

    /// Drain commands until `Stop` or a fatal error.
    pub fn run(mut self, cmd_rx: Receiver<SamplerCommand<M>>) {
        while let Ok(cmd) = cmd_rx.recv() {
            match self.handle(cmd) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(error = %e, "fatal sampler error; stopping");
                    self.stop();
                    break;
                }
            }
        }
    }

    /// One-time init: environment construction, initial observation,
    /// zeroed recurrent state and accumulators. A repeated `Init` only
    /// refreshes the weights.
    fn init(&mut self, model: M, policy_version: u64) -> Result<(), SamplerError> {
        self.bridge.weights_initialized(model, policy_version);
        let Some(factory) = self.env_factory.take() else {
            debug!("repeated init: weights refreshed, environment kept");
            return Ok(());
        };

        if let Some(niceness) = self.config.niceness {
            request_niceness(niceness);
        }

        let mut env = factory();
        self.last_obs = env.reset();
        self.last_rnn = Tensor::zeros(&[self.config.num_agents, self.pool.layout().rnn_size]);
        self.tracker.reset_all();
        self.env = Some(env);
        self.state = DriverState::Ready;
        let _ = self.event_tx.send(SamplerEvent::Initialized);

        // A request may have queued up before the weights arrived.
        self.collect()
    }

    /// Collect one rollout if a request is pending and a slice is free.
    ///
    /// An empty pool is flow control: the request stays pending, nothing is
    /// written, and a later `BufferReleased` wake-up retries.
    fn collect(&mut self) -> Result<(), SamplerError> {
        if !self.trajectories_requested {
            return Ok(());
        }
        if !matches!(self.state, DriverState::Ready | DriverState::Idle) {
            return Ok(());
        }

        let Some((handle, mut slice)) = self.pool.try_acquire() else {
            debug!("no free trajectory slices; deferring rollout collection");
            return Ok(());
        };

        self.trajectories_requested = false;
        self.state = DriverState::Collecting;

        match self.run_rollout(&mut slice) {
            Ok(episodic) => {
                let samples_collected = self.config.num_agents * self.config.rollout;
                let _ = self.event_tx.send(SamplerEvent::NewTrajectory { handle, slice });
                let _ = self.event_tx.send(SamplerEvent::Report(ReportMsg {
                    samples_collected,
                    policy_id: self.config.policy_id,
                    episodic,
                }));
                self.state = DriverState::Idle;
                Ok(())
            }
            Err(e) => {
                // A partially filled slice is abandoned: scrub it and hand
                // it straight back to the pool.
                slice.zero_();
                self.pool.recycle(handle, slice);
                self.state = DriverState::Idle;
                Err(e)
            }
        }
    }

    fn run_rollout(&mut self, slice: &mut TensorDict) -> Result<Vec<EpisodeReport>, SamplerError> {
        let mut env = self.env.take().ok_or(SamplerError::NotInitialized)?;
        let result = self.rollout_steps(&mut env, slice);
        self.env = Some(env);
        result
    }

    fn rollout_steps(
        &mut self,
        env: &mut E,
        slice: &mut TensorDict,
    ) -> Result<Vec<EpisodeReport>, SamplerError> {
        let rollout = self.config.rollout;
        let num_agents = self.config.num_agents;
        let mut episodic = Vec::new();

        for step in 0..rollout {
            // The observation and recurrent state written here are exactly
            // what the policy conditions on for this step.
            let mut input = TensorDict::new();
            input.insert_node("obs", self.last_obs.clone());
            input.insert_leaf("rnn_states", self.last_rnn.clone());
            slice.recursive_set(step, &input)?;

            self.bridge.ensure_fresh();

            // Normalization runs inside the bridge with the model's own
            // evaluation-mode statistics.
            let PolicyOutputs {
                actions,
                values,
                rnn_states: new_rnn,
                extras,
            } = self
                .bridge
                .infer(&self.last_obs, &self.last_rnn)
                .ok_or(SamplerError::NotInitialized)?;

            // The new recurrent state belongs to the NEXT step; everything
            // else lands in the current one, stamped with the version of
            // the weights that produced it.
            let mut out = TensorDict::new();
            out.insert_leaf("actions", actions.clone());
            out.insert_leaf("values", values.clone());
            for (key, value) in extras.iter() {
                out.insert(key, value.clone());
            }
            out.insert_leaf(
                "policy_version",
                Tensor::full_i32(&[num_agents], self.bridge.policy_version() as i32),
            );
            slice.recursive_set(step, &out)?;

            let env_actions = self.bridge.actions_for_env(actions, env.capabilities());
            let step_result = env.step(&env_actions);

            let value_row = values.to_f32_vec();
            let shaped =
                self.process_rewards(&step_result.rewards, &value_row, &step_result.info);

            let mut post = TensorDict::new();
            post.insert_leaf("rewards", Tensor::from_vec(&[num_agents], shaped));
            post.insert_leaf("dones", Tensor::from_bools(&step_result.dones));
            post.insert_leaf(
                "policy_id",
                Tensor::full_i32(&[num_agents], self.config.policy_id as i32),
            );
            slice.recursive_set(step, &post)?;

            // Zero the carried state at episode boundaries.
            let mut next_rnn = new_rnn;
            mask_done_agents(&mut next_rnn, &step_result.dones);

            // Episode accumulators see raw rewards, not shaped ones.
            episodic.extend(self.tracker.process_step(
                &step_result.rewards,
                &step_result.dones,
                &step_result.info,
            ));

            self.last_obs = step_result.observations;
            self.last_rnn = next_rnn;
        }

        // Trailing row: the consumer needs the post-rollout observation and
        // state for its bootstrap value estimate.
        let mut tail = TensorDict::new();
        tail.insert_node("obs", self.last_obs.clone());
        tail.insert_leaf("rnn_states", self.last_rnn.clone());
        slice.recursive_set(rollout, &tail)?;

        Ok(episodic)
    }

    /// Scale, clamp, then optionally correct for artificial truncation:
    /// `gamma * value * time_out` approximates the missing v(t+1) term,
    /// valid when the reward at the truncation boundary is negligible.
    fn process_rewards(&self, raw: &[f32], values: &[f32], info: &StepInfo) -> Vec<f32> {
        let cfg = &self.config;
        let mut rewards: Vec<f32> = raw
            .iter()
            .map(|r| (r * cfg.reward_scale).clamp(-cfg.reward_clip, cfg.reward_clip))
            .collect();

        if cfg.value_bootstrap {
            if let Some(time_outs) = info.time_outs(raw.len()) {
                for ((r, &v), &t) in rewards.iter_mut().zip(values).zip(&time_outs) {
                    *r += cfg.gamma * v * t;
                }
            }
        }

        rewards
    }

    /// Orderly teardown: release client resources, acknowledge, detach.
    fn stop(&mut self) {
        self.bridge.cleanup();
        let _ = self.event_tx.send(SamplerEvent::Stopped);
        self.state = DriverState::Terminated;
    }
}

/// Multiply each agent's recurrent-state row by `(1 - done)`.
fn mask_done_agents(rnn: &mut Tensor, dones: &[bool]) {
    let row_len = rnn.row_len();
    if let Some(data) = rnn.as_f32_mut() {
        for (agent, &done) in dones.iter().enumerate() {
            if done {
                data[agent * row_len..][..row_len].fill(0.0);
            }
        }
    } else if let Some(data) = rnn.as_i32_mut() {
        for (agent, &done) in dones.iter().enumerate() {
            if done {
                data[agent * row_len..][..row_len].fill(0);
            }
        }
    }
}

/// Handle to a spawned sampler thread.
pub struct SamplerHandle<M> {
    /// The driver thread.
    pub thread: std::thread::JoinHandle<()>,
    /// Command channel into the driver.
    pub cmd_tx: Sender<SamplerCommand<M>>,
    /// Event stream out of the driver.
    pub events: Receiver<SamplerEvent>,
}

impl<M> SamplerHandle<M> {
    /// Request an orderly stop.
    pub fn stop(&self) {
        let _ = self.cmd_tx.try_send(SamplerCommand::Stop);
    }

    /// Wait for the driver thread to finish.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }
}

/// Spawn a sampler on its own thread, returning its control handle.
pub fn spawn_sampler<M, E>(
    config: SamplerConfig,
    pool: SharedTrajectoryPool,
    weight_slot: SharedWeightSlot<M>,
    env_factory: impl FnOnce() -> E + Send + 'static,
) -> Result<SamplerHandle<M>, SamplerError>
where
    M: PolicyModel + 'static,
    E: VectorizedEnv + 'static,
{
    let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(100);
    let (event_tx, events) = crossbeam_channel::bounded(100);

    let sampler = Sampler::new(config, pool, weight_slot, env_factory, event_tx)?;
    let thread = std::thread::Builder::new()
        .name("rollout-sampler".into())
        .spawn(move || sampler.run(cmd_rx))
        .expect("failed to spawn sampler thread");

    Ok(SamplerHandle {
        thread,
        cmd_tx,
        events,
    })
}
