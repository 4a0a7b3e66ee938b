//! Policy execution bridge.
//!
//! Wraps one forward pass per collection step: normalize the observation
//! with the model's own statistics, run inference with the carried
//! recurrent state, and post-process actions for the environment's declared
//! capabilities. Weight freshness is delegated to the [`ParameterClient`].

use crate::core::tensor::{Device, Tensor, TensorDict};
use crate::env::EnvCapabilities;
use crate::policy::param_client::ParameterClient;

/// Outputs of one inference call.
///
/// `rnn_states` is the state for the NEXT step; the driver must not write
/// it into the current step's recurrent-state field.
#[derive(Debug, Clone)]
pub struct PolicyOutputs {
    /// Selected actions, one row per agent.
    pub actions: Tensor,
    /// Value estimates, one per agent.
    pub values: Tensor,
    /// New recurrent state, one row per agent.
    pub rnn_states: Tensor,
    /// Policy-specific extras (log-probs, logits, ...), written verbatim
    /// into matching slice leaves.
    pub extras: TensorDict,
}

/// The model collaborator.
///
/// Implementations must behave as inference-only here: no gradient
/// tracking, evaluation-mode normalization statistics.
pub trait PolicyModel: Send {
    /// Normalize a raw observation with the model's own statistics.
    fn normalize(&self, obs: &TensorDict) -> TensorDict;

    /// One forward pass for all agents.
    fn forward(&self, obs: &TensorDict, rnn_states: &Tensor) -> PolicyOutputs;
}

/// Inference wrapper bound to a parameter client.
pub struct PolicyBridge<M> {
    client: ParameterClient<M>,
}

impl<M: PolicyModel> PolicyBridge<M> {
    pub fn new(client: ParameterClient<M>) -> Self {
        Self { client }
    }

    /// Install the initial weight snapshot.
    pub fn weights_initialized(&mut self, model: M, policy_version: u64) {
        self.client.weights_initialized(model, policy_version);
    }

    /// Pull newer weights if available; bounded, never blocks.
    pub fn ensure_fresh(&mut self) -> bool {
        self.client.ensure_weights_updated()
    }

    /// Version of the weights the next `infer` call will use.
    pub fn policy_version(&self) -> u64 {
        self.client.latest_policy_version()
    }

    /// Whether `weights_initialized` has run.
    pub fn is_initialized(&self) -> bool {
        self.client.model().is_some()
    }

    /// Normalize and run one forward pass. None until weights arrive.
    pub fn infer(&self, obs: &TensorDict, rnn_states: &Tensor) -> Option<PolicyOutputs> {
        let model = self.client.model()?;
        let normalized = model.normalize(obs);
        Some(model.forward(&normalized, rnn_states))
    }

    /// Post-process actions for the environment: coerce integer action
    /// spaces to fixed-width i32 and move to host residency unless the
    /// environment consumes device tensors.
    pub fn actions_for_env(&self, actions: Tensor, caps: EnvCapabilities) -> Tensor {
        let actions = if caps.integer_actions {
            actions.to_i32()
        } else {
            actions
        };
        if caps.gpu_actions {
            actions
        } else {
            actions.to_device(Device::Host)
        }
    }

    /// Release client resources.
    pub fn cleanup(&mut self) {
        self.client.cleanup();
    }
}
