//! Policy-side collaborators: weight synchronization and inference.

pub mod bridge;
pub mod param_client;

pub use bridge::{PolicyBridge, PolicyModel, PolicyOutputs};
pub use param_client::ParameterClient;
