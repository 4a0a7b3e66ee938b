//! Message-passing contracts between the sampler and its orchestrator.
//!
//! ```text
//!   orchestrator --SamplerCommand--> [ sampler thread ]
//!   orchestrator <--SamplerEvent---- [ sampler thread ]
//! ```

mod sampler_msg;

pub use sampler_msg::{ReportMsg, SamplerCommand, SamplerEvent};
