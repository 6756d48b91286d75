//! Shared types for the SwarmUI worker coordinator
//!
//! Holds the action request/result vocabulary exchanged between the job
//! transport and the coordinator, the process identity used for log stamping,
//! and the logging setup common to every binary in the workspace.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Inbound action vocabulary
    ActionRequest, ForwardRequest, HttpMethod, MAX_ACTION_SECS,

    // Outbound result shapes
    ActionResult, FailureReport, ForwardedResponse, HealthStatus, KeepAliveReport,
    KeepAliveSummary, ReadyStatus, ShutdownAck, WakeupReport, WorkerEndpoint,
};
