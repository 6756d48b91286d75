//! Backend process supervisor for the SwarmUI worker
//!
//! Two concerns live here: owning the lifetime of the SwarmUI child process,
//! and talking to its local REST API. The coordinator only ever asks "is it
//! listening yet" through [`BackendApi::probe_ready`]; retries and timing
//! policy stay on the coordinator side.

pub mod error;
pub mod services;
pub mod traits;

pub use error::{SupervisorError, SupervisorResult};
pub use traits::{BackendApi, BackendSession, ProcessStatus, ProcessSupervisor};

// Mocks are generated unconditionally so downstream crates can test against them
pub use traits::{MockBackendApi, MockProcessSupervisor};

pub use services::{LaunchCommand, RealBackendApi, RealProcessSupervisor};
