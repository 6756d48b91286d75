//! Lifecycle coordinator for a SwarmUI serverless worker
//!
//! Answers lifecycle jobs (health, ready, wakeup, keepalive, shutdown and a
//! `swarm_api` pass-through) on behalf of a local SwarmUI backend, and
//! serves them over a small HTTP job transport.

pub mod config;
pub mod coordinator_impl;
pub mod error;
pub mod jobs;
pub mod keepalive;
pub mod server;
pub mod state;

// Re-export main types
pub use config::{Args, CoordinatorConfig};
pub use coordinator_impl::WorkerCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use jobs::{JobRegistry, JobStatus, JobView};
pub use keepalive::{KeepAliveSession, ReadyWait, run_keepalive, wait_for_ready};
pub use server::{JobServer, bind_listener};
pub use state::{CoordinatorState, StateSnapshot};
