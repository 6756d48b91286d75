//! Service implementations
//!
//! Real implementations of the supervisor traits for production use

pub mod backend_api;
pub mod output_handler;
pub mod process_supervisor;

// Re-export service implementations
pub use backend_api::RealBackendApi;
pub use process_supervisor::{LaunchCommand, RealProcessSupervisor};
