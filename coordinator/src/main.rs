//! Coordinator entry point
//!
//! Loads `.env`, launches the backend when a script is configured, and
//! serves lifecycle jobs until Ctrl+C. The backend is stopped on the way out.

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tokio::signal;

use coordinator::{Args, CoordinatorConfig, JobServer, WorkerCoordinator, bind_listener, wait_for_ready};
use shared::{ProcessId, logging, process_debug, process_info};
use supervisor::{LaunchCommand, ProcessSupervisor, RealBackendApi, RealProcessSupervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply
    let _ = dotenv::dotenv();
    let args = Args::parse();

    ProcessId::init_coordinator();
    logging::init_tracing_with_level(Some(&args.log_level));

    let config = CoordinatorConfig::from_args(args)?;
    logging::log_startup(ProcessId::current(), "SwarmUI worker coordinator");
    process_debug!(
        ProcessId::current(),
        "Backend API: {}, public URL: {}, startup ceiling: {}s, generation timeout: {}s",
        config.api_url_text(),
        config.public_url(),
        config.startup_timeout.as_secs(),
        config.generation_timeout.as_secs()
    );

    let backend = RealBackendApi::new(config.api_url.as_str())?.with_probe_timeout(config.probe_timeout);
    let supervisor = match &config.launch_script {
        Some(script) => RealProcessSupervisor::new(LaunchCommand::script(script.clone(), config.launch_args.clone())),
        None => RealProcessSupervisor::external(),
    }
    .with_shutdown_grace(config.shutdown_grace);

    let coordinator = WorkerCoordinator::new(config.clone(), backend, supervisor);

    match coordinator.supervisor().launch().await.context("launching SwarmUI")? {
        Some(pid) => process_info!(ProcessId::current(), "🚀 SwarmUI launched (PID: {})", pid),
        None => process_info!(ProcessId::current(), "🔗 Using external SwarmUI at {}", config.api_url_text()),
    }

    if config.wait_on_start {
        let backoff = config.startup_backoff.max(Duration::from_secs(1));
        let waited = wait_for_ready(
            coordinator.backend().as_ref(),
            coordinator.supervisor().as_ref(),
            config.startup_timeout,
            backoff,
        )
        .await;

        match waited {
            Ok(wait) => logging::log_success(
                ProcessId::current(),
                &format!("SwarmUI ready after {}s", wait.waited.as_secs()),
            ),
            Err(e) => {
                logging::log_error(ProcessId::current(), "Startup", &e);
                coordinator.supervisor().terminate().await?;
                return Err(e.into());
            }
        }
    }

    let listener = bind_listener(config.bind_addr).await?;
    let server = JobServer::new(coordinator.clone());

    // Set up graceful shutdown
    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal"),
            Err(err) => {
                logging::log_error(ProcessId::current(), "Signal handling", &err);
                std::future::pending::<()>().await;
            }
        }
    };

    // Long keep-alives must not hold the exit; they get the same grace as the backend
    let served = server.serve(listener, shutdown, config.shutdown_grace).await;

    coordinator
        .supervisor()
        .terminate()
        .await
        .context("stopping SwarmUI")?;
    served?;

    logging::log_success(ProcessId::current(), "Coordinator stopped gracefully");
    Ok(())
}
