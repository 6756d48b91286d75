//! Real process supervision for the SwarmUI backend
//!
//! Spawns the backend launch script once, keeps the child handle, and stops
//! it with SIGTERM followed by a kill when the coordinator itself exits.
//! The script runs in its own process group so that servers it starts
//! without `exec` are signalled along with it.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use shared::{ProcessId, process_debug, process_info, process_warn};

use crate::error::{SupervisorError, SupervisorResult};
use crate::services::output_handler::{configure_child_stdio, spawn_output_consumers};
use crate::traits::{ProcessStatus, ProcessSupervisor};

/// How to start the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    /// Run a shell script with `sh`, passing extra arguments through
    pub fn script(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let path = path.into();
        let mut all_args = vec![path.to_string_lossy().into_owned()];
        all_args.extend(args);
        Self {
            program: "sh".to_string(),
            args: all_args,
            working_dir: path.parent().filter(|p| !p.as_os_str().is_empty()).map(PathBuf::from),
            env: Vec::new(),
        }
    }

    /// Add an environment variable for the child (fluent API)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Handle for the managed child
struct ProcessHandle {
    child: Child,
    pid: u32,
    started_at: Instant,
}

/// Real process supervisor implementation
pub struct RealProcessSupervisor {
    launch: Option<LaunchCommand>,
    active: Mutex<Option<ProcessHandle>>,
    last_exit: Mutex<Option<Option<i32>>>,
    shutdown_grace: Duration,
}

impl RealProcessSupervisor {
    /// Supervisor that launches the backend from `command`
    pub fn new(command: LaunchCommand) -> Self {
        Self {
            launch: Some(command),
            active: Mutex::new(None),
            last_exit: Mutex::new(None),
            shutdown_grace: Duration::from_secs(10),
        }
    }

    /// Supervisor for a backend started outside this process
    pub fn external() -> Self {
        Self {
            launch: None,
            active: Mutex::new(None),
            last_exit: Mutex::new(None),
            shutdown_grace: Duration::from_secs(10),
        }
    }

    /// Configure the SIGTERM grace period (fluent API)
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    fn spawn(command: &LaunchCommand) -> SupervisorResult<ProcessHandle> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        configure_child_stdio(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn(format!("{} {}: {e}", command.program, command.args.join(" "))))?;
        let pid = child.id().unwrap_or(0);
        spawn_output_consumers(&mut child);

        Ok(ProcessHandle {
            child,
            pid,
            started_at: Instant::now(),
        })
    }

    /// Check if the child is still running, reaping it if not
    fn poll_exit(handle: &mut ProcessHandle) -> Option<Option<i32>> {
        match handle.child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) => Some(status.code()),
            Err(_) => Some(None),
        }
    }

    /// Wait for the script, then for anything left in its process group
    async fn wait_for_group(handle: &mut ProcessHandle) -> std::io::Result<()> {
        let status = handle.child.wait().await?;
        process_debug!(ProcessId::current(), "🛑 Backend script exited with {}", status);
        while Self::group_alive(handle.pid) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn send_terminate(pgid: u32) -> SupervisorResult<()> {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        killpg(Pid::from_raw(pgid as i32), Signal::SIGTERM)
            .map_err(|e| SupervisorError::IoError(std::io::Error::from(e)))
    }

    #[cfg(unix)]
    fn send_kill(pgid: u32) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // ESRCH just means the group is already gone
        let _ = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL);
    }

    #[cfg(unix)]
    fn group_alive(pgid: u32) -> bool {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        killpg(Pid::from_raw(pgid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    fn send_terminate(_pgid: u32) -> SupervisorResult<()> {
        Err(SupervisorError::NotRunning)
    }

    #[cfg(not(unix))]
    fn send_kill(_pgid: u32) {}

    #[cfg(not(unix))]
    fn group_alive(_pgid: u32) -> bool {
        false
    }
}

#[async_trait]
impl ProcessSupervisor for RealProcessSupervisor {
    async fn launch(&self) -> SupervisorResult<Option<u32>> {
        let Some(command) = &self.launch else {
            return Ok(None);
        };

        let mut active = self.active.lock().await;
        if let Some(handle) = active.as_mut() {
            if Self::poll_exit(handle).is_none() {
                return Ok(Some(handle.pid));
            }
        }

        let handle = Self::spawn(command)?;
        let pid = handle.pid;
        process_info!(
            ProcessId::current(),
            "🚀 Spawned backend (PID: {}): {} {}",
            pid,
            command.program,
            command.args.join(" ")
        );
        *active = Some(handle);
        *self.last_exit.lock().await = None;
        Ok(Some(pid))
    }

    async fn status(&self) -> ProcessStatus {
        if self.launch.is_none() {
            return ProcessStatus::External;
        }

        let mut active = self.active.lock().await;
        let exited = match active.as_mut() {
            Some(handle) => match Self::poll_exit(handle) {
                None => return ProcessStatus::Running { pid: handle.pid },
                Some(code) => {
                    process_warn!(
                        ProcessId::current(),
                        "⚠️ Backend (PID: {}) exited with {:?} after {}s",
                        handle.pid,
                        code,
                        handle.started_at.elapsed().as_secs()
                    );
                    code
                }
            },
            None => {
                return match *self.last_exit.lock().await {
                    Some(code) => ProcessStatus::Exited { code },
                    None => ProcessStatus::NotStarted,
                };
            }
        };

        *active = None;
        *self.last_exit.lock().await = Some(exited);
        ProcessStatus::Exited { code: exited }
    }

    async fn terminate(&self) -> SupervisorResult<()> {
        let mut active = self.active.lock().await;
        let Some(mut handle) = active.take() else {
            return Ok(());
        };

        let script_running = Self::poll_exit(&mut handle).is_none();
        if script_running || Self::group_alive(handle.pid) {
            if let Err(e) = Self::send_terminate(handle.pid) {
                process_warn!(ProcessId::current(), "⚠️ SIGTERM to backend failed: {}", e);
            }

            match tokio::time::timeout(self.shutdown_grace, Self::wait_for_group(&mut handle)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    Self::send_kill(handle.pid);
                    return Err(SupervisorError::IoError(e));
                }
                Err(_) => {
                    process_warn!(
                        ProcessId::current(),
                        "⏱️ Backend ignored SIGTERM for {}s, killing",
                        self.shutdown_grace.as_secs()
                    );
                    Self::send_kill(handle.pid);
                    let _ = handle.child.kill().await;
                    let _ = handle.child.wait().await;
                }
            }
        }

        *self.last_exit.lock().await = Some(None);
        process_info!(ProcessId::current(), "🛑 Stopped backend (PID: {})", handle.pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_external_supervisor() {
        let supervisor = RealProcessSupervisor::external();

        assert_eq!(supervisor.launch().await.unwrap(), None);
        assert_eq!(supervisor.status().await, ProcessStatus::External);
        assert!(supervisor.terminate().await.is_ok());
    }

    #[tokio::test]
    async fn test_not_started_before_launch() {
        let supervisor = RealProcessSupervisor::new(LaunchCommand::script("/nonexistent/launch.sh", vec![]));
        assert_eq!(supervisor.status().await, ProcessStatus::NotStarted);
    }

    #[test]
    fn test_script_command_uses_script_directory() {
        let command = LaunchCommand::script("/opt/swarmui/launch-linux.sh", vec!["--port".into(), "7801".into()])
            .with_env("SWARM_NO_BROWSER", "1");

        assert_eq!(command.program, "sh");
        assert_eq!(command.args, vec!["/opt/swarmui/launch-linux.sh", "--port", "7801"]);
        assert_eq!(command.working_dir, Some(PathBuf::from("/opt/swarmui")));
        assert_eq!(command.env, vec![("SWARM_NO_BROWSER".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_bare_script_name_has_no_working_dir() {
        let command = LaunchCommand::script("launch.sh", vec![]);
        assert_eq!(command.working_dir, None);
    }
}
