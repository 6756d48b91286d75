//! Command line and environment configuration
//!
//! Every flag has an environment fallback so the worker image can be
//! configured either way. `.env` is loaded by `main` before parsing.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use shared::WorkerEndpoint;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Smallest pause between startup probes
const MIN_STARTUP_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle coordinator for a SwarmUI serverless worker
#[derive(Parser, Debug, Clone)]
#[command(name = "coordinator")]
#[command(about = "Keeps a SwarmUI backend warm and answers lifecycle jobs")]
pub struct Args {
    /// Address the job transport binds to
    #[arg(long, env = "COORDINATOR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the job transport
    #[arg(long, env = "COORDINATOR_PORT", default_value = "8000")]
    pub port: u16,

    /// Base URL of the local SwarmUI API
    #[arg(long, env = "SWARMUI_API_URL", default_value = "http://127.0.0.1:7801")]
    pub api_url: String,

    /// Seconds to wait for the backend to become ready
    #[arg(long, env = "STARTUP_TIMEOUT", default_value = "1800")]
    pub startup_timeout: u64,

    /// Seconds between readiness probes while waiting
    #[arg(long, env = "STARTUP_BACKOFF", default_value = "10")]
    pub startup_backoff: u64,

    /// Default timeout in seconds for forwarded API calls
    #[arg(long, env = "GENERATION_TIMEOUT", default_value = "600")]
    pub generation_timeout: u64,

    /// Timeout in seconds for a single readiness probe
    #[arg(long, env = "PROBE_TIMEOUT", default_value = "10")]
    pub probe_timeout: u64,

    /// Bound on the `health` action's probe, in milliseconds
    #[arg(long, env = "HEALTH_TIMEOUT_MS", default_value = "800")]
    pub health_timeout_ms: u64,

    /// Script that starts SwarmUI; without it the backend is assumed external
    #[arg(long, env = "SWARMUI_LAUNCH_SCRIPT")]
    pub launch_script: Option<PathBuf>,

    /// Extra argument for the launch script (repeatable)
    #[arg(long = "launch-arg", allow_hyphen_values = true)]
    pub launch_args: Vec<String>,

    /// Seconds between SIGTERM and kill when stopping the backend, also the
    /// drain allowed for in-flight jobs on exit
    #[arg(long, env = "SHUTDOWN_GRACE", default_value = "10")]
    pub shutdown_grace: u64,

    /// Block until the backend is ready before serving jobs
    #[arg(long)]
    pub wait_on_start: bool,

    /// Seconds finished background jobs stay queryable
    #[arg(long, env = "JOB_RETENTION", default_value = "3600")]
    pub job_retention: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Pod identifier used for the public proxy address and worker id
    #[arg(long, env = "RUNPOD_POD_ID")]
    pub pod_id: Option<String>,

    /// Port exposed through the public proxy (defaults to the API URL's port)
    #[arg(long, env = "SWARMUI_PUBLIC_PORT")]
    pub public_port: Option<u16>,
}

/// Resolved coordinator settings
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub bind_addr: SocketAddr,
    pub api_url: Url,
    pub startup_timeout: Duration,
    pub startup_backoff: Duration,
    pub generation_timeout: Duration,
    pub probe_timeout: Duration,
    pub health_timeout: Duration,
    pub launch_script: Option<PathBuf>,
    pub launch_args: Vec<String>,
    pub shutdown_grace: Duration,
    pub wait_on_start: bool,
    pub job_retention: Duration,
    pub log_level: String,
    pub pod_id: Option<String>,
    pub public_port: Option<u16>,
}

impl CoordinatorConfig {
    /// Default settings for the backend at `api_url`
    pub fn for_backend(api_url: Url) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            api_url,
            startup_timeout: Duration::from_secs(1800),
            startup_backoff: Duration::from_secs(10),
            generation_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_millis(800),
            launch_script: None,
            launch_args: Vec::new(),
            shutdown_grace: Duration::from_secs(10),
            wait_on_start: false,
            job_retention: Duration::from_secs(3600),
            log_level: "info".to_string(),
            pod_id: None,
            public_port: None,
        }
    }

    /// Validate parsed arguments into a configuration
    pub fn from_args(args: Args) -> CoordinatorResult<Self> {
        let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port)
            .parse()
            .map_err(|e| CoordinatorError::config("host", format!("'{}': {e}", args.host)))?;

        let api_url = Url::parse(&args.api_url).map_err(|e| CoordinatorError::config("api_url", e.to_string()))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(CoordinatorError::config("api_url", "must be an http or https URL"));
        }

        for (field, value) in [
            ("startup_timeout", args.startup_timeout),
            ("generation_timeout", args.generation_timeout),
            ("probe_timeout", args.probe_timeout),
            ("health_timeout_ms", args.health_timeout_ms),
        ] {
            if value == 0 {
                return Err(CoordinatorError::config(field, "must be greater than zero"));
            }
        }

        let pod_id = args.pod_id.filter(|id| !id.trim().is_empty());

        Ok(Self {
            bind_addr,
            api_url,
            startup_timeout: Duration::from_secs(args.startup_timeout),
            startup_backoff: Duration::from_secs(args.startup_backoff),
            generation_timeout: Duration::from_secs(args.generation_timeout),
            probe_timeout: Duration::from_secs(args.probe_timeout),
            health_timeout: Duration::from_millis(args.health_timeout_ms),
            launch_script: args.launch_script,
            launch_args: args.launch_args,
            shutdown_grace: Duration::from_secs(args.shutdown_grace),
            wait_on_start: args.wait_on_start,
            job_retention: Duration::from_secs(args.job_retention),
            log_level: args.log_level,
            pod_id,
            public_port: args.public_port,
        })
    }

    /// Configure the startup ceiling and probe spacing (fluent API)
    pub fn with_startup(mut self, timeout: Duration, backoff: Duration) -> Self {
        self.startup_timeout = timeout;
        self.startup_backoff = backoff;
        self
    }

    /// Configure the pod identity (fluent API)
    pub fn with_pod(mut self, pod_id: impl Into<String>, public_port: Option<u16>) -> Self {
        self.pod_id = Some(pod_id.into());
        self.public_port = public_port;
        self
    }

    /// API URL as callers should see it, without a trailing slash
    pub fn api_url_text(&self) -> String {
        self.api_url.as_str().trim_end_matches('/').to_string()
    }

    /// Address reachable from outside the pod.
    ///
    /// Pods are exposed as `https://{pod_id}-{port}.proxy.runpod.net`;
    /// without a pod id the local API URL is the only address there is.
    pub fn public_url(&self) -> String {
        match &self.pod_id {
            Some(pod_id) => {
                let port = self
                    .public_port
                    .or_else(|| self.api_url.port_or_known_default())
                    .unwrap_or(7801);
                format!("https://{pod_id}-{port}.proxy.runpod.net")
            }
            None => self.api_url_text(),
        }
    }

    pub fn endpoint(&self) -> WorkerEndpoint {
        WorkerEndpoint {
            api_url: self.api_url_text(),
            public_url: self.public_url(),
            worker_id: self.pod_id.clone(),
        }
    }

    /// Spacing between startup probes for a loop pinging every `interval`.
    ///
    /// Always shorter than the keep-alive interval.
    pub fn startup_backoff_for(&self, interval: Duration) -> Duration {
        self.startup_backoff.min(interval / 2).max(MIN_STARTUP_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> CoordinatorConfig {
        CoordinatorConfig::for_backend(Url::parse("http://127.0.0.1:7801").unwrap())
    }

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["coordinator"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_explicit_flags() {
        let args = parse(&[
            "--port",
            "9100",
            "--api-url",
            "http://127.0.0.1:7900/",
            "--startup-timeout",
            "60",
            "--generation-timeout",
            "120",
            "--launch-script",
            "/opt/swarmui/launch-linux.sh",
            "--launch-arg",
            "--launch_mode",
            "--launch-arg",
            "none",
            "--wait-on-start",
            "--pod-id",
            "abc123",
        ]);
        let config = CoordinatorConfig::from_args(args).unwrap();

        assert_eq!(config.bind_addr.port(), 9100);
        assert_eq!(config.startup_timeout, Duration::from_secs(60));
        assert_eq!(config.generation_timeout, Duration::from_secs(120));
        assert_eq!(config.launch_script, Some(PathBuf::from("/opt/swarmui/launch-linux.sh")));
        assert_eq!(config.launch_args, vec!["--launch_mode", "none"]);
        assert!(config.wait_on_start);
        assert_eq!(config.api_url_text(), "http://127.0.0.1:7900");
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = CoordinatorConfig::from_args(parse(&["--api-url", "not a url"])).unwrap_err();
        assert!(err.to_string().contains("api_url"));

        let err = CoordinatorConfig::from_args(parse(&["--api-url", "ftp://127.0.0.1:21"])).unwrap_err();
        assert!(err.to_string().contains("http"));

        let err = CoordinatorConfig::from_args(parse(&["--startup-timeout", "0"])).unwrap_err();
        assert!(err.to_string().contains("startup_timeout"));

        let err = CoordinatorConfig::from_args(parse(&["--host", "not an ip"])).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_public_url_uses_pod_proxy() {
        let config = local().with_pod("abc123", None);
        assert_eq!(config.public_url(), "https://abc123-7801.proxy.runpod.net");

        let config = local().with_pod("abc123", Some(3000));
        assert_eq!(config.public_url(), "https://abc123-3000.proxy.runpod.net");

        let endpoint = config.endpoint();
        assert_eq!(endpoint.api_url, "http://127.0.0.1:7801");
        assert_eq!(endpoint.worker_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_public_url_without_pod_is_api_url() {
        let config = local();
        assert_eq!(config.public_url(), "http://127.0.0.1:7801");
        assert_eq!(config.endpoint().worker_id, None);
    }

    #[test]
    fn test_startup_backoff_stays_below_interval() {
        let config = local();
        assert_eq!(config.startup_backoff_for(Duration::from_secs(30)), Duration::from_secs(10));
        assert_eq!(config.startup_backoff_for(Duration::from_secs(1)), Duration::from_millis(500));

        let config = config.with_startup(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(config.startup_backoff_for(Duration::from_secs(30)), Duration::from_secs(1));
    }
}
