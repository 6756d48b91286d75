//! Action vocabulary exchanged with the job transport
//!
//! Requests arrive as the free-form `input` object of a job and are parsed
//! once into an [`ActionRequest`]. Every action produces exactly one
//! [`ActionResult`], which serializes to the JSON shape the caller expects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::{SharedError, SharedResult};
use crate::types::WorkerState;

/// Default total keep-alive time for `wakeup` and `keepalive`
pub const DEFAULT_KEEPALIVE_DURATION_SECS: u64 = 3600;

/// Default spacing between keep-alive pings
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 30;

/// Longest `duration`, `interval` or `timeout` a caller may ask for (one day)
pub const MAX_ACTION_SECS: u64 = 86_400;

/// HTTP verbs accepted by the `swarm_api` pass-through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parse a method name, case-insensitively
    pub fn parse(raw: &str) -> SharedResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(SharedError::invalid("method", format!("unsupported method '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verbatim call to forward to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRequest {
    pub method: HttpMethod,
    pub path: String,
    pub payload: Option<Value>,
    /// Seconds; `None` means the coordinator's configured generation timeout
    pub timeout_secs: Option<u64>,
}

/// One unit of external work
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Health,
    Ready,
    Wakeup { duration_secs: u64, interval_secs: u64 },
    KeepAlive { duration_secs: u64, interval_secs: u64 },
    Shutdown,
    SwarmApi(ForwardRequest),
}

impl ActionRequest {
    /// Parse a job `input` object.
    ///
    /// Validation happens here, before any network call is made.
    pub fn from_input(input: &Value) -> SharedResult<Self> {
        let fields = match input {
            Value::Null => return Err(SharedError::EmptyInput),
            Value::Object(map) if map.is_empty() => return Err(SharedError::EmptyInput),
            Value::Object(map) => map,
            _ => return Err(SharedError::invalid("input", "expected a JSON object")),
        };

        let action = match fields.get("action") {
            None | Some(Value::Null) => return Err(SharedError::missing("action")),
            Some(Value::String(s)) => s.trim().to_ascii_lowercase(),
            Some(_) => return Err(SharedError::invalid("action", "expected a string")),
        };

        match action.as_str() {
            "health" => Ok(ActionRequest::Health),
            "ready" => Ok(ActionRequest::Ready),
            "shutdown" => Ok(ActionRequest::Shutdown),
            "wakeup" => {
                let (duration_secs, interval_secs) = keepalive_params(fields)?;
                Ok(ActionRequest::Wakeup { duration_secs, interval_secs })
            }
            "keepalive" => {
                let (duration_secs, interval_secs) = keepalive_params(fields)?;
                Ok(ActionRequest::KeepAlive { duration_secs, interval_secs })
            }
            "swarm_api" => forward_params(fields).map(ActionRequest::SwarmApi),
            _ => Err(SharedError::UnknownAction { action }),
        }
    }

    /// Action tag as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::Health => "health",
            ActionRequest::Ready => "ready",
            ActionRequest::Wakeup { .. } => "wakeup",
            ActionRequest::KeepAlive { .. } => "keepalive",
            ActionRequest::Shutdown => "shutdown",
            ActionRequest::SwarmApi(_) => "swarm_api",
        }
    }
}

fn keepalive_params(fields: &Map<String, Value>) -> SharedResult<(u64, u64)> {
    let duration = optional_secs(fields, "duration")?.unwrap_or(DEFAULT_KEEPALIVE_DURATION_SECS);
    let interval = optional_secs(fields, "interval")?.unwrap_or(DEFAULT_KEEPALIVE_INTERVAL_SECS);
    if interval == 0 {
        return Err(SharedError::invalid("interval", "must be at least 1 second"));
    }
    Ok((duration, interval))
}

fn forward_params(fields: &Map<String, Value>) -> SharedResult<ForwardRequest> {
    let path = match fields.get("path") {
        None | Some(Value::Null) => return Err(SharedError::missing("path")),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(SharedError::missing("path")),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(SharedError::invalid("path", "expected a string")),
    };

    let method = match fields.get("method") {
        None | Some(Value::Null) => HttpMethod::default(),
        Some(Value::String(s)) => HttpMethod::parse(s)?,
        Some(_) => return Err(SharedError::invalid("method", "expected a string")),
    };

    let timeout_secs = optional_secs(fields, "timeout")?;
    if timeout_secs == Some(0) {
        return Err(SharedError::invalid("timeout", "must be at least 1 second"));
    }

    let payload = match fields.get("payload") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.clone()),
    };

    Ok(ForwardRequest {
        method,
        path,
        payload,
        timeout_secs,
    })
}

/// Read a whole number of seconds; numeric strings and floats are truncated.
/// Values above [`MAX_ACTION_SECS`] are refused.
fn optional_secs(fields: &Map<String, Value>, field: &str) -> SharedResult<Option<u64>> {
    let secs = raw_secs(fields, field)?;
    match secs {
        Some(v) if v > MAX_ACTION_SECS => Err(SharedError::invalid(
            field,
            format!("{v}s exceeds the maximum of {MAX_ACTION_SECS}s"),
        )),
        _ => Ok(secs),
    }
}

fn raw_secs(fields: &Map<String, Value>, field: &str) -> SharedResult<Option<u64>> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                Ok(Some(v))
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f >= 0.0 => Ok(Some(f as u64)),
                    _ => Err(SharedError::invalid(field, "must be a non-negative number of seconds")),
                }
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SharedError::invalid(field, format!("'{s}' is not a number of seconds"))),
        Some(_) => Err(SharedError::invalid(field, "must be a non-negative number of seconds")),
    }
}

/// Where callers can reach the backend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    pub api_url: String,
    pub public_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

/// `health` outcome
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,
}

/// `ready` outcome
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadyStatus {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub endpoint: Option<WorkerEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadyStatus {
    /// Normal negative state while the backend boots
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            session_id: None,
            version: None,
            endpoint: None,
            state: None,
            error: None,
        }
    }

    pub fn with_state(mut self, state: WorkerState) -> Self {
        self.state = Some(state);
        self
    }

    /// Probe succeeded but the session could not be obtained
    pub fn broken(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::not_ready()
        }
    }

    pub fn ready(session_id: String, version: String, endpoint: WorkerEndpoint) -> Self {
        Self {
            ready: true,
            session_id: Some(session_id),
            version: Some(version),
            endpoint: Some(endpoint),
            state: Some(WorkerState::Ready),
            error: None,
        }
    }
}

/// Ping counters reported at the end of a keep-alive loop
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeepAliveSummary {
    pub duration: u64,
    pub pings: u64,
    pub failures: u64,
}

/// `wakeup` success payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WakeupReport {
    pub success: bool,
    pub session_id: String,
    pub version: String,
    #[serde(flatten)]
    pub endpoint: WorkerEndpoint,
    /// The backend already answered on the first probe
    pub warm_start: bool,
    pub keepalive: KeepAliveSummary,
}

/// `keepalive` success payload
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveReport {
    pub success: bool,
    pub pings: u64,
    pub failures: u64,
    pub duration: u64,
    pub interval: u64,
}

/// `shutdown` acknowledgement
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShutdownAck {
    pub success: bool,
    pub message: String,
}

/// `swarm_api` success payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ForwardedResponse {
    pub success: bool,
    pub response: Value,
}

/// Structured failure returned for every error path
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub success: bool,
    pub error: String,
}

/// Result of one action
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ActionResult {
    Health(HealthStatus),
    Ready(ReadyStatus),
    Wakeup(WakeupReport),
    KeepAlive(KeepAliveReport),
    Shutdown(ShutdownAck),
    Forwarded(ForwardedResponse),
    Failure(FailureReport),
}

impl ActionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        ActionResult::Failure(FailureReport {
            success: false,
            error: error.into(),
        })
    }

    pub fn shutdown_ack(message: impl Into<String>) -> Self {
        ActionResult::Shutdown(ShutdownAck {
            success: true,
            message: message.into(),
        })
    }

    pub fn forwarded(response: Value) -> Self {
        ActionResult::Forwarded(ForwardedResponse {
            success: true,
            response,
        })
    }

    /// Outcome flag: `healthy`/`ready` for status checks, `success` otherwise
    pub fn is_success(&self) -> bool {
        match self {
            ActionResult::Health(h) => h.healthy,
            ActionResult::Ready(r) => r.ready,
            ActionResult::Wakeup(r) => r.success,
            ActionResult::KeepAlive(r) => r.success,
            ActionResult::Shutdown(r) => r.success,
            ActionResult::Forwarded(r) => r.success,
            ActionResult::Failure(_) => false,
        }
    }

    /// Error text, if the result carries one
    pub fn error(&self) -> Option<&str> {
        match self {
            ActionResult::Failure(f) => Some(&f.error),
            ActionResult::Ready(r) => r.error.as_deref(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "success": false, "error": format!("Failed to encode result: {e}") })
        })
    }
}

impl From<SharedError> for ActionResult {
    fn from(err: SharedError) -> Self {
        ActionResult::failure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_status_actions() {
        assert_eq!(ActionRequest::from_input(&json!({"action": "health"})), Ok(ActionRequest::Health));
        assert_eq!(ActionRequest::from_input(&json!({"action": "READY"})), Ok(ActionRequest::Ready));
        assert_eq!(ActionRequest::from_input(&json!({"action": "shutdown"})), Ok(ActionRequest::Shutdown));
    }

    #[test]
    fn test_wakeup_defaults() {
        let request = ActionRequest::from_input(&json!({"action": "wakeup"})).unwrap();
        assert_eq!(
            request,
            ActionRequest::Wakeup {
                duration_secs: DEFAULT_KEEPALIVE_DURATION_SECS,
                interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            }
        );
    }

    #[test]
    fn test_keepalive_accepts_numeric_strings_and_floats() {
        let request =
            ActionRequest::from_input(&json!({"action": "keepalive", "duration": "120", "interval": 10.7})).unwrap();
        assert_eq!(
            request,
            ActionRequest::KeepAlive {
                duration_secs: 120,
                interval_secs: 10,
            }
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ActionRequest::from_input(&json!({"action": "keepalive", "interval": 0})).unwrap_err();
        assert!(matches!(err, SharedError::InvalidField { ref field, .. } if field == "interval"));
    }

    #[test]
    fn test_oversized_seconds_rejected() {
        for input in [
            json!({"action": "keepalive", "duration": 1e30}),
            json!({"action": "keepalive", "interval": "18446744073709551615"}),
            json!({"action": "wakeup", "duration": MAX_ACTION_SECS + 1}),
            json!({"action": "swarm_api", "path": "/API/ListModels", "timeout": 1e20}),
        ] {
            let err = ActionRequest::from_input(&input).unwrap_err();
            assert!(matches!(err, SharedError::InvalidField { .. }), "{input}: {err:?}");
        }

        let request = ActionRequest::from_input(&json!({"action": "keepalive", "duration": MAX_ACTION_SECS})).unwrap();
        assert_eq!(
            request,
            ActionRequest::KeepAlive {
                duration_secs: MAX_ACTION_SECS,
                interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            }
        );
    }

    #[test]
    fn test_negative_duration_rejected() {
        let err = ActionRequest::from_input(&json!({"action": "wakeup", "duration": -5})).unwrap_err();
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn test_swarm_api_requires_path() {
        for input in [
            json!({"action": "swarm_api"}),
            json!({"action": "swarm_api", "path": null}),
            json!({"action": "swarm_api", "path": "   "}),
        ] {
            let err = ActionRequest::from_input(&input).unwrap_err();
            assert_eq!(err, SharedError::missing("path"));
        }

        let err = ActionRequest::from_input(&json!({"action": "swarm_api", "path": 42})).unwrap_err();
        assert!(matches!(err, SharedError::InvalidField { ref field, .. } if field == "path"));
    }

    #[test]
    fn test_swarm_api_defaults_to_post() {
        let request = ActionRequest::from_input(&json!({
            "action": "swarm_api",
            "path": "/API/ListModels",
            "payload": {"depth": 2}
        }))
        .unwrap();

        match request {
            ActionRequest::SwarmApi(forward) => {
                assert_eq!(forward.method, HttpMethod::Post);
                assert_eq!(forward.path, "/API/ListModels");
                assert_eq!(forward.payload, Some(json!({"depth": 2})));
                assert_eq!(forward.timeout_secs, None);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_method_rejected() {
        let err = ActionRequest::from_input(&json!({"action": "swarm_api", "path": "/x", "method": "TRACE"}))
            .unwrap_err();
        assert!(err.to_string().contains("TRACE"));
    }

    #[test]
    fn test_unknown_and_missing_action() {
        let err = ActionRequest::from_input(&json!({"action": "generate"})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: generate");

        let err = ActionRequest::from_input(&json!({"prompt": "a cat"})).unwrap_err();
        assert_eq!(err, SharedError::missing("action"));

        assert_eq!(ActionRequest::from_input(&json!({})), Err(SharedError::EmptyInput));
        assert_eq!(ActionRequest::from_input(&Value::Null), Err(SharedError::EmptyInput));
    }

    #[test]
    fn test_result_shapes() {
        assert_eq!(
            ActionResult::Health(HealthStatus { healthy: false }).to_value(),
            json!({"healthy": false})
        );
        assert_eq!(ActionResult::Ready(ReadyStatus::not_ready()).to_value(), json!({"ready": false}));
        assert_eq!(
            ActionResult::failure("boom").to_value(),
            json!({"success": false, "error": "boom"})
        );
    }

    #[test]
    fn test_ready_status_flattens_endpoint() {
        let endpoint = WorkerEndpoint {
            api_url: "http://127.0.0.1:7801".to_string(),
            public_url: "https://pod-7801.proxy.runpod.net".to_string(),
            worker_id: Some("pod".to_string()),
        };
        let value = ActionResult::Ready(ReadyStatus::ready("abc".into(), "0.9".into(), endpoint)).to_value();

        assert_eq!(value["ready"], json!(true));
        assert_eq!(value["session_id"], json!("abc"));
        assert_eq!(value["public_url"], json!("https://pod-7801.proxy.runpod.net"));
        assert_eq!(value["worker_id"], json!("pod"));
        assert_eq!(value["state"], json!("ready"));
        assert!(value.get("error").is_none());

        let starting = ReadyStatus::not_ready().with_state(WorkerState::Starting);
        assert_eq!(
            ActionResult::Ready(starting).to_value(),
            json!({"ready": false, "state": "starting"})
        );
    }

    #[test]
    fn test_outcome_flags() {
        assert!(!ActionResult::failure("x").is_success());
        assert_eq!(ActionResult::failure("x").error(), Some("x"));
        assert!(ActionResult::shutdown_ack("bye").is_success());
        assert!(ActionResult::forwarded(json!({})).is_success());
        assert_eq!(ActionResult::Ready(ReadyStatus::broken("no session")).error(), Some("no session"));
    }
}
