//! Real backend API client
//!
//! Talks to SwarmUI's REST surface over loopback HTTP. Only the
//! session-creation endpoint is known by name; everything else goes through
//! [`BackendApi::forward`] untouched.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use shared::logging::redact_session;
use shared::{ForwardRequest, HttpMethod, ProcessId, process_debug};

use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::{BackendApi, BackendSession};

/// Endpoint that issues sessions and needs no prior session state
pub const SESSION_PATH: &str = "/API/GetNewSession";

/// Longest backend body echoed back in an error message
const MAX_ERROR_BODY: usize = 512;

/// Real backend client built on a shared reqwest client
#[derive(Clone)]
pub struct RealBackendApi {
    base_url: Url,
    client: reqwest::Client,
    probe_timeout: Duration,
    session_timeout: Duration,
}

impl RealBackendApi {
    /// Create a client for the backend at `api_url`
    pub fn new(api_url: &str) -> SupervisorResult<Self> {
        let base_url = Url::parse(api_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SupervisorError::InvalidPath {
                path: api_url.to_string(),
                reason: "backend URL must be http or https".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SupervisorError::Transport { message: e.to_string() })?;

        Ok(Self {
            base_url,
            client,
            probe_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(30),
        })
    }

    /// Configure the per-probe timeout (fluent API)
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Join a caller-supplied path onto the backend base URL.
    ///
    /// Absolute URLs are refused so forwards cannot leave the local backend.
    pub fn resolve(&self, path: &str) -> SupervisorResult<Url> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(SupervisorError::InvalidPath {
                path: path.to_string(),
                reason: "path is empty".to_string(),
            });
        }
        if trimmed.contains("://") {
            return Err(SupervisorError::InvalidPath {
                path: path.to_string(),
                reason: "absolute URLs are not forwarded".to_string(),
            });
        }

        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            trimmed.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    async fn request_session(&self, timeout: Duration) -> SupervisorResult<BackendSession> {
        let url = self.resolve(SESSION_PATH)?;
        let body = self
            .send(Method::POST, url, Some(&Value::Object(Default::default())), timeout)
            .await?;
        parse_session(&body)
    }

    async fn send(&self, method: Method, url: Url, payload: Option<&Value>, timeout: Duration) -> SupervisorResult<Value> {
        let url_text = url.to_string();
        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SupervisorError::from_reqwest(&url_text, timeout, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SupervisorError::from_reqwest(&url_text, timeout, e))?;

        if !status.is_success() {
            return Err(SupervisorError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        serde_json::from_str(&text).map_err(|e| SupervisorError::malformed(format!("{e} (from {url_text})")))
    }
}

#[async_trait]
impl BackendApi for RealBackendApi {
    async fn probe_ready(&self) -> bool {
        match self.request_session(self.probe_timeout).await {
            Ok(_) => true,
            Err(e) => {
                process_debug!(ProcessId::current(), "🔍 Probe failed: {}", e);
                false
            }
        }
    }

    async fn new_session(&self) -> SupervisorResult<BackendSession> {
        let session = self.request_session(self.session_timeout).await?;
        process_debug!(
            ProcessId::current(),
            "🔑 Session ID: {} (version {})",
            redact_session(&session.session_id),
            session.version
        );
        Ok(session)
    }

    async fn forward(&self, request: &ForwardRequest, timeout: Duration) -> SupervisorResult<Value> {
        let url = self.resolve(&request.path)?;
        let method = to_reqwest_method(request.method);

        // GET carries no body; every other verb sends the payload or `{}`
        let empty = Value::Object(Default::default());
        let payload = match request.method {
            HttpMethod::Get => None,
            _ => Some(request.payload.as_ref().unwrap_or(&empty)),
        };

        process_debug!(
            ProcessId::current(),
            "➡️ Forwarding {} {} (timeout {}s)",
            request.method,
            url,
            timeout.as_secs()
        );
        self.send(method, url, payload, timeout).await
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Extract a session from a `GetNewSession` body
pub fn parse_session(body: &Value) -> SupervisorResult<BackendSession> {
    let session_id = body
        .get("session_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SupervisorError::malformed("no session_id in response"))?;

    let version = body
        .get("version")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown");

    Ok(BackendSession {
        session_id: session_id.to_string(),
        version: version.to_string(),
    })
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
