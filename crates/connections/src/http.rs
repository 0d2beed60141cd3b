//! Plumbing shared by every HTTP-backed connection.

use std::time::Duration;

use murmur_core::{ActionArgs, ActionFailure, MAX_RETRY_AFTER_SECS};
use serde_json::Value;
use tracing::warn;

/// Default per-request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Rate-limit wait assumed when the backend sends no hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Build a client that enforces `timeout_secs` on every request.
pub fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("Failed to create HTTP client")
}

/// A secret looked up in the process environment each time it is needed.
#[derive(Debug, Clone)]
pub struct Credential {
    env_var: String,
}

impl Credential {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
        }
    }

    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// The current value, if set and non-empty.
    pub fn resolve(&self) -> Option<String> {
        std::env::var(&self.env_var)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn require(&self) -> Result<String, ActionFailure> {
        self.resolve()
            .ok_or_else(|| ActionFailure::MissingCredential(self.env_var.clone()))
    }

    /// Readiness check used by `is_configured`.
    pub fn check(&self, connection: &str, verbose: bool) -> bool {
        let present = self.resolve().is_some();
        if !present && verbose {
            warn!(connection = %connection, env = %self.env_var, "Credential not set");
        }
        present
    }
}

/// Map a transport error from `reqwest`.
pub fn send_error(error: reqwest::Error, timeout_secs: u64) -> ActionFailure {
    if error.is_timeout() {
        ActionFailure::Timeout(timeout_secs)
    } else {
        ActionFailure::Network(error.to_string())
    }
}

/// Turn a non-success status into an [`ActionFailure`].
///
/// `429` becomes `RateLimited`, honouring `retry-after` (seconds) or
/// `x-rate-limit-reset` (Unix seconds) when present.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ActionFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        return Err(ActionFailure::RateLimited {
            retry_after_secs: retry_after(response.headers()),
        });
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "Backend returned error");
    Err(ActionFailure::Api {
        status: status.as_u16(),
        message: body,
    })
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> u64 {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    let secs = if let Some(secs) = header("retry-after") {
        secs
    } else if let Some(reset_at) = header("x-rate-limit-reset") {
        reset_at.saturating_sub(chrono::Utc::now().timestamp())
    } else {
        return DEFAULT_RETRY_AFTER_SECS;
    };
    secs.clamp(0, MAX_RETRY_AFTER_SECS as i64) as u64
}

/// Check the status and decode a JSON body.
pub async fn read_json(response: reqwest::Response) -> Result<Value, ActionFailure> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| ActionFailure::InvalidResponse(format!("Failed to parse response: {e}")))
}

/// A validated string argument.
pub fn str_arg<'a>(args: &'a ActionArgs, key: &str) -> Result<&'a str, ActionFailure> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ActionFailure::Other(format!("argument '{key}' missing")))
}

/// A validated optional integer argument.
pub fn u64_arg(args: &ActionArgs, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Strip trailing slashes so paths can be appended with `format!`.
pub fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
