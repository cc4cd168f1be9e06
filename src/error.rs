//! Error types for the harness.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("browser failed to start: {0}")]
    SessionStartup(String),

    #[error("DevTools endpoint not reachable after {0} attempts")]
    DevtoolsDiscovery(usize),

    #[error("failed to connect to DevTools WebSocket at {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("CDP error {code}: {message}")]
    Cdp { code: i64, message: String },

    #[error("CDP command '{method}' timed out after {timeout:?}")]
    CommandTimeout { method: String, timeout: Duration },

    #[error("CDP protocol error: {0}")]
    Protocol(String),

    #[error("page script threw: {0}")]
    Script(String),

    #[error("element not found within {timeout:?}: {target}")]
    ElementNotFound { target: String, timeout: Duration },

    #[error("element not actionable within {timeout:?}: {target} ({reason})")]
    ActionTimeout {
        target: String,
        reason: String,
        timeout: Duration,
    },

    #[error("navigation to {url} did not commit within {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("assertion {index} unmet: expected {expectation}")]
    AssertionUnmet { index: usize, expectation: String },

    #[error("step {step} failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
