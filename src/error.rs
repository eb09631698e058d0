use std::time::Duration;

use chromiumoxide::error::CdpError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::ComponentError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Browser protocol error: {0}")]
    Browser(#[from] CdpError),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Invalid render request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Timed out after {after:?} while {stage}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Renderer unavailable: {0}")]
    Unavailable(String),

    #[error("Render task panicked")]
    TaskPanicked,

    #[error("Renderer pool has shut down")]
    PoolShutdown,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RenderError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        RenderError::InvalidRequest(message.into())
    }

    pub fn capture(message: impl Into<String>) -> Self {
        RenderError::Capture(message.into())
    }

    /// Whether the error was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        match self {
            RenderError::InvalidRequest(_) => true,
            RenderError::Component(err) => err.is_lookup_failure(),
            _ => false,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            RenderError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check the components directory path and permissions.",
            ),
            RenderError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Request,
                e.to_string(),
                "Check the JSON body; props and viewport must be objects.",
            ),
            RenderError::Image(e) => ErrorPayload::new(
                ErrorCategory::Capture,
                e.to_string(),
                "The browser returned an unreadable PNG; retry the request.",
            ),
            RenderError::Browser(e) => ErrorPayload::new(
                ErrorCategory::Browser,
                e.to_string(),
                "The browser connection failed mid-task; it is relaunched automatically, retry the request.",
            ),
            RenderError::Launch(msg) => ErrorPayload::new(
                ErrorCategory::Browser,
                msg.to_string(),
                "Install Chrome/Chromium or point --chrome at the executable; containers usually need no_sandbox = true.",
            ),
            RenderError::InvalidRequest(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("output type") {
                    ErrorPayload::new(
                        ErrorCategory::Request,
                        msg.to_string(),
                        "Use type=markup (alias html) or type=raster (alias png).",
                    )
                } else if lower.contains("props") {
                    ErrorPayload::new(
                        ErrorCategory::Request,
                        msg.to_string(),
                        "Send props as a JSON object, or as props-<key>=<value> query parameters.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Request,
                        msg.to_string(),
                        "Check the request body/query against GET|POST /render.",
                    )
                }
            }
            RenderError::Component(err) => match err {
                ComponentError::NotFound(_) | ComponentError::InvalidName(_) => {
                    ErrorPayload::new(
                        ErrorCategory::Component,
                        err.to_string(),
                        "Check the component name against the files in the components directory.",
                    )
                }
                _ => ErrorPayload::new(
                    ErrorCategory::Component,
                    err.to_string(),
                    "Fix the component template; placeholders must look like {{ name }}.",
                ),
            },
            RenderError::Capture(msg) => ErrorPayload::new(
                ErrorCategory::Capture,
                msg.to_string(),
                "Make sure the component renders visible content with a non-zero size.",
            ),
            RenderError::Timeout { .. } => ErrorPayload::new(
                ErrorCategory::Capture,
                self.to_string(),
                "Increase browser.navigation_timeout or make the component load faster.",
            ),
            RenderError::Unavailable(msg) => ErrorPayload::new(
                ErrorCategory::Browser,
                msg.to_string(),
                "The browser could not be started; check the logs and the retry settings.",
            ),
            RenderError::TaskPanicked => ErrorPayload::new(
                ErrorCategory::Unknown,
                self.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
            RenderError::PoolShutdown => ErrorPayload::new(
                ErrorCategory::Browser,
                self.to_string(),
                "The service is shutting down; retry against a running instance.",
            ),
            RenderError::Config(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check rendershot.toml and the command-line flags.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Request,
    Component,
    Capture,
    Browser,
    Config,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

/// Collects the `source()` chain of an error, outermost first.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages
}
