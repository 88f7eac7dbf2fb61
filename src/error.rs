use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

pub const AUTHORIZATION_ERR_MSG: &str =
    "Unauthorized access to the rendering service. Please check your API key.";
pub const BLOCKED_ACCOUNT_ERR_MSG: &str =
    "Access to the rendering service is blocked for this account or its quota is exhausted.";
pub const BAD_REQUEST_ERR_MSG: &str =
    "The rendering service rejected the request as malformed.";

/// Errors produced by the grid client.
///
/// The enum is `Clone` because a latched error is handed to every awaiter of
/// a test, including jobs that are already in flight when it is set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VgcError {
    #[error("{}", AUTHORIZATION_ERR_MSG)]
    Auth,

    #[error("{}", BLOCKED_ACCOUNT_ERR_MSG)]
    QuotaOrAccess,

    #[error("{}", BAD_REQUEST_ERR_MSG)]
    BadRequest,

    #[error("Failed to fetch {url} after {retries} retries: {message}")]
    Fetch {
        url: String,
        retries: u32,
        message: String,
    },

    #[error("Render protocol error: {0}")]
    RenderProtocol(String),

    #[error("Timed out waiting for render status of [{}]", render_ids.join(", "))]
    RenderTimeout { render_ids: Vec<String> },

    #[error("failed to render screenshot")]
    RenderFailed {
        render_id: String,
        message: Option<String>,
    },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rendering service error (status: {status}): {message}")]
    Service { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl VgcError {
    /// Map a non-success HTTP status from the rendering service to an error kind.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => VgcError::Auth,
            StatusCode::FORBIDDEN => VgcError::QuotaOrAccess,
            StatusCode::BAD_REQUEST => VgcError::BadRequest,
            _ => VgcError::Service {
                status: status.as_u16(),
                message: message.into(),
            },
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        VgcError::RenderProtocol(message.into())
    }

    pub fn session(message: impl Into<String>) -> Self {
        VgcError::Session(message.into())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            VgcError::Auth => ErrorPayload::new(
                ErrorCategory::Auth,
                self.to_string(),
                "Set VGC_API_KEY (or api_key in the config file) to a valid key.",
            ),
            VgcError::QuotaOrAccess => ErrorPayload::new(
                ErrorCategory::Auth,
                self.to_string(),
                "Check the account status and rendering quota with your administrator.",
            ),
            VgcError::BadRequest => ErrorPayload::new(
                ErrorCategory::Render,
                self.to_string(),
                "Verify browser names, size mode and selectors; run with --verbose for the request log.",
            ),
            VgcError::Fetch { url, .. } => ErrorPayload::new(
                ErrorCategory::Network,
                self.to_string(),
                format!("Make sure {url} is reachable from this machine, or pass it as resource content."),
            ),
            VgcError::RenderProtocol(_) => ErrorPayload::new(
                ErrorCategory::Render,
                self.to_string(),
                "The rendering service kept asking for resources; retry, and report if persistent.",
            ),
            VgcError::RenderTimeout { .. } => ErrorPayload::new(
                ErrorCategory::Render,
                self.to_string(),
                "Increase render_status_timeout or reduce render concurrency.",
            ),
            VgcError::RenderFailed { message, .. } => ErrorPayload::new(
                ErrorCategory::Render,
                match message {
                    Some(detail) => format!("{self}: {detail}"),
                    None => self.to_string(),
                },
                "Inspect the DOM snapshot and resources for this checkpoint.",
            ),
            VgcError::Session(_) => ErrorPayload::new(
                ErrorCategory::Session,
                self.to_string(),
                "Check app/test names and baseline settings.",
            ),
            VgcError::Network(_) | VgcError::Service { .. } => ErrorPayload::new(
                ErrorCategory::Network,
                self.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            VgcError::InvalidUrl(_) => ErrorPayload::new(
                ErrorCategory::Config,
                self.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            VgcError::Serialization(_) => ErrorPayload::new(
                ErrorCategory::Config,
                self.to_string(),
                "Check JSON/YAML inputs; run with --verbose for details.",
            ),
            VgcError::Io(_) => ErrorPayload::new(
                ErrorCategory::Config,
                self.to_string(),
                "Check file paths/permissions.",
            ),
            VgcError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("app_name") || lower.contains("app name") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Set app_name in the manifest, config file, or with --app-name.",
                    )
                } else if lower.contains("api key") || lower.contains("api_key") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Set VGC_API_KEY before running.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/paths and the config file (e.g., --browser chrome:1024x768).",
                    )
                }
            }
            VgcError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

impl From<reqwest::Error> for VgcError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => VgcError::from_status(status, err.to_string()),
            None => VgcError::Network(err.to_string()),
        }
    }
}

impl From<ParseError> for VgcError {
    fn from(err: ParseError) -> Self {
        VgcError::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for VgcError {
    fn from(err: serde_json::Error) -> Self {
        VgcError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for VgcError {
    fn from(err: std::io::Error) -> Self {
        VgcError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VgcError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Auth,
    Config,
    Network,
    Render,
    Session,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert_eq!(
            VgcError::from_status(StatusCode::UNAUTHORIZED, ""),
            VgcError::Auth
        );
        assert_eq!(
            VgcError::from_status(StatusCode::FORBIDDEN, ""),
            VgcError::QuotaOrAccess
        );
        assert_eq!(
            VgcError::from_status(StatusCode::BAD_REQUEST, ""),
            VgcError::BadRequest
        );
        assert!(matches!(
            VgcError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            VgcError::Service { status: 502, .. }
        ));
    }

    #[test]
    fn render_failed_displays_fixed_message() {
        let err = VgcError::RenderFailed {
            render_id: "r-1".into(),
            message: Some("bad css".into()),
        };
        assert_eq!(err.to_string(), "failed to render screenshot");
        assert!(err.to_payload().message.contains("bad css"));
    }

    #[test]
    fn config_payload_includes_app_name_hint() {
        let err = VgcError::Config("app_name is required to open a test".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("app_name"),
            "expected app_name remediation, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_uses_default_remediation_for_other_messages() {
        let err = VgcError::Config("Some other config issue".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(remediation.contains("Check flags/paths"));
    }

    #[test]
    fn fetch_payload_names_the_url() {
        let err = VgcError::Fetch {
            url: "https://cdn.example.com/a.css".into(),
            retries: 5,
            message: "connection reset".into(),
        };
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Network);
        assert!(payload
            .remediation
            .unwrap_or_default()
            .contains("https://cdn.example.com/a.css"));
    }

    #[test]
    fn timeout_lists_pending_ids() {
        let err = VgcError::RenderTimeout {
            render_ids: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Timed out waiting for render status of [a, b]");
    }
}
