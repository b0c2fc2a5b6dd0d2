//! Error kinds surfaced by the resource client and the config codec.

use thiserror::Error;

/// Failure of a single operator action.
///
/// Local kinds (`NoCredential`, `EmptyKeyword`, `KeywordTooLong`,
/// `InvalidNumber`) are raised before any request leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not logged in: no admin token available")]
    NoCredential,

    #[error("enter a search keyword")]
    EmptyKeyword,

    #[error("search keyword is longer than {max} characters")]
    KeywordTooLong { max: usize },

    #[error("{field} must be a positive integer")]
    InvalidNumber { field: String },

    /// The backend rejected the credential. `forced_logout` is set only for
    /// the call that actually moved the session to logged-out.
    #[error("admin token expired or invalid, please log in again")]
    Unauthorized { forced_logout: bool },

    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("unexpected response from server: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// True when the failure was detected without a network round trip.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::NoCredential
                | Self::EmptyKeyword
                | Self::KeywordTooLong { .. }
                | Self::InvalidNumber { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Build a `RequestFailed` from a non-success status and its raw body.
    ///
    /// A JSON body of the form `{"detail": "..."}` supplies the message;
    /// anything else falls back to a message keyed by status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .filter(|d| !d.trim().is_empty());

        Self::RequestFailed {
            status,
            message: detail.unwrap_or_else(|| generic_status_message(status)),
        }
    }
}

fn generic_status_message(status: u16) -> String {
    match status {
        400 => "bad request (400)".to_string(),
        403 => "forbidden (403)".to_string(),
        404 => "not found (404)".to_string(),
        422 => "request rejected by server validation (422)".to_string(),
        500..=599 => format!("server error ({})", status),
        _ => format!("request failed (status {})", status),
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
