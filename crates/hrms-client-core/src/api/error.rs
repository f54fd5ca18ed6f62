use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Status reported for failures that never produced an HTTP response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// Maximum length for non-JSON error bodies kept in `data`
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Fallback message when neither the body nor the status carries one
const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request failed with status {status}: {message}")]
    Http {
        status: u16,
        message: String,
        data: Option<Value>,
    },

    #[error("Unauthorized - credential rejected after refresh: {message}")]
    Unauthorized { message: String, data: Option<Value> },

    #[error("Session expired: {message}")]
    AuthExpired {
        status: u16,
        message: String,
        data: Option<Value>,
    },

    #[error("Invalid payload: {0}")]
    Protocol(String),
}

/// Wire shape of a failure as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ErrorEnvelope {
    pub message: String,
    pub status: u16,
    pub data: Option<Value>,
}

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    /// Parse an error body into JSON, keeping plain text bodies as a string.
    pub(crate) fn body_data(body: &str) -> Option<Value> {
        if body.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Some(value),
            Err(_) => Some(Value::String(Self::truncate_body(body))),
        }
    }

    /// Pick the server-provided `message` field, else the status reason phrase.
    pub(crate) fn message_for(status: StatusCode, data: Option<&Value>) -> String {
        data.and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| UNEXPECTED_ERROR_MESSAGE.to_string())
    }

    /// Build the error for a non-success status other than 401.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let data = Self::body_data(body);
        ApiError::Http {
            status: status.as_u16(),
            message: Self::message_for(status, data.as_ref()),
            data,
        }
    }

    /// Turn any failure of the refresh call into the terminal session error.
    pub fn into_auth_expired(self) -> Self {
        match self {
            ApiError::AuthExpired { .. } => self,
            other => ApiError::AuthExpired {
                status: other.status(),
                message: other.message(),
                data: other.data().cloned(),
            },
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::Transport(_) | ApiError::Protocol(_) => TRANSPORT_FAILURE_STATUS,
            ApiError::Http { status, .. } | ApiError::AuthExpired { status, .. } => *status,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED.as_u16(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Transport(message) | ApiError::Protocol(message) => message.clone(),
            ApiError::Http { message, .. }
            | ApiError::Unauthorized { message, .. }
            | ApiError::AuthExpired { message, .. } => message.clone(),
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ApiError::Transport(_) | ApiError::Protocol(_) => None,
            ApiError::Http { data, .. }
            | ApiError::Unauthorized { data, .. }
            | ApiError::AuthExpired { data, .. } => data.as_ref(),
        }
    }

    /// True when the session is gone and the user must log in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired { .. })
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            message: self.message(),
            status: self.status(),
            data: self.data().cloned(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl From<ApiError> for ErrorEnvelope {
    fn from(err: ApiError) -> Self {
        err.to_envelope()
    }
}
