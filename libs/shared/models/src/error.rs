use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const FALLBACK_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Why the stored session was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
    MissingRefreshToken,
    RefreshRejected,
    MissingAccessToken,
}

impl std::fmt::Display for AuthFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailureReason::MissingRefreshToken => write!(f, "no refresh token stored"),
            AuthFailureReason::RefreshRejected => write!(f, "refresh token rejected"),
            AuthFailureReason::MissingAccessToken => {
                write!(f, "refresh response carried no access token")
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("{message}")]
    Api {
        message: String,
        status: Option<u16>,
        data: Option<Value>,
    },

    #[error("Session expired: {0}")]
    SessionExpired(AuthFailureReason),

    #[error("{0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Uniform error value handed to callers for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => *status,
            ClientError::SessionExpired(_) => Some(401),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        let message = match self {
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Transport(message) => message.clone(),
            other => other.to_string(),
        };
        if message.trim().is_empty() {
            FALLBACK_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ClientError::Api { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, ClientError::SessionExpired(_))
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            message: self.message(),
            status: self.status(),
            data: self.data().cloned(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
