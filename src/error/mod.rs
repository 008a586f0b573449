//! Error handling module

use thiserror::Error;

/// Netatmo error code for an expired access token
pub const EXPIRED_TOKEN_CODE: i64 = 3;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Vendor API answered with a structured error body
    #[error("HTTP request {path} failed: {message} ({status})")]
    Api {
        path: String,
        status: u16,
        code: Option<i64>,
        message: String,
        payload: serde_json::Value,
    },

    /// Transport-level failure (connect, timeout, undecodable body)
    #[error("HTTP request {path} failed: {message}")]
    Request { path: String, message: String },

    /// The access token was rejected again right after a refresh
    #[error("HTTP request {path} failed: access token rejected after refresh")]
    RetryExhausted { path: String },

    #[error("Invalid Netatmo token response: missing {0}")]
    InvalidTokenResponse(&'static str),

    #[error("No usable access token and no refresh token available")]
    NotAuthenticated,

    #[error("Module {0} is unknown, please make refresh")]
    UnknownModule(String),

    #[error("No location with Bubendorff products")]
    EmptyTopology,

    #[error("Invalid command for {module}: {reason}")]
    InvalidCommand { module: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// 401/403 carrying the vendor "expired token" code
    pub fn is_token_expired(&self) -> bool {
        matches!(
            self,
            BridgeError::Api { status: 401 | 403, code: Some(EXPIRED_TOKEN_CODE), .. }
        )
    }

    /// Errors the orchestrator answers with a re-authorization request
    pub fn is_fatal_auth(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidTokenResponse(_) | BridgeError::NotAuthenticated
        )
    }

    pub fn request(path: &str, err: impl std::fmt::Display) -> Self {
        BridgeError::Request {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}
