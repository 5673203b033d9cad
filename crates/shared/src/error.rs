use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code used when a failure never produced an HTTP status.
pub const NO_STATUS: u16 = 0;

/// The single failure kind surfaced by directory operations.
///
/// Network failures, rejected requests and missing payloads are not told
/// apart; callers only get the transport status code and a description.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("An error occurred - Error code: {status_code}")]
pub struct OperationError {
    pub status_code: u16,
    pub message: String,
}

impl OperationError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn from_status(status_code: u16) -> Self {
        Self::new(status_code, format!("request failed with status {status_code}"))
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(NO_STATUS, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            NO_STATUS,
            format!("request timed out after {} ms", after.as_millis()),
        )
    }

    pub fn missing_payload(status_code: u16, field: &str) -> Self {
        Self::new(status_code, format!("response is missing `{field}` payload"))
    }
}
