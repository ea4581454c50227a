use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RouteNotFound,
    RegistrationClosed,
    InvalidPattern,
    LoaderFailure,
    InvalidLocation,
}

/// Error report handed to the render boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellError {
    pub code: ErrorCode,
    pub message: String,
}

impl ShellError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ShellException {
    pub code: ErrorCode,
    pub message: String,
}

impl ShellException {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ShellException> for ShellError {
    fn from(value: ShellException) -> Self {
        Self {
            code: value.code,
            message: value.message,
        }
    }
}
