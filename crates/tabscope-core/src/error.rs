use serde::{Deserialize, Serialize};
use tabscope_storage::WorkspaceId;
use thiserror::Error;

use crate::host::HostError;

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    Storage,
    Host,
    NotFound,
    InvalidRequest,
    ResponseTooLarge,
}

/// Error returned to the UI for a rejected request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub code: ErrorCode,
    pub message: String,
}

impl RequestError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<EngineError> for RequestError {
    fn from(error: EngineError) -> Self {
        let code = match &error {
            EngineError::Storage(_) => ErrorCode::Storage,
            EngineError::Host(_) => ErrorCode::Host,
            EngineError::WorkspaceNotFound(_) => ErrorCode::NotFound,
            EngineError::InvalidRequest(_) => ErrorCode::InvalidRequest,
        };
        Self::new(code, error.to_string())
    }
}
