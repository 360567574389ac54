//! Error taxonomy shared by every exploration operation.

use std::collections::TryReserveError;

use serde::Serialize;
use thiserror::Error;

/// Result alias used by every exploration operation.
pub type Result<T> = std::result::Result<T, ExplorerError>;

/// Failure taxonomy reported to callers of the exploration core.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExplorerError {
    /// The request itself is malformed (zero id, inverted txg bounds, bad filter).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The addressed object or dataset does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The object exists but is the wrong on-disk kind for the requested view.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Building the response ran out of memory; retrying may succeed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// The pool access provider failed unexpectedly mid-operation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable code for an [`ExplorerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// See [`ExplorerError::InvalidArgument`].
    InvalidArgument,
    /// See [`ExplorerError::NotFound`].
    NotFound,
    /// See [`ExplorerError::Unsupported`].
    Unsupported,
    /// See [`ExplorerError::ResourceExhausted`].
    ResourceExhausted,
    /// See [`ExplorerError::Internal`].
    Internal,
}

impl ErrorCode {
    /// Wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unsupported => "UNSUPPORTED",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl ExplorerError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ExplorerError::InvalidArgument(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        ExplorerError::NotFound(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        ExplorerError::Unsupported(message.into())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ExplorerError::Internal(message.into())
    }

    /// Returns the machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ExplorerError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ExplorerError::NotFound(_) => ErrorCode::NotFound,
            ExplorerError::Unsupported(_) => ErrorCode::Unsupported,
            ExplorerError::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
            ExplorerError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether a caller can reasonably retry or correct the request.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            ExplorerError::InvalidArgument(_) | ExplorerError::ResourceExhausted(_)
        )
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ExplorerError::InvalidArgument(msg)
            | ExplorerError::NotFound(msg)
            | ExplorerError::Unsupported(msg)
            | ExplorerError::ResourceExhausted(msg)
            | ExplorerError::Internal(msg) => msg,
        }
    }
}

impl From<TryReserveError> for ExplorerError {
    fn from(err: TryReserveError) -> Self {
        ExplorerError::ResourceExhausted(format!("failed to grow response buffer: {err}"))
    }
}
