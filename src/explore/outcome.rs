//! Result envelope handed to API and CLI consumers.

use serde::Serialize;

use crate::error::{ErrorCode, ExplorerError, Result};

/// Response envelope: exactly one of a payload or an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    /// Successful result.
    Payload {
        /// Operation-specific object.
        payload: T,
    },
    /// Failure.
    Failure {
        /// Machine-readable kind.
        error_code: ErrorCode,
        /// Human-readable message.
        error_message: String,
    },
}

impl<T> Outcome<T> {
    /// Error code of a failed outcome.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Outcome::Payload { .. } => None,
            Outcome::Failure { error_code, .. } => Some(*error_code),
        }
    }
}

impl<T> From<ExplorerError> for Outcome<T> {
    fn from(err: ExplorerError) -> Self {
        Outcome::Failure {
            error_code: err.code(),
            error_message: err.message().to_owned(),
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(payload) => Outcome::Payload { payload },
            Err(err) => err.into(),
        }
    }
}
