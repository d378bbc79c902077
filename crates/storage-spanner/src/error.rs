// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use sweep_data_model::DecodeError;
use sweep_storage::{LogicError, StorageError};
use thiserror::Error;

/// The status code of a failed Spanner request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Aborted,
    DeadlineExceeded,
    FailedPrecondition,
    InvalidArgument,
    NotFound,
    PermissionDenied,
    ResourceExhausted,
    Unavailable,
    Internal,
    Unknown,
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Aborted => "ABORTED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SpannerError {
    /// The engine answered with an error status
    #[error("spanner request failed with {code}: {message}")]
    Status { code: Code, message: String },

    /// A returned row didn't match the table schema
    #[error(transparent)]
    Inconsistency(#[from] DecodeError),

    /// The request couldn't be built
    #[error(transparent)]
    Logic(#[from] LogicError),
}

impl SpannerError {
    /// Build an error from a status code and message
    pub fn status(code: Code, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}

impl From<SpannerError> for StorageError {
    fn from(error: SpannerError) -> Self {
        match error {
            SpannerError::Inconsistency(e) => Self::Inconsistency(e),
            SpannerError::Logic(e) => Self::Logic(e),
            e @ SpannerError::Status { .. } => Self::backend(e),
        }
    }
}
