// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use sweep_data_model::{ColumnType, DecodeError};
use thiserror::Error;

use crate::{DialectKind, WriteKind};

/// An error in the way the engine was set up, detected before any I/O
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unsupported database dialect {0:?}")]
    UnsupportedDialect(String),

    #[error("page size of maintenance target {target:?} must be positive")]
    InvalidPageSize { target: String },

    #[error("the cutoff of maintenance target {target:?} is out of the representable time range")]
    CutoffOutOfRange { target: String },

    #[error("the {backend} backend can't be used with the {dialect} dialect")]
    DialectMismatch {
        backend: &'static str,
        dialect: DialectKind,
    },
}

/// A request which can never succeed, whatever the state of the database
#[derive(Debug, Error)]
pub enum LogicError {
    #[error("table {table:?} has no mutable columns to upsert")]
    NoMutableColumns { table: &'static str },

    #[error("table {table:?} does not declare its key column")]
    MissingKeyColumn { table: &'static str },

    #[error("table {table:?} has no column {column:?}")]
    UnknownColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("table {table:?} has {expected} columns, but a row has {actual} values")]
    ColumnCountMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("column {column:?} expects a {expected} value, got {actual}")]
    TypeMismatch {
        column: &'static str,
        expected: ColumnType,
        actual: &'static str,
    },

    #[error("column {column:?} can't be compared with NULL")]
    UnboundNull { column: &'static str },

    #[error("the {dialect} dialect doesn't support {kind} batches on this backend")]
    UnsupportedWrite {
        dialect: DialectKind,
        kind: WriteKind,
    },

    #[error("key {key} appears more than once in an upsert batch on {table:?}")]
    DuplicateKeyInBatch { table: &'static str, key: String },

    #[error("page of {target:?} ended at {last}, which is not past cursor {cursor}")]
    CursorNotAdvanced {
        target: String,
        cursor: String,
        last: String,
    },
}

/// An error returned by a [`CursorPager`] or a [`BatchMutator`]
///
/// [`CursorPager`]: crate::CursorPager
/// [`BatchMutator`]: crate::BatchMutator
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed, typically a connection or a transient error
    #[error("the storage backend failed")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error(transparent)]
    Logic(#[from] LogicError),

    /// The backend returned a row which doesn't match the table schema
    #[error("the storage backend returned an inconsistent row")]
    Inconsistency(#[from] DecodeError),
}

impl StorageError {
    /// Wrap a backend-specific error
    pub fn backend(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(error))
    }
}

/// The phase of a maintenance run in which an error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuration,
    Fetch,
    Mutate,
    Advance,
}

/// An error which aborted a maintenance run
///
/// Pages mutated before the error stay applied.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to fetch a page of {target:?}")]
    Fetch {
        target: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to apply a {kind} batch on {target:?}")]
    Mutate {
        target: String,
        kind: WriteKind,
        #[source]
        source: StorageError,
    },

    #[error("failed to advance the cursor of {target:?}")]
    Advance {
        target: String,
        #[source]
        source: LogicError,
    },
}

impl MaintenanceError {
    /// The phase of the run which failed
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Configuration(_) => Phase::Configuration,
            Self::Fetch { .. } => Phase::Fetch,
            Self::Mutate { .. } => Phase::Mutate,
            Self::Advance { .. } => Phase::Advance,
        }
    }
}
