// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use sqlx::postgres::PgQueryResult;
use sweep_data_model::DecodeError;
use sweep_storage::{LogicError, StorageError};
use thiserror::Error;

/// Generic error when interacting with the database
#[derive(Debug, Error)]
#[error(transparent)]
pub enum DatabaseError {
    /// An error which came from the database itself
    Driver(#[from] sqlx::Error),

    /// A row didn't match the table schema
    Inconsistency(#[from] DecodeError),

    /// The statement couldn't be rendered
    Logic(#[from] LogicError),

    /// The database affected more rows than the statement could
    #[error("expected at most {expected} rows to be affected, but {actual} rows were affected")]
    RowsAffected { expected: u64, actual: u64 },
}

impl DatabaseError {
    /// Check that a statement affected at most `expected` rows
    pub(crate) fn ensure_at_most_affected_rows(
        result: &PgQueryResult,
        expected: u64,
    ) -> Result<u64, DatabaseError> {
        let actual = result.rows_affected();
        if actual <= expected {
            Ok(actual)
        } else {
            Err(DatabaseError::RowsAffected { expected, actual })
        }
    }
}

impl From<DatabaseError> for StorageError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Inconsistency(e) => Self::Inconsistency(e),
            DatabaseError::Logic(e) => Self::Logic(e),
            e @ (DatabaseError::Driver(_) | DatabaseError::RowsAffected { .. }) => {
                Self::backend(e)
            }
        }
    }
}
