// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use sqlx::PgPool;
use sweep_data_model::Record;
use sweep_storage::{
    BatchMutator, BatchWrite, ConfigurationError, Dialect, StorageError,
    statement::{delete_keys, upsert_unnest},
};

use crate::{
    DatabaseError, binding::prepare, ensure_array_dialect, telemetry::record_duration,
    tracing::ExecuteExt,
};

/// A [`BatchMutator`] applying each batch as a single statement binding
/// arrays, on a PostgreSQL or CockroachDB pool
#[derive(Debug, Clone)]
pub struct PgBatchMutator {
    pool: PgPool,
    dialect: Arc<dyn Dialect>,
}

impl PgBatchMutator {
    /// Create a mutator on top of a pool
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DialectMismatch`] if the dialect doesn't
    /// batch writes as array statements
    pub fn new(pool: PgPool, dialect: Arc<dyn Dialect>) -> Result<Self, ConfigurationError> {
        ensure_array_dialect(dialect.as_ref())?;
        Ok(Self { pool, dialect })
    }
}

#[async_trait]
impl<R: Record> BatchMutator<R> for PgBatchMutator {
    #[tracing::instrument(
        name = "db.batch_mutator.apply",
        skip_all,
        fields(
            db.query.text,
            db.system.name,
            db.collection.name = R::SCHEMA.table,
            batch.kind = %batch.kind(),
            batch.size = batch.len(),
        ),
        err,
    )]
    async fn apply(&self, batch: BatchWrite<R>) -> Result<u64, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let expected = u64::try_from(batch.len()).unwrap_or(u64::MAX);
        let (operation, statement) = match batch {
            BatchWrite::Delete(keys) => (
                "DELETE",
                delete_keys(
                    self.dialect.as_ref(),
                    R::SCHEMA,
                    keys.into_iter().map(Into::into).collect(),
                )?,
            ),
            BatchWrite::UpsertOverwrite(rows) => {
                let rows: Vec<_> = rows.iter().map(Record::to_values).collect();
                (
                    "INSERT",
                    upsert_unnest(self.dialect.as_ref(), R::SCHEMA, &rows)?,
                )
            }
        };

        let start = Instant::now();
        let result = prepare(&statement)?
            .traced(self.dialect.kind())
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        record_duration(start, self.dialect.kind(), operation, R::SCHEMA.table);

        let affected = DatabaseError::ensure_at_most_affected_rows(&result, expected)?;
        Ok(affected)
    }
}
