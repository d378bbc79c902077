// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use sqlx::PgPool;
use sweep_data_model::Record;
use sweep_storage::{
    ConfigurationError, CursorPager, Dialect, PageRequest, StorageError, statement::select_page,
};

use crate::{
    DatabaseError,
    binding::{decode_row, prepare},
    ensure_array_dialect,
    telemetry::record_duration,
    tracing::ExecuteExt,
};

/// A [`CursorPager`] reading pages out of a PostgreSQL or CockroachDB pool
#[derive(Debug, Clone)]
pub struct PgCursorPager {
    pool: PgPool,
    dialect: Arc<dyn Dialect>,
}

impl PgCursorPager {
    /// Create a pager on top of a pool
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DialectMismatch`] if the dialect doesn't
    /// batch writes as array statements, which means it is not one this
    /// backend can speak
    pub fn new(pool: PgPool, dialect: Arc<dyn Dialect>) -> Result<Self, ConfigurationError> {
        ensure_array_dialect(dialect.as_ref())?;
        Ok(Self { pool, dialect })
    }
}

#[async_trait]
impl<R: Record> CursorPager<R> for PgCursorPager {
    #[tracing::instrument(
        name = "db.cursor_pager.fetch",
        skip_all,
        fields(
            db.query.text,
            db.system.name,
            db.collection.name = R::SCHEMA.table,
            page.after = %request.after,
            page.limit = request.limit.get(),
        ),
        err,
    )]
    async fn fetch(&self, request: PageRequest<'_, R::Key>) -> Result<Vec<R>, StorageError> {
        let statement = select_page(
            self.dialect.as_ref(),
            R::SCHEMA,
            request.after.into(),
            request.filter,
            request.limit.get(),
            request.staleness,
        )?;

        let start = Instant::now();
        let rows = prepare(&statement)?
            .traced(self.dialect.kind())
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        record_duration(start, self.dialect.kind(), "SELECT", R::SCHEMA.table);

        let page = rows
            .iter()
            .map(|row| Ok(R::from_values(decode_row(R::SCHEMA, row)?)?))
            .collect::<Result<Vec<R>, StorageError>>()?;

        Ok(page)
    }
}
