// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use async_trait::async_trait;
use sweep_data_model::Record;
use sweep_storage::{
    ConfigurationError, CursorPager, Dialect, PageRequest, StorageError, statement::select_page,
};
use tracing::Span;

use crate::{SpannerClient, TimestampBound, ensure_mutation_dialect};

/// A [`CursorPager`] reading pages through a [`SpannerClient`]
///
/// The staleness of a request becomes a max-staleness bound on the read.
#[derive(Debug)]
pub struct SpannerCursorPager<C> {
    client: C,
    dialect: Arc<dyn Dialect>,
}

impl<C: SpannerClient> SpannerCursorPager<C> {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DialectMismatch`] if the dialect doesn't
    /// write through native mutations
    pub fn new(client: C, dialect: Arc<dyn Dialect>) -> Result<Self, ConfigurationError> {
        ensure_mutation_dialect(dialect.as_ref())?;
        Ok(Self { client, dialect })
    }
}

#[async_trait]
impl<R: Record, C: SpannerClient> CursorPager<R> for SpannerCursorPager<C> {
    #[tracing::instrument(
        name = "db.cursor_pager.fetch",
        skip_all,
        fields(
            db.query.text,
            db.system.name = "gcp.spanner",
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
        Span::current().record("db.query.text", statement.sql.as_str());

        let rows = self
            .client
            .query(statement, TimestampBound::from_staleness(request.staleness))
            .await?;

        let page = rows
            .into_iter()
            .map(R::from_values)
            .collect::<Result<Vec<R>, _>>()?;

        Ok(page)
    }
}
