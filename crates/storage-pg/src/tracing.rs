// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use opentelemetry_semantic_conventions::attribute::DB_QUERY_TEXT;
use sqlx::Postgres;
use sweep_storage::DialectKind;
use tracing::Span;

/// The `db.system.name` of the engines this crate talks to
pub(crate) fn system_name(dialect: DialectKind) -> &'static str {
    match dialect {
        DialectKind::Cockroach => "cockroachdb",
        DialectKind::Postgres | DialectKind::Spanner => "postgresql",
    }
}

/// An extension trait for [`sqlx::Execute`] that records a rendered
/// maintenance statement in the current tracing span
pub(crate) trait ExecuteExt<'q>: Sized {
    /// Records the statement as `db.query.text`, and the engine it runs on as
    /// `db.system.name`
    #[must_use]
    fn traced(self, dialect: DialectKind) -> Self;
}

impl<'q, T> ExecuteExt<'q> for T
where
    T: sqlx::Execute<'q, Postgres>,
{
    fn traced(self, dialect: DialectKind) -> Self {
        let span = Span::current();
        span.record(DB_QUERY_TEXT, self.sql());
        span.record("db.system.name", system_name(dialect));
        self
    }
}
