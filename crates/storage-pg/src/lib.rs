// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! A PostgreSQL and CockroachDB backend for the maintenance engine
//!
//! Both engines speak the same wire protocol and accept the same batched
//! statements, binding one array per column. They only differ in how stale
//! reads are spelled, which the [`Dialect`] takes care of.
//!
//! Pages are read with a [`PgCursorPager`] and batches are applied with a
//! [`PgBatchMutator`], both on top of a shared [`sqlx::PgPool`].
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use sweep_storage::dialect;
//! use sweep_storage_pg::{MIGRATOR, PgBatchMutator, PgCursorPager};
//!
//! let pool = sqlx::PgPool::connect("postgres://localhost/console").await?;
//! MIGRATOR.run(&pool).await?;
//!
//! let dialect = dialect::from_name("cockroach")?;
//! let pager = PgCursorPager::new(pool.clone(), Arc::clone(&dialect))?;
//! let mutator = PgBatchMutator::new(pool, dialect)?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::future_not_send)]

use sqlx::migrate::Migrator;
use sweep_storage::{ConfigurationError, Dialect, dialect::WriteStrategy};

mod binding;
mod credentials;
mod errors;
mod mutator;
mod pager;
mod schema;
mod telemetry;
mod tracing;

pub use self::{
    credentials::PgCredentialLookup, errors::DatabaseError, mutator::PgBatchMutator,
    pager::PgCursorPager,
    schema::{SchemaDrift, check_schema, engine_from_version, server_engine},
};

/// Embedded migrations, allowing them to run on startup
pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Check that a dialect can be used with this backend
fn ensure_array_dialect(dialect: &dyn Dialect) -> Result<(), ConfigurationError> {
    if dialect.write_strategy() == WriteStrategy::ArrayStatement {
        Ok(())
    } else {
        Err(ConfigurationError::DialectMismatch {
            backend: "postgres",
            dialect: dialect.kind(),
        })
    }
}
