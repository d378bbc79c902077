// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{
    ConnectOptions, PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use sweep_config::{DatabaseConfig, MaintenanceConfig};
use sweep_storage::{ConfigurationError, Dialect, DialectKind, dialect};
use sweep_storage_pg::{PgBatchMutator, PgCursorPager};
use sweep_tasks::{
    MaintenanceJob, TargetJob,
    cleanup::{expired_api_keys, expired_webapp_sessions, unverified_users},
};
use tracing::log::LevelFilter;

const EXPIRED_API_KEYS: &str = "expired-api-keys";
const EXPIRED_WEBAPP_SESSIONS: &str = "expired-webapp-sessions";
const UNVERIFIED_USERS: &str = "unverified-users";

/// Get the dialect to use from the configuration
///
/// The Spanner dialect needs a client which this binary doesn't provide, so
/// it is rejected here, before trying to connect.
pub fn dialect_from_config(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn Dialect>> {
    let dialect = dialect::from_name(config.dialect.as_str())?;

    if dialect.kind() == DialectKind::Spanner {
        return Err(ConfigurationError::DialectMismatch {
            backend: "postgres",
            dialect: dialect.kind(),
        })
        .context("the spanner dialect is only available to library users");
    }

    Ok(dialect)
}

fn database_connect_options_from_config(
    config: &DatabaseConfig,
) -> Result<PgConnectOptions, anyhow::Error> {
    let uri = config
        .uri
        .as_deref()
        .context("no database connection string configured")?;
    let options: PgConnectOptions = uri
        .parse()
        .context("could not parse database connection string")?;

    let options = options
        .application_name("sweep")
        .log_statements(LevelFilter::Debug)
        .log_slow_statements(LevelFilter::Warn, Duration::from_millis(100));

    Ok(options)
}

/// Create a database connection pool from the configuration, along with the
/// dialect it speaks
#[tracing::instrument(name = "db.connect", skip_all, fields(db.system.name = config.dialect.as_str()))]
pub async fn database_pool_from_config(
    config: &DatabaseConfig,
) -> Result<(PgPool, Arc<dyn Dialect>), anyhow::Error> {
    let dialect = dialect_from_config(config)?;
    let options = database_connect_options_from_config(config)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.into())
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect_with(options)
        .await
        .context("could not connect to the database")?;

    Ok((pool, dialect))
}

/// Names of the maintenance targets enabled in the configuration
pub fn maintenance_targets_from_config(config: &MaintenanceConfig) -> Vec<&'static str> {
    let mut targets = Vec::new();
    if config.api_keys.enabled {
        targets.push(EXPIRED_API_KEYS);
    }
    if config.webapp_sessions.enabled {
        targets.push(EXPIRED_WEBAPP_SESSIONS);
    }
    if config.users.enabled {
        targets.push(UNVERIFIED_USERS);
    }
    targets
}

/// Build the maintenance jobs enabled in the configuration
///
/// If `only` is not empty, only the jobs with those names are kept, and
/// unknown or disabled names are an error.
pub fn maintenance_jobs_from_config(
    config: &MaintenanceConfig,
    only: &[String],
    pool: &PgPool,
    dialect: &Arc<dyn Dialect>,
) -> anyhow::Result<Vec<Arc<dyn MaintenanceJob>>> {
    let enabled = maintenance_targets_from_config(config);
    if let Some(unknown) = only
        .iter()
        .find(|name| !enabled.contains(&name.as_str()))
    {
        anyhow::bail!(
            "unknown or disabled maintenance target {unknown:?}, expected one of {enabled:?}"
        );
    }

    let page_size = config.page_size;
    let mut jobs: Vec<Arc<dyn MaintenanceJob>> = Vec::new();

    if config.api_keys.enabled {
        let name_prefix = config.api_keys.name_prefix.clone();
        let lifetime = config.api_keys.lifetime;
        jobs.push(Arc::new(
            TargetJob::new(
                EXPIRED_API_KEYS,
                PgCursorPager::new(pool.clone(), Arc::clone(dialect))?,
                PgBatchMutator::new(pool.clone(), Arc::clone(dialect))?,
                move |now| expired_api_keys(&name_prefix, lifetime, page_size, now),
            )
            .with_staleness(config.staleness),
        ));
    }

    if config.webapp_sessions.enabled {
        jobs.push(Arc::new(
            TargetJob::new(
                EXPIRED_WEBAPP_SESSIONS,
                PgCursorPager::new(pool.clone(), Arc::clone(dialect))?,
                PgBatchMutator::new(pool.clone(), Arc::clone(dialect))?,
                move |now| expired_webapp_sessions(page_size, now),
            )
            .with_staleness(config.staleness),
        ));
    }

    if config.users.enabled {
        let ttl = config.users.unverified_ttl;
        jobs.push(Arc::new(
            TargetJob::new(
                UNVERIFIED_USERS,
                PgCursorPager::new(pool.clone(), Arc::clone(dialect))?,
                PgBatchMutator::new(pool.clone(), Arc::clone(dialect))?,
                move |now| unverified_users(ttl, page_size, now),
            )
            .with_staleness(config.staleness),
        ));
    }

    jobs.retain(|job| only.is_empty() || only.iter().any(|name| name == job.name()));

    Ok(jobs)
}
