// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use figment::Figment;
use sweep_config::{ConfigurationSectionExt, DatabaseConfig};
use sweep_data_model::{API_KEY_USAGE, API_KEYS, TableSchema, USERS, WEBAPP_SESSIONS};
use sweep_storage_pg::{MIGRATOR, check_schema, server_engine};
use tracing::{Instrument, error, info, info_span, warn};

use crate::util::database_pool_from_config;

/// The tables the maintenance jobs and the usage recorder touch
static MAINTAINED_TABLES: [&TableSchema; 4] =
    [&API_KEYS, &API_KEY_USAGE, &WEBAPP_SESSIONS, &USERS];

#[derive(Parser, Debug)]
pub(super) struct Options {
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Parser, Debug)]
enum Subcommand {
    /// Run database migrations
    Migrate,

    /// Check that the server and its tables match what the maintenance jobs
    /// expect
    Check,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        use Subcommand as SC;
        let config =
            DatabaseConfig::extract_or_default(figment).map_err(anyhow::Error::from_boxed)?;
        let (pool, dialect) = database_pool_from_config(&config).await?;

        match self.subcommand {
            SC::Migrate => {
                let _span = info_span!("cli.database.migrate").entered();

                MIGRATOR
                    .run(&pool)
                    .instrument(info_span!("db.migrate"))
                    .await
                    .context("could not run migrations")?;

                Ok(ExitCode::SUCCESS)
            }

            SC::Check => {
                let _span = info_span!("cli.database.check").entered();
                let mut healthy = true;

                let engine = server_engine(&pool)
                    .await
                    .context("could not query the server version")?;
                if engine == dialect.kind() {
                    info!(%engine, "Server engine matches the configured dialect");
                } else {
                    warn!(
                        %engine,
                        dialect = %dialect.kind(),
                        "Server engine does not match the configured dialect"
                    );
                    healthy = false;
                }

                for schema in MAINTAINED_TABLES {
                    let drifts = check_schema(&pool, schema)
                        .await
                        .with_context(|| format!("could not inspect table {:?}", schema.table))?;

                    if drifts.is_empty() {
                        info!(table = schema.table, "Table matches");
                    }
                    for drift in drifts {
                        error!(table = schema.table, "{drift}");
                        healthy = false;
                    }
                }

                if healthy {
                    Ok(ExitCode::SUCCESS)
                } else {
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
