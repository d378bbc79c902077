// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use figment::Figment;
use sweep_config::{ConfigurationSection, RootConfig};
use sweep_data_model::{Clock, SystemClock};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, info_span, warn};

use crate::util::{database_pool_from_config, maintenance_jobs_from_config};

#[derive(Parser, Debug)]
pub(super) struct Options {
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Parser, Debug)]
enum Subcommand {
    /// Run the maintenance jobs once, concurrently
    Run {
        /// Only run the job with this name. Can be repeated. Defaults to all
        /// the enabled jobs.
        #[arg(long = "target", action = clap::ArgAction::Append)]
        targets: Vec<String>,
    },
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let Subcommand::Run { targets } = self.subcommand;
        let span = info_span!("cli.maintenance.run").entered();

        let config = RootConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;

        info!("Connecting to the database");
        let (pool, dialect) = database_pool_from_config(&config.database).await?;
        let jobs = maintenance_jobs_from_config(&config.maintenance, &targets, &pool, &dialect)?;
        span.exit();

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::default());
        let cancellation_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        // Stop between two pages on Ctrl-C
        let stop = cancellation_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current pages");
                stop.cancel();
            }
        });

        let outcomes =
            sweep_tasks::runner::run_all(&jobs, &clock, &cancellation_token, &task_tracker).await;
        task_tracker.close();
        task_tracker.wait().await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            warn!(failed, total = outcomes.len(), "Some maintenance jobs failed");
            return Ok(ExitCode::FAILURE);
        }

        info!(total = outcomes.len(), "All maintenance jobs finished");
        Ok(ExitCode::SUCCESS)
    }
}
