// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use figment::Figment;
use sweep_config::{ConfigurationSection, RootConfig};
use sweep_data_model::{Clock, SystemClock};
use tracing::{info, info_span};

use crate::{
    shutdown::ShutdownManager,
    util::{database_pool_from_config, maintenance_jobs_from_config},
};

#[derive(Parser, Debug, Default)]
pub(super) struct Options {}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let shutdown = ShutdownManager::new()?;
        let span = info_span!("cli.worker.init").entered();
        let config = RootConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;

        // Connect to the database
        info!("Connecting to the database");
        let (pool, dialect) = database_pool_from_config(&config.database).await?;
        let jobs = maintenance_jobs_from_config(&config.maintenance, &[], &pool, &dialect)?;
        let interval = config.maintenance.interval;
        drop(config);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::default());

        info!(
            jobs = jobs.len(),
            interval_secs = interval.as_secs(),
            "Starting maintenance worker"
        );
        shutdown
            .task_tracker()
            .spawn(sweep_tasks::runner::run_periodically(
                jobs,
                clock,
                interval,
                shutdown.shutdown_token(),
                shutdown.task_tracker().clone(),
            ));
        span.exit();

        shutdown.run().await;

        Ok(ExitCode::SUCCESS)
    }
}
