// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{num::NonZeroUsize, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use figment::Figment;
use sweep_config::{ConfigurationSection, RootConfig};
use sweep_data_model::{Clock, SystemClock};
use sweep_storage::{CredentialCache, CredentialError};
use sweep_storage_pg::{PgBatchMutator, PgCredentialLookup};
use sweep_tasks::UsageRecorder;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, info_span, warn};

use crate::util::database_pool_from_config;

#[derive(Parser, Debug)]
pub(super) struct Options {
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Parser, Debug)]
enum Subcommand {
    /// Look up an API key by its head, through the lookup cache
    LookupKey {
        /// The head of the API key, hex-encoded
        head: String,

        /// How many times to look it up
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Record the usage of the key
        #[arg(long)]
        record: bool,
    },
}

impl Options {
    #[tracing::instrument(skip_all)]
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        use Subcommand as SC;
        match self.subcommand {
            SC::LookupKey {
                head,
                repeat,
                record,
            } => {
                let _span = info_span!("cli.debug.lookup_key").entered();
                let head = hex::decode(&head).context("the API key head must be hex-encoded")?;
                let config = RootConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;
                let (pool, dialect) = database_pool_from_config(&config.database).await?;

                let clock: Arc<dyn Clock> = Arc::new(SystemClock::default());
                let capacity = NonZeroUsize::new(config.cache.capacity)
                    .context("the cache capacity must be positive")?;
                let ttl = chrono::Duration::from_std(config.cache.ttl)
                    .context("the cache TTL is too large")?;
                let cache = CredentialCache::new(
                    PgCredentialLookup::new(pool.clone(), Arc::clone(&dialect))?,
                    Arc::clone(&clock),
                    ttl,
                    capacity,
                );

                let cancellation_token = CancellationToken::new();
                let task_tracker = TaskTracker::new();
                let recorder = if record {
                    Some(UsageRecorder::new(
                        PgBatchMutator::new(pool.clone(), Arc::clone(&dialect))?,
                        NonZeroUsize::MIN,
                        Duration::from_secs(60),
                        &task_tracker,
                        cancellation_token.clone(),
                    ))
                } else {
                    None
                };

                for _ in 0..repeat {
                    match cache.get_by_head(&head).await {
                        Ok(api_key) => {
                            info!(api_key.id = %api_key.id, api_key.name = %api_key.name, "Found API key");
                            if let Some(recorder) = &recorder {
                                recorder.record(clock.as_ref(), &api_key).await;
                            }
                        }
                        Err(CredentialError::NotFound) => {
                            warn!("No API key with this head");
                            return Ok(ExitCode::FAILURE);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }

                cancellation_token.cancel();
                task_tracker.close();
                task_tracker.wait().await;
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}
