// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{collections::HashMap, num::NonZeroUsize};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram},
};
use sweep_data_model::{ApiKeyUsage, Ulid};
use sweep_storage::{BatchMutator, BatchWrite, StorageError};
use tokio_util::sync::CancellationToken;

use super::Message;
use crate::{METER, RESULT, TYPE};

/// Handles writing usage records to the database.
pub(super) struct Worker<M> {
    mutator: M,
    max_pending: NonZeroUsize,
    pending_records: HashMap<Ulid, ApiKeyUsage>,
    message_counter: Counter<u64>,
    flush_time_histogram: Histogram<u64>,
}

impl<M: BatchMutator<ApiKeyUsage>> Worker<M> {
    pub(super) fn new(mutator: M, max_pending: NonZeroUsize) -> Self {
        let message_counter = METER
            .u64_counter("sweep.usage_recorder.messages")
            .with_description("The number of messages received by the usage recorder")
            .with_unit("{messages}")
            .build();

        // Record stuff on the counter so that the metrics are initialized
        for kind in ["record", "flush", "dropped"] {
            message_counter.add(0, &[KeyValue::new(TYPE, kind)]);
        }

        let flush_time_histogram = METER
            .u64_histogram("sweep.usage_recorder.flush_time")
            .with_description("The time it took to flush the usage recorder")
            .with_unit("ms")
            .build();

        Self {
            mutator,
            max_pending,
            pending_records: HashMap::with_capacity(max_pending.get()),
            message_counter,
            flush_time_histogram,
        }
    }

    pub(super) async fn run(
        mut self,
        mut receiver: tokio::sync::mpsc::Receiver<Message>,
        cancellation_token: CancellationToken,
    ) {
        let _guard = cancellation_token.clone().drop_guard();

        loop {
            let message = tokio::select! {
                () = cancellation_token.cancelled(), if !receiver.is_closed() => {
                    // Closing the channel lets us drain the messages already sent
                    receiver.close();
                    tracing::debug!("Shutting down usage recorder");
                    continue;
                },

                message = receiver.recv() => {
                    let Some(message) = message else { break };
                    message
                }
            };

            match message {
                Message::Record {
                    api_key_id,
                    project_id,
                    date_time,
                } => {
                    let is_new = !self.pending_records.contains_key(&api_key_id);
                    if is_new && self.pending_records.len() >= self.max_pending.get() {
                        tracing::debug!("Too many pending usage records, flushing");
                        self.flush().await;
                    }

                    if is_new && self.pending_records.len() >= self.max_pending.get() {
                        self.message_counter
                            .add(1, &[KeyValue::new(TYPE, "dropped")]);
                        tracing::error!(
                            %api_key_id,
                            %date_time,
                            "Still too many pending usage records, dropping"
                        );
                        continue;
                    }

                    self.message_counter.add(1, &[KeyValue::new(TYPE, "record")]);

                    let record = self
                        .pending_records
                        .entry(api_key_id)
                        .or_insert_with(|| ApiKeyUsage::new(api_key_id, project_id, date_time));

                    record.first_used_at = date_time.min(record.first_used_at);
                    record.last_used_at = date_time.max(record.last_used_at);
                }

                Message::Flush(tx) => {
                    self.message_counter.add(1, &[KeyValue::new(TYPE, "flush")]);

                    self.flush().await;
                    let _ = tx.send(());
                }
            }
        }

        // Flush one last time
        self.flush().await;
    }

    async fn flush(&mut self) {
        if self.pending_records.is_empty() {
            return;
        }

        let start = std::time::Instant::now();
        let res = self.try_flush().await;

        let duration = start.elapsed();
        let duration_ms = duration.as_millis().try_into().unwrap_or(u64::MAX);

        match res {
            Ok(()) => {
                self.flush_time_histogram
                    .record(duration_ms, &[KeyValue::new(RESULT, "success")]);
            }
            Err(e) => {
                self.flush_time_histogram
                    .record(duration_ms, &[KeyValue::new(RESULT, "failure")]);
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    "Failed to flush API key usage"
                );
            }
        }
    }

    /// Fallible part of [`Self::flush`]. The pending records are only cleared
    /// once they are written.
    #[tracing::instrument(name = "usage_recorder.flush", skip(self))]
    async fn try_flush(&mut self) -> Result<(), StorageError> {
        let mut records: Vec<ApiKeyUsage> = self.pending_records.values().cloned().collect();
        records.sort_by_key(|record| record.api_key_id);

        tracing::info!("Flushing {} API key usage records", records.len());

        self.mutator
            .apply(BatchWrite::UpsertOverwrite(records))
            .await?;
        self.pending_records.clear();

        Ok(())
    }
}
