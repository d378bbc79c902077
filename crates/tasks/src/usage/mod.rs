// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Records when API keys are used
//!
//! Observations are sent to a background worker, which collapses them per
//! API key and periodically writes them as a single upsert batch into the
//! `api_key_usage` table.

mod worker;

use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use sweep_data_model::{ApiKey, ApiKeyUsage, Clock, Ulid};
use sweep_storage::BatchMutator;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use self::worker::Worker;

static MESSAGE_QUEUE_SIZE: usize = 1000;

enum Message {
    Record {
        api_key_id: Ulid,
        project_id: Ulid,
        date_time: DateTime<Utc>,
    },
    Flush(tokio::sync::oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct UsageRecorder {
    channel: tokio::sync::mpsc::Sender<Message>,
}

impl UsageRecorder {
    /// Create a new usage recorder
    ///
    /// It spawns the background worker and a loop flushing it every
    /// `flush_interval` on the task tracker. The worker also flushes on its
    /// own once `max_pending` API keys are waiting. Both shut themselves
    /// down when the cancellation token is cancelled, flushing one last time.
    #[must_use]
    pub fn new<M>(
        mutator: M,
        max_pending: NonZeroUsize,
        flush_interval: std::time::Duration,
        task_tracker: &TaskTracker,
        cancellation_token: CancellationToken,
    ) -> Self
    where
        M: BatchMutator<ApiKeyUsage> + 'static,
    {
        let worker = Worker::new(mutator, max_pending);
        let (sender, receiver) = tokio::sync::mpsc::channel(MESSAGE_QUEUE_SIZE);
        let recorder = UsageRecorder { channel: sender };

        task_tracker.spawn(
            recorder
                .clone()
                .flush_loop(flush_interval, cancellation_token.clone()),
        );
        task_tracker.spawn(worker.run(receiver, cancellation_token));

        recorder
    }

    /// Record that an API key was just used
    pub async fn record(&self, clock: &dyn Clock, api_key: &ApiKey) {
        let res = self
            .channel
            .send(Message::Record {
                api_key_id: api_key.id,
                project_id: api_key.project_id,
                date_time: clock.now(),
            })
            .await;

        if let Err(e) = res {
            tracing::error!("Failed to record API key usage: {}", e);
        }
    }

    /// Manually flush the recorder, waiting for the write to finish
    pub async fn flush(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let res = self.channel.send(Message::Flush(tx)).await;

        match res {
            Ok(()) => {
                if let Err(e) = rx.await {
                    tracing::error!(
                        error = &e as &dyn std::error::Error,
                        "Failed to flush API key usage"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    "Failed to flush API key usage"
                );
            }
        }
    }

    async fn flush_loop(
        self,
        interval: std::time::Duration,
        cancellation_token: CancellationToken,
    ) {
        let _guard = cancellation_token.clone().drop_guard();
        let start = tokio::time::Instant::now() + interval;
        let mut interval = tokio::time::interval_at(start, interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = cancellation_token.cancelled() => {
                    return;
                }

                () = self.channel.closed() => {
                    return;
                }

                _ = interval.tick() => {
                    self.flush().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;
    use sweep_data_model::MockClock;
    use sweep_storage::{WriteKind, memory::MemoryTable};

    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn recorder(
        table: &MemoryTable<ApiKeyUsage>,
        max_pending: usize,
        task_tracker: &TaskTracker,
        cancellation_token: &CancellationToken,
    ) -> UsageRecorder {
        UsageRecorder::new(
            table.clone(),
            NonZeroUsize::new(max_pending).unwrap(),
            HOUR,
            task_tracker,
            cancellation_token.clone(),
        )
    }

    #[tokio::test]
    async fn test_observations_collapse_per_key() {
        let clock = MockClock::default();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let keys = ApiKey::samples(clock.now(), &mut rng);
        let table = MemoryTable::default();
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();
        let recorder = recorder(&table, 100, &task_tracker, &cancellation_token);

        let first_use = clock.now();
        recorder.record(&clock, &keys[0]).await;
        clock.advance(chrono::Duration::minutes(1));
        recorder.record(&clock, &keys[1]).await;
        clock.advance(chrono::Duration::minutes(1));
        recorder.record(&clock, &keys[0]).await;
        recorder.flush().await;

        let rows = table.rows().await;
        assert_eq!(rows.len(), 2);
        let usage = rows.iter().find(|row| row.api_key_id == keys[0].id).unwrap();
        assert_eq!(usage.project_id, keys[0].project_id);
        assert_eq!(usage.first_used_at, first_use);
        assert_eq!(usage.last_used_at, clock.now());

        // One batch, without duplicate keys
        let writes = table.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].kind, WriteKind::UpsertOverwrite);
        assert_eq!(writes[0].keys.len(), 2);

        // Nothing left to flush
        recorder.flush().await;
        assert_eq!(table.writes().await.len(), 1);

        // Later flushes only move the last use
        clock.advance(chrono::Duration::minutes(1));
        recorder.record(&clock, &keys[0]).await;
        recorder.flush().await;
        let rows = table.rows().await;
        let usage = rows.iter().find(|row| row.api_key_id == keys[0].id).unwrap();
        assert_eq!(usage.first_used_at, first_use);
        assert_eq!(usage.last_used_at, clock.now());

        cancellation_token.cancel();
        task_tracker.close();
        task_tracker.wait().await;
    }

    #[tokio::test]
    async fn test_flushes_when_too_many_keys_are_pending() {
        let clock = MockClock::default();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let keys: Vec<ApiKey> = (0..3)
            .flat_map(|_| ApiKey::samples(clock.now(), &mut rng))
            .collect();
        let table = MemoryTable::default();
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();
        let recorder = recorder(&table, 4, &task_tracker, &cancellation_token);

        for key in &keys {
            recorder.record(&clock, key).await;
        }
        // Wait for the worker to have handled all the records
        recorder.flush().await;

        let writes = table.writes().await;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].keys.len(), 4);
        assert_eq!(writes[1].keys.len(), 2);
        assert_eq!(table.rows().await.len(), 6);

        cancellation_token.cancel();
        task_tracker.close();
        task_tracker.wait().await;
    }

    #[tokio::test]
    async fn test_pending_records_survive_a_failed_flush() {
        let clock = MockClock::default();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let keys = ApiKey::samples(clock.now(), &mut rng);
        let table = MemoryTable::default();
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();
        let recorder = recorder(&table, 100, &task_tracker, &cancellation_token);

        recorder.record(&clock, &keys[0]).await;
        table.fail_next_write().await;
        recorder.flush().await;
        assert!(table.rows().await.is_empty());

        recorder.flush().await;
        assert_eq!(table.rows().await.len(), 1);

        cancellation_token.cancel();
        task_tracker.close();
        task_tracker.wait().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_records() {
        let clock = MockClock::default();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let keys = ApiKey::samples(clock.now(), &mut rng);
        let table = MemoryTable::default();
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();
        let recorder = recorder(&table, 100, &task_tracker, &cancellation_token);

        recorder.record(&clock, &keys[0]).await;
        recorder.record(&clock, &keys[1]).await;
        drop(recorder);

        cancellation_token.cancel();
        task_tracker.close();
        task_tracker.wait().await;

        assert_eq!(table.rows().await.len(), 2);
    }
}
