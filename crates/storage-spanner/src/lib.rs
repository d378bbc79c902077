// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! A Spanner backend for the maintenance engine
//!
//! Spanner doesn't bind arrays into a single upsert statement like the
//! PostgreSQL-compatible engines do. Writes go through its native mutation
//! API instead, and stale reads are expressed as a timestamp bound on the
//! read rather than in the SQL.
//!
//! This crate doesn't talk to Spanner itself: the connection is provided by
//! the caller through the [`SpannerClient`] trait.

#![deny(clippy::future_not_send)]

use sweep_storage::{ConfigurationError, Dialect, dialect::WriteStrategy};

mod client;
mod error;
mod mutator;
mod pager;

pub use self::{
    client::{Mutation, RequestOptions, SpannerClient, TimestampBound},
    error::{Code, SpannerError},
    mutator::SpannerBatchMutator,
    pager::SpannerCursorPager,
};

fn ensure_mutation_dialect(dialect: &dyn Dialect) -> Result<(), ConfigurationError> {
    if dialect.write_strategy() == WriteStrategy::Mutations {
        Ok(())
    } else {
        Err(ConfigurationError::DialectMismatch {
            backend: "spanner",
            dialect: dialect.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        num::NonZeroUsize,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;
    use sweep_data_model::{
        ApiKeyUsage, Clock, MockClock, Record, Ulid, Value, WebappSession,
    };
    use sweep_storage::{
        BatchMutator, BatchWrite, CursorPager, DialectKind, MaintenanceError, MaintenanceTarget,
        PageRequest, Phase, ScanFilter, StorageError, dialect, maintenance,
        statement::{Param, Statement},
    };
    use tokio_util::sync::CancellationToken;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Query(Statement, TimestampBound),
        ExecuteUpdate(Statement, RequestOptions),
        Apply(Vec<Mutation>, RequestOptions),
    }

    /// A client replaying canned query results, and recording every call
    #[derive(Debug, Default)]
    struct RecordingClient {
        results: Mutex<VecDeque<Result<Vec<Vec<Value>>, SpannerError>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingClient {
        fn with_results(results: impl IntoIterator<Item = Vec<Vec<Value>>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into_iter().map(Ok).collect()),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpannerClient for RecordingClient {
        async fn query(
            &self,
            statement: Statement,
            bound: TimestampBound,
        ) -> Result<Vec<Vec<Value>>, SpannerError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Query(statement, bound));
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Vec::new()))
        }

        async fn execute_update(
            &self,
            statement: Statement,
            options: RequestOptions,
        ) -> Result<u64, SpannerError> {
            let Param::Array(_, keys) = &statement.params[0] else {
                panic!("expected the keys as an array");
            };
            let affected = keys.len() as u64;
            self.calls
                .lock()
                .unwrap()
                .push(Call::ExecuteUpdate(statement, options));
            Ok(affected)
        }

        async fn apply(
            &self,
            mutations: Vec<Mutation>,
            options: RequestOptions,
        ) -> Result<(), SpannerError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Apply(mutations, options));
            Ok(())
        }
    }

    fn spanner() -> Arc<dyn Dialect> {
        dialect::for_kind(DialectKind::Spanner)
    }

    #[test]
    fn test_array_dialects_are_rejected() {
        let client = RecordingClient::with_results([]);
        for kind in [DialectKind::Postgres, DialectKind::Cockroach] {
            assert_matches!(
                SpannerCursorPager::new(Arc::clone(&client), dialect::for_kind(kind)),
                Err(ConfigurationError::DialectMismatch {
                    backend: "spanner",
                    ..
                })
            );
            assert_matches!(
                SpannerBatchMutator::new(Arc::clone(&client), dialect::for_kind(kind)),
                Err(ConfigurationError::DialectMismatch { .. })
            );
        }
    }

    #[test]
    fn test_timestamp_bound() {
        assert_eq!(TimestampBound::from_staleness(None), TimestampBound::Strong);
        assert_eq!(
            TimestampBound::from_staleness(Some(Duration::ZERO)),
            TimestampBound::Strong
        );
        assert_eq!(
            TimestampBound::from_staleness(Some(Duration::from_secs(15))),
            TimestampBound::MaxStaleness(Duration::from_secs(15))
        );
    }

    #[tokio::test]
    async fn test_fetch_uses_a_stale_read() {
        let clock = MockClock::default();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let sessions = WebappSession::samples(clock.now(), &mut rng);
        let client =
            RecordingClient::with_results([sessions.iter().map(Record::to_values).collect()]);
        let pager = SpannerCursorPager::new(Arc::clone(&client), spanner()).unwrap();

        let filter = ScanFilter::all().lt("expires_at", clock.now());
        let page: Vec<WebappSession> = pager
            .fetch(PageRequest {
                after: Ulid::default(),
                limit: NonZeroUsize::new(100).unwrap(),
                filter: &filter,
                staleness: Some(Duration::from_secs(10)),
            })
            .await
            .unwrap();
        assert_eq!(page, sessions);

        let calls = client.calls();
        let [Call::Query(statement, bound)] = calls.as_slice() else {
            panic!("expected a single query, got {calls:?}");
        };
        assert_eq!(
            statement.sql,
            "SELECT id, user_id, ip_address, user_agent, expires_at FROM webapp_sessions \
             WHERE id > @p1 AND expires_at < @p2 ORDER BY id LIMIT @p3"
        );
        assert_eq!(
            statement.params,
            vec![
                Param::Scalar(Ulid::default().into()),
                Param::Scalar(clock.now().into()),
                Param::Scalar(Value::BigInt(100)),
            ]
        );
        assert_eq!(
            *bound,
            TimestampBound::MaxStaleness(Duration::from_secs(10))
        );
    }

    #[tokio::test]
    async fn test_inconsistent_rows_are_reported() {
        let client = RecordingClient::with_results([vec![vec![Value::BigInt(1)]]]);
        let pager = SpannerCursorPager::new(client, spanner()).unwrap();

        let result: Result<Vec<WebappSession>, _> = pager
            .fetch(PageRequest {
                after: Ulid::default(),
                limit: NonZeroUsize::new(10).unwrap(),
                filter: &ScanFilter::all(),
                staleness: None,
            })
            .await;
        assert_matches!(result, Err(StorageError::Inconsistency(_)));
    }

    #[tokio::test]
    async fn test_delete_is_one_tagged_statement() {
        let client = RecordingClient::with_results([]);
        let mutator = SpannerBatchMutator::new(Arc::clone(&client), spanner()).unwrap();

        let affected = BatchMutator::<WebappSession>::apply(
            &mutator,
            BatchWrite::Delete(vec![Ulid(1), Ulid(2)]),
        )
        .await
        .unwrap();
        assert_eq!(affected, 2);

        let calls = client.calls();
        let [Call::ExecuteUpdate(statement, options)] = calls.as_slice() else {
            panic!("expected a single DML statement, got {calls:?}");
        };
        assert_eq!(
            statement.sql,
            "DELETE FROM webapp_sessions WHERE id IN UNNEST(@p1)"
        );
        assert_eq!(options.transaction_tag, "sweep-webapp_sessions-delete");
    }

    #[tokio::test]
    async fn test_empty_batches_do_nothing() {
        let client = RecordingClient::with_results([]);
        let mutator = SpannerBatchMutator::new(Arc::clone(&client), spanner()).unwrap();

        let affected = BatchMutator::<ApiKeyUsage>::apply(&mutator, BatchWrite::Delete(vec![]))
            .await
            .unwrap();
        assert_eq!(affected, 0);
        let affected = mutator
            .apply(BatchWrite::<ApiKeyUsage>::UpsertOverwrite(vec![]))
            .await
            .unwrap();
        assert_eq!(affected, 0);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_is_a_single_commit() {
        let clock = MockClock::default();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let project = Ulid::from_datetime_with_source(clock.now().into(), &mut rng);
        let a = Ulid::from_datetime_with_source(clock.now().into(), &mut rng);
        let b = Ulid::from_datetime_with_source(clock.now().into(), &mut rng);

        let client = Arc::new(RecordingClient::default());
        let mutator = SpannerBatchMutator::new(Arc::clone(&client), spanner()).unwrap();

        let first_b = ApiKeyUsage::new(b, project, clock.now());
        clock.advance(chrono::Duration::minutes(5));
        let new_a = ApiKeyUsage::new(a, project, clock.now());
        let last_b = ApiKeyUsage::new(b, project, clock.now());

        let affected = mutator
            .apply(BatchWrite::UpsertOverwrite(vec![
                first_b.clone(),
                new_a.clone(),
                last_b.clone(),
            ]))
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let calls = client.calls();
        let [Call::Apply(mutations, options)] = calls.as_slice() else {
            panic!("expected a single commit, got {calls:?}");
        };
        assert_eq!(options.transaction_tag, "sweep-api_key_usage-upsert");

        // The two rows of `b` collapse, keeping the first use of the first one
        let expected_b = ApiKeyUsage {
            first_used_at: first_b.first_used_at,
            ..last_b
        };
        let columns = vec!["api_key_id", "project_id", "first_used_at", "last_used_at"];
        assert_eq!(
            mutations,
            &vec![
                Mutation::InsertOrUpdate {
                    table: "api_key_usage",
                    columns: columns.clone(),
                    values: expected_b.to_values(),
                },
                Mutation::InsertOrUpdate {
                    table: "api_key_usage",
                    columns,
                    values: new_a.to_values(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_maintenance_run() {
        let clock = MockClock::default();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let mut sessions: Vec<WebappSession> = (0..2)
            .flat_map(|_| WebappSession::samples(clock.now(), &mut rng))
            .collect();
        sessions.sort_by_key(|session| session.id);

        let client = RecordingClient::with_results([
            sessions[..3].iter().map(Record::to_values).collect(),
            sessions[3..].iter().map(Record::to_values).collect(),
        ]);
        let pager = SpannerCursorPager::new(Arc::clone(&client), spanner()).unwrap();
        let mutator = SpannerBatchMutator::new(Arc::clone(&client), spanner()).unwrap();

        let target = MaintenanceTarget::delete("expired-sessions", 3, |s: &WebappSession, now| {
            s.is_expired(now)
        })
        .unwrap();
        let report = maintenance::run(
            &target,
            &pager,
            &mutator,
            &clock,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.scanned, 4);
        assert_eq!(report.mutated, 2);
        assert_eq!(report.cursor, sessions[3].id);
    }

    #[tokio::test]
    async fn test_failed_reads_abort_the_run() {
        let client = Arc::new(RecordingClient::default());
        client
            .results
            .lock()
            .unwrap()
            .push_back(Err(SpannerError::status(Code::Unavailable, "try again")));
        let pager = SpannerCursorPager::new(Arc::clone(&client), spanner()).unwrap();
        let mutator = SpannerBatchMutator::new(Arc::clone(&client), spanner()).unwrap();

        let target =
            MaintenanceTarget::delete("expired-sessions", 10, |_: &WebappSession, _| true)
                .unwrap();
        let error = maintenance::run(
            &target,
            &pager,
            &mutator,
            &MockClock::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(error.phase(), Phase::Fetch);
        assert_matches!(
            error,
            MaintenanceError::Fetch {
                source: StorageError::Backend(_),
                ..
            }
        );
        assert_eq!(client.calls().len(), 1);
    }
}
