// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Running maintenance jobs, once or periodically

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sweep_data_model::{Clock, Record};
use sweep_storage::{
    BatchMutator, ConfigurationError, CursorPager, MaintenanceError, MaintenanceTarget,
    maintenance,
};
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, debug, error, info, info_span};

use crate::{JOB, RESULT, RUNS_COUNTER};

/// What a successful run of a job did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub pages: u64,
    pub scanned: u64,
    pub mutated: u64,
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),

    #[error("the job panicked")]
    Panicked(#[from] JoinError),
}

/// A maintenance job, which can be run any number of times
#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    /// The name of the job, as used on the command line and in the logs
    fn name(&self) -> &str;

    /// Run the job once, until it is done or cancelled
    async fn run(
        &self,
        clock: &dyn Clock,
        cancellation_token: &CancellationToken,
    ) -> Result<JobSummary, MaintenanceError>;
}

type BuildTarget<R> =
    dyn Fn(DateTime<Utc>) -> Result<MaintenanceTarget<R>, ConfigurationError> + Send + Sync;

/// A [`MaintenanceJob`] running one target over a pager and a mutator
///
/// The target is built again for every run, from the time of the run.
pub struct TargetJob<R, P, M> {
    name: String,
    build: Box<BuildTarget<R>>,
    staleness: Option<Duration>,
    pager: P,
    mutator: M,
}

impl<R, P, M> TargetJob<R, P, M>
where
    R: Record,
    P: CursorPager<R>,
    M: BatchMutator<R>,
{
    pub fn new(
        name: impl Into<String>,
        pager: P,
        mutator: M,
        build: impl Fn(DateTime<Utc>) -> Result<MaintenanceTarget<R>, ConfigurationError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            build: Box::new(build),
            staleness: None,
            pager,
            mutator,
        }
    }

    /// Allow the scans of this job to read data up to `staleness` old
    #[must_use]
    pub fn with_staleness(mut self, staleness: Option<Duration>) -> Self {
        self.staleness = staleness;
        self
    }
}

#[async_trait]
impl<R, P, M> MaintenanceJob for TargetJob<R, P, M>
where
    R: Record,
    P: CursorPager<R>,
    M: BatchMutator<R>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        clock: &dyn Clock,
        cancellation_token: &CancellationToken,
    ) -> Result<JobSummary, MaintenanceError> {
        let target = (self.build)(clock.now())?.with_staleness(self.staleness);
        let report = maintenance::run(
            &target,
            &self.pager,
            &self.mutator,
            clock,
            cancellation_token,
        )
        .await?;

        Ok(JobSummary {
            pages: report.pages,
            scanned: report.scanned,
            mutated: report.mutated,
            cancelled: report.cancelled,
        })
    }
}

/// The outcome of one job in a round
#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub result: Result<JobSummary, JobError>,
}

/// Run every job once, each in its own task, and wait for all of them
///
/// A failing job doesn't stop the others.
pub async fn run_all(
    jobs: &[Arc<dyn MaintenanceJob>],
    clock: &Arc<dyn Clock>,
    cancellation_token: &CancellationToken,
    task_tracker: &TaskTracker,
) -> Vec<JobOutcome> {
    let handles: Vec<_> = jobs
        .iter()
        .map(|job| {
            let name = job.name().to_owned();
            let job = Arc::clone(job);
            let clock = Arc::clone(clock);
            let cancellation_token = cancellation_token.clone();
            let span = info_span!("job.run", job.name = %name);
            let handle = task_tracker.spawn(
                async move { job.run(clock.as_ref(), &cancellation_token).await }.instrument(span),
            );
            (name, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => Err(JobError::from(e)),
            Err(e) => Err(JobError::from(e)),
        };

        let outcome = match &result {
            Ok(summary) if summary.cancelled => "cancelled",
            Ok(_) => "success",
            Err(_) => "failure",
        };
        RUNS_COUNTER.add(
            1,
            &[
                KeyValue::new(JOB, name.clone()),
                KeyValue::new(RESULT, outcome),
            ],
        );

        match &result {
            Ok(summary) if summary.mutated > 0 => {
                info!(
                    job.name = %name,
                    pages = summary.pages,
                    scanned = summary.scanned,
                    mutated = summary.mutated,
                    cancelled = summary.cancelled,
                    "Maintenance job finished"
                );
            }
            Ok(summary) => {
                debug!(
                    job.name = %name,
                    pages = summary.pages,
                    scanned = summary.scanned,
                    cancelled = summary.cancelled,
                    "Maintenance job finished, nothing to do"
                );
            }
            Err(e) => {
                error!(
                    job.name = %name,
                    error = e as &dyn std::error::Error,
                    "Maintenance job failed"
                );
            }
        }

        outcomes.push(JobOutcome { name, result });
    }

    outcomes
}

/// Run every job every `interval`, until the cancellation token is cancelled
///
/// Cancelling lets the running jobs finish their current page.
pub async fn run_periodically(
    jobs: Vec<Arc<dyn MaintenanceJob>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancellation_token: CancellationToken,
    task_tracker: TaskTracker,
) {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = cancellation_token.cancelled() => {
                debug!("Shutting down the maintenance worker");
                return;
            }

            _ = interval.tick() => {
                run_all(&jobs, &clock, &cancellation_token, &task_tracker).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;
    use sweep_data_model::{MockClock, User, WebappSession};
    use sweep_storage::{Phase, memory::MemoryTable};

    use super::*;
    use crate::cleanup::{expired_webapp_sessions, unverified_users};

    fn jobs(
        sessions: &MemoryTable<WebappSession>,
        users: &MemoryTable<User>,
    ) -> Vec<Arc<dyn MaintenanceJob>> {
        vec![
            Arc::new(TargetJob::new(
                "expired-webapp-sessions",
                sessions.clone(),
                sessions.clone(),
                |now| expired_webapp_sessions(2, now),
            )),
            Arc::new(TargetJob::new(
                "unverified-users",
                users.clone(),
                users.clone(),
                |now| unverified_users(chrono::Duration::days(7), 2, now),
            )),
        ]
    }

    #[tokio::test]
    async fn test_jobs_run_concurrently_and_independently() {
        let mock = Arc::new(MockClock::default());
        let clock: Arc<dyn Clock> = mock.clone();
        let mut rng = ChaChaRng::seed_from_u64(42);
        let users = MemoryTable::from_rows(User::samples(mock.now(), &mut rng));
        mock.advance(chrono::Duration::days(8));
        let sessions = MemoryTable::from_rows(
            (0..5).flat_map(|_| WebappSession::samples(mock.now(), &mut rng)),
        );

        users.fail_next_fetch().await;
        let task_tracker = TaskTracker::new();
        let outcomes = run_all(
            &jobs(&sessions, &users),
            &clock,
            &CancellationToken::new(),
            &task_tracker,
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].name, "expired-webapp-sessions");
        assert_matches!(
            &outcomes[0].result,
            Ok(JobSummary {
                mutated: 5,
                cancelled: false,
                ..
            })
        );
        assert_eq!(outcomes[1].name, "unverified-users");
        assert_matches!(
            &outcomes[1].result,
            Err(JobError::Maintenance(e)) if e.phase() == Phase::Fetch
        );

        // The failing job didn't hold the other back, and runs again later
        assert_eq!(sessions.rows().await.len(), 5);
        let outcomes = run_all(
            &jobs(&sessions, &users),
            &clock,
            &CancellationToken::new(),
            &task_tracker,
        )
        .await;
        assert_matches!(&outcomes[1].result, Ok(JobSummary { mutated: 1, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_jobs_stop_before_fetching() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::default());
        let sessions = MemoryTable::default();
        let users = MemoryTable::default();

        let cancellation_token = CancellationToken::new();
        cancellation_token.cancel();
        let outcomes = run_all(
            &jobs(&sessions, &users),
            &clock,
            &cancellation_token,
            &TaskTracker::new(),
        )
        .await;

        for outcome in outcomes {
            assert_matches!(
                outcome.result,
                Ok(JobSummary {
                    pages: 0,
                    cancelled: true,
                    ..
                })
            );
        }
        assert!(sessions.fetches().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_targets_fail_before_any_io() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::default());
        let sessions: MemoryTable<WebappSession> = MemoryTable::default();
        let job: Arc<dyn MaintenanceJob> = Arc::new(TargetJob::new(
            "broken",
            sessions.clone(),
            sessions.clone(),
            |now| expired_webapp_sessions(0, now),
        ));

        let outcomes = run_all(&[job], &clock, &CancellationToken::new(), &TaskTracker::new()).await;
        assert_matches!(
            &outcomes[0].result,
            Err(JobError::Maintenance(e)) if e.phase() == Phase::Configuration
        );
        assert!(sessions.fetches().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_runs_stop_on_cancellation() {
        let clock: Arc<dyn Clock> = Arc::new(MockClock::default());
        let sessions = MemoryTable::default();
        let users = MemoryTable::default();
        let cancellation_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        let worker = tokio::spawn(run_periodically(
            jobs(&sessions, &users),
            clock,
            Duration::from_secs(60),
            cancellation_token.clone(),
            task_tracker.clone(),
        ));

        // The first round runs right away, then one every minute
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancellation_token.cancel();
        worker.await.unwrap();

        assert_eq!(sessions.fetches().await.len(), 3);
        assert_eq!(users.fetches().await.len(), 3);
    }
}
