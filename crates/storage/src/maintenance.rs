// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! The maintenance loop
//!
//! A run scans a table page by page, in ascending key order, starting from
//! the zero key. Each page is filtered with the predicate of the target, and
//! the surviving rows are handed to the mutator as a single batch. The cursor
//! then moves to the last key of the fetched page, whether it survived the
//! predicate or not. The run is over once a page comes back shorter than the
//! page size.
//!
//! Nothing is persisted between runs: a run which was cancelled or failed
//! halfway starts from the beginning next time, which is fine as both deletes
//! and upserts are idempotent.

use opentelemetry::KeyValue;
use sweep_data_model::{Clock, CursorKey, Record};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    BatchMutator, BatchWrite, CursorPager, LogicError, MaintenanceError, PageRequest,
    target::{Action, MaintenanceTarget},
    telemetry::{KIND, MAINTENANCE_PAGES_COUNTER, MAINTENANCE_ROWS_COUNTER, TARGET},
};

/// The outcome of a maintenance run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceReport<K> {
    /// How many pages were fetched, including the final short one
    pub pages: u64,

    /// How many rows were fetched
    pub scanned: u64,

    /// How many rows the mutator reported as affected
    pub mutated: u64,

    /// The last key seen
    pub cursor: K,

    /// Whether the run stopped because it was cancelled
    pub cancelled: bool,
}

/// Run a maintenance target to completion, or until cancelled
///
/// Cancellation is only checked between pages: a page which was fetched is
/// always fully processed.
///
/// # Errors
///
/// Returns a [`MaintenanceError`] naming the phase which failed. Pages
/// mutated before the failure stay applied.
#[tracing::instrument(
    name = "maintenance.run",
    skip_all,
    fields(
        target.name = target.name(),
        target.page_size = target.page_size().get(),
    ),
    err,
)]
pub async fn run<R, P, M>(
    target: &MaintenanceTarget<R>,
    pager: &P,
    mutator: &M,
    clock: &dyn Clock,
    cancellation_token: &CancellationToken,
) -> Result<MaintenanceReport<R::Key>, MaintenanceError>
where
    R: Record,
    P: CursorPager<R> + ?Sized,
    M: BatchMutator<R> + ?Sized,
{
    let page_size = target.page_size();
    let kind = target.action().kind();
    let attributes = [
        KeyValue::new(TARGET, target.name().to_owned()),
        KeyValue::new(KIND, kind.as_str()),
    ];

    let mut report = MaintenanceReport {
        pages: 0,
        scanned: 0,
        mutated: 0,
        cursor: <R::Key as CursorKey>::start(),
        cancelled: false,
    };

    loop {
        if cancellation_token.is_cancelled() {
            debug!(cursor = %report.cursor, "maintenance run cancelled");
            report.cancelled = true;
            break;
        }

        let page = pager
            .fetch(PageRequest {
                after: report.cursor.clone(),
                limit: page_size,
                filter: target.scan_filter(),
                staleness: target.staleness(),
            })
            .await
            .map_err(|source| MaintenanceError::Fetch {
                target: target.name().to_owned(),
                source,
            })?;

        report.pages += 1;
        MAINTENANCE_PAGES_COUNTER.add(1, &attributes);

        let fetched = page.len();
        report.scanned += fetched as u64;

        let Some(last) = page.last().map(Record::key) else {
            break;
        };

        if last <= report.cursor {
            return Err(MaintenanceError::Advance {
                target: target.name().to_owned(),
                source: LogicError::CursorNotAdvanced {
                    target: target.name().to_owned(),
                    cursor: report.cursor.to_string(),
                    last: last.to_string(),
                },
            });
        }

        let now = clock.now();
        let batch = match target.action() {
            Action::Delete => BatchWrite::Delete(
                page.iter()
                    .filter(|row| target.matches(row, now))
                    .map(Record::key)
                    .collect(),
            ),
            Action::UpsertOverwrite(transform) => BatchWrite::UpsertOverwrite(
                page.into_iter()
                    .filter(|row| target.matches(row, now))
                    .map(|row| transform(row, now))
                    .collect(),
            ),
        };

        let matching = batch.len();
        if matching > 0 {
            let affected = mutator
                .apply(batch)
                .await
                .map_err(|source| MaintenanceError::Mutate {
                    target: target.name().to_owned(),
                    kind,
                    source,
                })?;

            report.mutated += affected;
            MAINTENANCE_ROWS_COUNTER.add(affected, &attributes);
        }

        debug!(
            page = report.pages,
            fetched,
            matching,
            cursor = %last,
            "processed maintenance page"
        );

        report.cursor = last;

        if fetched < page_size.get() {
            break;
        }
    }

    if report.mutated == 0 {
        debug!(scanned = report.scanned, "nothing to do");
    } else {
        info!(
            scanned = report.scanned,
            mutated = report.mutated,
            pages = report.pages,
            "maintenance run done"
        );
    }

    Ok(report)
}
