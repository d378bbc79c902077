// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Maintenance jobs of the console database
//!
//! The [`cleanup`] module holds the targets deleting stale rows, the
//! [`runner`] runs them once or periodically, and the [`UsageRecorder`]
//! writes API key usage in batches.

use std::sync::LazyLock;

use opentelemetry::{
    Key,
    metrics::{Counter, Meter},
};

pub mod cleanup;
pub mod runner;
mod usage;

pub use self::{
    runner::{JobError, JobOutcome, JobSummary, MaintenanceJob, TargetJob},
    usage::UsageRecorder,
};

static METER: LazyLock<Meter> = LazyLock::new(|| {
    let scope = opentelemetry::InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(opentelemetry_semantic_conventions::SCHEMA_URL)
        .build();

    opentelemetry::global::meter_with_scope(scope)
});

const TYPE: Key = Key::from_static_str("type");
const JOB: Key = Key::from_static_str("job");
const RESULT: Key = Key::from_static_str("result");

static RUNS_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("sweep.maintenance.runs")
        .with_description("The number of maintenance job runs, by outcome")
        .with_unit("{runs}")
        .build()
});
