// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::LazyLock;

use std::time::Instant;

use opentelemetry::{
    InstrumentationScope, Key, KeyValue,
    metrics::{Histogram, Meter},
};
use opentelemetry_semantic_conventions as semcov;
use sweep_storage::DialectKind;

use crate::tracing::system_name;

static SCOPE: LazyLock<InstrumentationScope> = LazyLock::new(|| {
    InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semcov::SCHEMA_URL)
        .build()
});

static METER: LazyLock<Meter> =
    LazyLock::new(|| opentelemetry::global::meter_with_scope(SCOPE.clone()));

pub(crate) const OPERATION: Key = Key::from_static_str("db.operation.name");
pub(crate) const COLLECTION: Key = Key::from_static_str("db.collection.name");
pub(crate) const SYSTEM: Key = Key::from_static_str("db.system.name");

pub(crate) static DB_CLIENT_OPERATION_DURATION_HISTOGRAM: LazyLock<Histogram<u64>> =
    LazyLock::new(|| {
        METER
            .u64_histogram("db.client.operation.duration")
            .with_description("The time it took to run a maintenance statement.")
            .with_unit("ms")
            .build()
    });

/// Record how long a statement took, since `start`
pub(crate) fn record_duration(
    start: Instant,
    dialect: DialectKind,
    operation: &'static str,
    table: &'static str,
) {
    let duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    DB_CLIENT_OPERATION_DURATION_HISTOGRAM.record(
        duration_ms,
        &[
            KeyValue::new(SYSTEM, system_name(dialect)),
            KeyValue::new(OPERATION, operation),
            KeyValue::new(COLLECTION, table),
        ],
    );
}
