// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::LazyLock;

use opentelemetry::{
    InstrumentationScope, Key,
    metrics::{Counter, Meter},
};
use opentelemetry_semantic_conventions as semcov;

static SCOPE: LazyLock<InstrumentationScope> = LazyLock::new(|| {
    InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semcov::SCHEMA_URL)
        .build()
});

static METER: LazyLock<Meter> =
    LazyLock::new(|| opentelemetry::global::meter_with_scope(SCOPE.clone()));

pub(crate) const TARGET: Key = Key::from_static_str("target");
pub(crate) const KIND: Key = Key::from_static_str("kind");
pub(crate) const RESULT: Key = Key::from_static_str("result");

pub(crate) static MAINTENANCE_ROWS_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("sweep.maintenance.rows")
        .with_description("Number of rows mutated by maintenance runs")
        .with_unit("{row}")
        .build()
});

pub(crate) static MAINTENANCE_PAGES_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("sweep.maintenance.pages")
        .with_description("Number of pages fetched by maintenance runs")
        .with_unit("{page}")
        .build()
});

pub(crate) static CACHE_LOOKUPS_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("sweep.cache.lookups")
        .with_description("Number of lookups in expiring caches")
        .with_unit("{lookup}")
        .build()
});
