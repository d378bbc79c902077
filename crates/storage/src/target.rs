// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sweep_data_model::Record;

use crate::{ConfigurationError, WriteKind, filter::ScanFilter};

/// Decides whether a row must be mutated, given the current time
pub type Predicate<R> = Arc<dyn Fn(&R, DateTime<Utc>) -> bool + Send + Sync>;

/// Computes the new version of a row which must be upserted
pub type Transform<R> = Arc<dyn Fn(R, DateTime<Utc>) -> R + Send + Sync>;

/// What to do with the rows matching the predicate of a target
#[derive(Clone)]
pub enum Action<R> {
    Delete,
    UpsertOverwrite(Transform<R>),
}

impl<R> Action<R> {
    #[must_use]
    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Delete => WriteKind::Delete,
            Self::UpsertOverwrite(_) => WriteKind::UpsertOverwrite,
        }
    }
}

/// A table to scan, which rows to mutate, and how
#[derive(Clone)]
pub struct MaintenanceTarget<R> {
    name: String,
    page_size: NonZeroUsize,
    staleness: Option<Duration>,
    filter: ScanFilter,
    predicate: Predicate<R>,
    action: Action<R>,
}

impl<R: Record> MaintenanceTarget<R> {
    fn new(
        name: impl Into<String>,
        page_size: usize,
        predicate: Predicate<R>,
        action: Action<R>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let page_size = NonZeroUsize::new(page_size)
            .ok_or_else(|| ConfigurationError::InvalidPageSize {
                target: name.clone(),
            })?;

        Ok(Self {
            name,
            page_size,
            staleness: None,
            filter: ScanFilter::all(),
            predicate,
            action,
        })
    }

    /// A target deleting the rows matching the predicate
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidPageSize`] if `page_size` is zero
    pub fn delete(
        name: impl Into<String>,
        page_size: usize,
        predicate: impl Fn(&R, DateTime<Utc>) -> bool + Send + Sync + 'static,
    ) -> Result<Self, ConfigurationError> {
        Self::new(name, page_size, Arc::new(predicate), Action::Delete)
    }

    /// A target rewriting the rows matching the predicate with `transform`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidPageSize`] if `page_size` is zero
    pub fn upsert(
        name: impl Into<String>,
        page_size: usize,
        predicate: impl Fn(&R, DateTime<Utc>) -> bool + Send + Sync + 'static,
        transform: impl Fn(R, DateTime<Utc>) -> R + Send + Sync + 'static,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            name,
            page_size,
            Arc::new(predicate),
            Action::UpsertOverwrite(Arc::new(transform)),
        )
    }

    /// Allow the scan to read data up to `staleness` old
    #[must_use]
    pub fn with_staleness(mut self, staleness: Option<Duration>) -> Self {
        self.staleness = staleness;
        self
    }

    /// Narrow the scan with a filter evaluated by the backend
    #[must_use]
    pub fn with_scan_filter(mut self, filter: ScanFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn page_size(&self) -> NonZeroUsize {
        self.page_size
    }

    #[must_use]
    pub fn staleness(&self) -> Option<Duration> {
        self.staleness
    }

    #[must_use]
    pub fn scan_filter(&self) -> &ScanFilter {
        &self.filter
    }

    #[must_use]
    pub fn action(&self) -> &Action<R> {
        &self.action
    }

    /// Evaluate the predicate on a row
    #[must_use]
    pub fn matches(&self, row: &R, now: DateTime<Utc>) -> bool {
        (self.predicate)(row, now)
    }
}

impl<R> std::fmt::Debug for MaintenanceTarget<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceTarget")
            .field("name", &self.name)
            .field("page_size", &self.page_size)
            .field("staleness", &self.staleness)
            .field("filter", &self.filter)
            .field("action", &self.action.kind())
            .finish_non_exhaustive()
    }
}
