// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use async_trait::async_trait;
use sweep_data_model::Record;

use crate::{StorageError, filter::ScanFilter};

/// A request for the next page of a scan
#[derive(Debug, Clone)]
pub struct PageRequest<'a, K> {
    /// Only rows with a key strictly greater than this one are returned
    pub after: K,

    /// The maximum number of rows to return
    pub limit: NonZeroUsize,

    /// An additional filter, evaluated by the backend
    pub filter: &'a ScanFilter,

    /// How stale the data is allowed to be, if the backend supports it
    pub staleness: Option<Duration>,
}

/// Reads pages of rows in ascending key order, without offsets
///
/// Implementations must return rows in strictly ascending key order, all
/// strictly greater than [`PageRequest::after`]. Returning fewer rows than
/// [`PageRequest::limit`] means the scan is over.
#[async_trait]
pub trait CursorPager<R: Record>: Send + Sync {
    /// Fetch the next page of rows
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend fails or returns rows which
    /// don't match the table schema. Errors are never retried.
    async fn fetch(&self, request: PageRequest<'_, R::Key>) -> Result<Vec<R>, StorageError>;
}

#[async_trait]
impl<R, P> CursorPager<R> for Arc<P>
where
    R: Record,
    P: CursorPager<R> + ?Sized,
{
    async fn fetch(&self, request: PageRequest<'_, R::Key>) -> Result<Vec<R>, StorageError> {
        (**self).fetch(request).await
    }
}
