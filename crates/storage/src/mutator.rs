// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use async_trait::async_trait;
use sweep_data_model::Record;

use crate::StorageError;

/// The kind of bulk write applied to a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Delete,
    UpsertOverwrite,
}

impl WriteKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::UpsertOverwrite => "upsert",
        }
    }
}

impl std::fmt::Display for WriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk write, derived from a single page
#[derive(Debug, Clone)]
pub enum BatchWrite<R: Record> {
    /// Delete exactly those keys
    Delete(Vec<R::Key>),

    /// Insert the missing rows, and overwrite the mutable columns of the
    /// existing ones
    UpsertOverwrite(Vec<R>),
}

impl<R: Record> BatchWrite<R> {
    #[must_use]
    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Delete(_) => WriteKind::Delete,
            Self::UpsertOverwrite(_) => WriteKind::UpsertOverwrite,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Delete(keys) => keys.len(),
            Self::UpsertOverwrite(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies bulk writes in a single round trip
///
/// A batch is atomic on its own, but there is no atomicity across batches.
/// Applying the same batch twice leaves the table in the same state as
/// applying it once. An empty batch must not do any I/O.
#[async_trait]
pub trait BatchMutator<R: Record>: Send + Sync {
    /// Apply the batch, returning the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend fails, or if the batch can't
    /// be expressed on this backend
    async fn apply(&self, batch: BatchWrite<R>) -> Result<u64, StorageError>;
}

#[async_trait]
impl<R, M> BatchMutator<R> for Arc<M>
where
    R: Record,
    M: BatchMutator<R> + ?Sized,
{
    async fn apply(&self, batch: BatchWrite<R>) -> Result<u64, StorageError> {
        (**self).apply(batch).await
    }
}
