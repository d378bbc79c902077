// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! An in-memory backend, mostly useful in tests
//!
//! [`MemoryTable`] implements both [`CursorPager`] and [`BatchMutator`] on top
//! of an ordered map, records every call it receives, and can be told to fail
//! the next fetch or write.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use sweep_data_model::Record;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{BatchMutator, BatchWrite, CursorPager, PageRequest, StorageError, WriteKind};

/// The error returned when a failure was injected
#[derive(Debug, Error)]
#[error("injected failure")]
pub struct InjectedFailure;

/// A fetch received by a [`MemoryTable`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord<K> {
    pub after: K,
    pub limit: usize,
    pub returned: Vec<K>,
}

/// A write received by a [`MemoryTable`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord<K> {
    pub kind: WriteKind,
    pub keys: Vec<K>,
}

struct Inner<R: Record> {
    rows: BTreeMap<R::Key, R>,
    fetches: Vec<FetchRecord<R::Key>>,
    writes: Vec<WriteRecord<R::Key>>,
    fail_next_fetch: bool,
    fail_next_write: bool,
}

/// An in-memory table, shared between its clones
pub struct MemoryTable<R: Record> {
    inner: Arc<Mutex<Inner<R>>>,
}

impl<R: Record> Clone for MemoryTable<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Record> Default for MemoryTable<R> {
    fn default() -> Self {
        Self::from_rows(Vec::new())
    }
}

impl<R: Record> MemoryTable<R> {
    /// Create a table holding the given rows. Rows with the same key replace
    /// each other.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = R>) -> Self {
        let rows = rows.into_iter().map(|row| (row.key(), row)).collect();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                rows,
                fetches: Vec::new(),
                writes: Vec::new(),
                fail_next_fetch: false,
                fail_next_write: false,
            })),
        }
    }

    /// All the rows currently in the table, in key order
    pub async fn rows(&self) -> Vec<R> {
        self.inner.lock().await.rows.values().cloned().collect()
    }

    /// Insert or replace a row
    pub async fn insert(&self, row: R) {
        self.inner.lock().await.rows.insert(row.key(), row);
    }

    /// Every fetch received so far
    pub async fn fetches(&self) -> Vec<FetchRecord<R::Key>> {
        self.inner.lock().await.fetches.clone()
    }

    /// Every non-empty write received so far
    pub async fn writes(&self) -> Vec<WriteRecord<R::Key>> {
        self.inner.lock().await.writes.clone()
    }

    /// Make the next fetch fail
    pub async fn fail_next_fetch(&self) {
        self.inner.lock().await.fail_next_fetch = true;
    }

    /// Make the next non-empty write fail, without applying it
    pub async fn fail_next_write(&self) {
        self.inner.lock().await.fail_next_write = true;
    }
}

/// Overwrite the mutable columns of `existing` with the ones of `incoming`
fn merge<R: Record>(existing: &R, incoming: R) -> Result<R, StorageError> {
    let schema = R::SCHEMA;
    let mut values = existing.to_values();
    let incoming = incoming.to_values();

    for ((column, slot), value) in schema.columns.iter().zip(values.iter_mut()).zip(incoming) {
        if column.mutable && column.name != schema.key {
            *slot = value;
        }
    }

    Ok(R::from_values(values)?)
}

#[async_trait]
impl<R: Record> CursorPager<R> for MemoryTable<R> {
    async fn fetch(&self, request: PageRequest<'_, R::Key>) -> Result<Vec<R>, StorageError> {
        let mut inner = self.inner.lock().await;
        if std::mem::take(&mut inner.fail_next_fetch) {
            return Err(StorageError::backend(InjectedFailure));
        }

        let page: Vec<R> = inner
            .rows
            .range((
                std::ops::Bound::Excluded(&request.after),
                std::ops::Bound::Unbounded,
            ))
            .map(|(_, row)| row)
            .filter(|row| request.filter.matches(R::SCHEMA, &row.to_values()))
            .take(request.limit.get())
            .cloned()
            .collect();

        inner.fetches.push(FetchRecord {
            after: request.after,
            limit: request.limit.get(),
            returned: page.iter().map(Record::key).collect(),
        });

        Ok(page)
    }
}

#[async_trait]
impl<R: Record> BatchMutator<R> for MemoryTable<R> {
    async fn apply(&self, batch: BatchWrite<R>) -> Result<u64, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.lock().await;
        if std::mem::take(&mut inner.fail_next_write) {
            return Err(StorageError::backend(InjectedFailure));
        }

        let kind = batch.kind();
        let (keys, affected) = match batch {
            BatchWrite::Delete(keys) => {
                let removed = keys
                    .iter()
                    .filter(|key| inner.rows.remove(*key).is_some())
                    .count();
                (keys, removed)
            }

            BatchWrite::UpsertOverwrite(rows) => {
                if R::SCHEMA.mutable_columns().next().is_none() {
                    return Err(crate::LogicError::NoMutableColumns {
                        table: R::SCHEMA.table,
                    }
                    .into());
                }

                // Nothing is written until every row of the batch merged
                let mut staged = BTreeMap::new();
                let mut keys = Vec::with_capacity(rows.len());
                for row in rows {
                    let key = row.key();
                    keys.push(key.clone());
                    // Later rows for the same key win
                    let base = staged.get(&key).or_else(|| inner.rows.get(&key));
                    let row = match base {
                        Some(existing) => merge(existing, row)?,
                        None => row,
                    };
                    staged.insert(key, row);
                }

                let affected = staged.len();
                inner.rows.extend(staged);
                (keys, affected)
            }
        };

        inner.writes.push(WriteRecord { kind, keys });

        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }
}
