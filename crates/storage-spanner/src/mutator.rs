// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sweep_data_model::{Record, TableSchema, Value};
use sweep_storage::{
    BatchMutator, BatchWrite, ConfigurationError, Dialect, LogicError, StorageError,
    statement::{delete_keys, validate_upsert_rows},
};
use tracing::Span;

use crate::{Mutation, RequestOptions, SpannerClient, ensure_mutation_dialect};

/// A [`BatchMutator`] writing through a [`SpannerClient`]
///
/// Deletes run as a single DML statement. Upserts commit one `InsertOrUpdate`
/// mutation per key, all in a single request. Those write every column, so
/// the immutable columns of a stored row are replaced by the ones of the
/// batch. When a batch holds the same key more than once, its rows collapse
/// into one, keeping the immutable columns of the first and the mutable
/// columns of the last.
#[derive(Debug)]
pub struct SpannerBatchMutator<C> {
    client: C,
    dialect: Arc<dyn Dialect>,
}

impl<C: SpannerClient> SpannerBatchMutator<C> {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DialectMismatch`] if the dialect doesn't
    /// write through native mutations
    pub fn new(client: C, dialect: Arc<dyn Dialect>) -> Result<Self, ConfigurationError> {
        ensure_mutation_dialect(dialect.as_ref())?;
        Ok(Self { client, dialect })
    }
}

/// Overwrite the mutable columns of `base` with the ones of `incoming`
fn overwrite_mutable(schema: &TableSchema, base: &mut [Value], incoming: Vec<Value>) {
    for ((column, slot), value) in schema.columns.iter().zip(base.iter_mut()).zip(incoming) {
        if column.mutable && column.name != schema.key {
            *slot = value;
        }
    }
}

/// Collapse the rows of a batch to one row per key, in order of first
/// appearance
fn merge_rows(schema: &TableSchema, key_index: usize, rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut positions: HashMap<Value, usize> = HashMap::with_capacity(rows.len());
    let mut merged: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(key) = row.get(key_index).cloned() else {
            continue;
        };

        if let Some(&position) = positions.get(&key) {
            overwrite_mutable(schema, &mut merged[position], row);
        } else {
            positions.insert(key, merged.len());
            merged.push(row);
        }
    }

    merged
}

#[async_trait]
impl<R: Record, C: SpannerClient> BatchMutator<R> for SpannerBatchMutator<C> {
    #[tracing::instrument(
        name = "db.batch_mutator.apply",
        skip_all,
        fields(
            db.query.text,
            db.system.name = "gcp.spanner",
            db.collection.name = R::SCHEMA.table,
            batch.kind = %batch.kind(),
            batch.size = batch.len(),
        ),
        err,
    )]
    async fn apply(&self, batch: BatchWrite<R>) -> Result<u64, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let schema = R::SCHEMA;
        let options = RequestOptions {
            transaction_tag: format!("sweep-{}-{}", schema.table, batch.kind()),
        };

        match batch {
            BatchWrite::Delete(keys) => {
                let statement = delete_keys(
                    self.dialect.as_ref(),
                    schema,
                    keys.into_iter().map(Into::into).collect(),
                )?;
                Span::current().record("db.query.text", statement.sql.as_str());

                let affected = self.client.execute_update(statement, options).await?;
                Ok(affected)
            }

            BatchWrite::UpsertOverwrite(rows) => {
                let rows: Vec<Vec<Value>> = rows.iter().map(Record::to_values).collect();
                validate_upsert_rows(schema, &rows)?;
                let (key_index, _) = schema.key_column().ok_or(LogicError::MissingKeyColumn {
                    table: schema.table,
                })?;

                let mutations: Vec<Mutation> = merge_rows(schema, key_index, rows)
                    .into_iter()
                    .map(|values| Mutation::InsertOrUpdate {
                        table: schema.table,
                        columns: schema.column_names().collect(),
                        values,
                    })
                    .collect();

                let affected = u64::try_from(mutations.len()).unwrap_or(u64::MAX);
                self.client.apply(mutations, options).await?;
                Ok(affected)
            }
        }
    }
}
