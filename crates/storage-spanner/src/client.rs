// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! The subset of the Spanner API the backend relies on

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sweep_data_model::Value;
use sweep_storage::statement::Statement;

use crate::SpannerError;

/// How fresh the data returned by a read must be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampBound {
    /// Read the latest committed data
    #[default]
    Strong,

    /// Let the engine pick a timestamp at most this old, which may be served
    /// by a nearby replica
    MaxStaleness(Duration),
}

impl TimestampBound {
    /// The bound for a read allowed to be `staleness` old, if any
    #[must_use]
    pub fn from_staleness(staleness: Option<Duration>) -> Self {
        match staleness {
            Some(staleness) if !staleness.is_zero() => Self::MaxStaleness(staleness),
            _ => Self::Strong,
        }
    }
}

/// A native write, applied atomically with the other mutations of the same
/// commit
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert the row, or overwrite the listed columns if it exists
    InsertOrUpdate {
        table: &'static str,
        columns: Vec<&'static str>,
        values: Vec<Value>,
    },
}

/// Options passed along a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Tag attached to the transaction, visible in the engine statistics
    pub transaction_tag: String,
}

/// A connection to a Spanner database
///
/// Statements use `@pN` placeholders, and array parameters are bound as
/// `ARRAY<...>` values.
#[async_trait]
pub trait SpannerClient: Send + Sync {
    /// Run a read-only query in a single-use transaction
    ///
    /// Returns one list of values per row, in the order of the selected
    /// columns
    ///
    /// # Errors
    ///
    /// Returns a [`SpannerError`] if the query failed
    async fn query(
        &self,
        statement: Statement,
        bound: TimestampBound,
    ) -> Result<Vec<Vec<Value>>, SpannerError>;

    /// Run a DML statement in its own read-write transaction, returning the
    /// number of rows it affected
    ///
    /// # Errors
    ///
    /// Returns a [`SpannerError`] if the statement failed or the transaction
    /// couldn't commit
    async fn execute_update(
        &self,
        statement: Statement,
        options: RequestOptions,
    ) -> Result<u64, SpannerError>;

    /// Commit a set of mutations atomically
    ///
    /// # Errors
    ///
    /// Returns a [`SpannerError`] if the commit failed, in which case none of
    /// the mutations were applied
    async fn apply(
        &self,
        mutations: Vec<Mutation>,
        options: RequestOptions,
    ) -> Result<(), SpannerError>;
}

#[async_trait]
impl<C: SpannerClient + ?Sized> SpannerClient for Arc<C> {
    async fn query(
        &self,
        statement: Statement,
        bound: TimestampBound,
    ) -> Result<Vec<Vec<Value>>, SpannerError> {
        (**self).query(statement, bound).await
    }

    async fn execute_update(
        &self,
        statement: Statement,
        options: RequestOptions,
    ) -> Result<u64, SpannerError> {
        (**self).execute_update(statement, options).await
    }

    async fn apply(
        &self,
        mutations: Vec<Mutation>,
        options: RequestOptions,
    ) -> Result<(), SpannerError> {
        (**self).apply(mutations, options).await
    }
}
