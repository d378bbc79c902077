// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Server-side filters narrowing a scanning read
//!
//! A [`ScanFilter`] only reduces the number of rows a scan returns. The
//! predicate of a maintenance target is always re-evaluated on every row,
//! so a filter which is looser than the predicate is harmless.

use std::cmp::Ordering;

use sweep_data_model::{TableSchema, Value};

/// A single condition on a column
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(&'static str, Value),
    Lt(&'static str, Value),
    Gt(&'static str, Value),
    StartsWith(&'static str, String),
    IsNull(&'static str),
}

impl Condition {
    /// The column this condition applies to
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::Eq(column, _)
            | Self::Lt(column, _)
            | Self::Gt(column, _)
            | Self::StartsWith(column, _)
            | Self::IsNull(column) => column,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Eq(_, expected) => value.compare(expected) == Some(Ordering::Equal),
            Self::Lt(_, bound) => value.compare(bound) == Some(Ordering::Less),
            Self::Gt(_, bound) => value.compare(bound) == Some(Ordering::Greater),
            Self::StartsWith(_, prefix) => {
                matches!(value, Value::Text(text) if text.starts_with(prefix.as_str()))
            }
            Self::IsNull(_) => value.is_null(),
        }
    }
}

/// A conjunction of [`Condition`]s
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFilter {
    conditions: Vec<Condition>,
}

impl ScanFilter {
    /// A filter which matches every row
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column, value.into()));
        self
    }

    #[must_use]
    pub fn lt(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt(column, value.into()));
        self
    }

    #[must_use]
    pub fn gt(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gt(column, value.into()));
        self
    }

    #[must_use]
    pub fn starts_with(mut self, column: &'static str, prefix: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::StartsWith(column, prefix.into()));
        self
    }

    #[must_use]
    pub fn is_null(mut self, column: &'static str) -> Self {
        self.conditions.push(Condition::IsNull(column));
        self
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter on a row, for backends which can't push it down.
    ///
    /// Conditions on columns the table doesn't have never match.
    #[must_use]
    pub fn matches(&self, schema: &TableSchema, values: &[Value]) -> bool {
        self.conditions.iter().all(|condition| {
            schema
                .column(condition.column())
                .and_then(|(index, _)| values.get(index))
                .is_some_and(|value| condition.matches(value))
        })
    }
}
