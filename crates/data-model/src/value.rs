// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Backend-agnostic column values
//!
//! Rows travel between the storage backends and the maintenance engine as a
//! list of [`Value`]s, in the order of the columns declared by the table
//! [`TableSchema`](crate::TableSchema). Each backend is responsible for
//! encoding those values into its own wire representation.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use ulid::Ulid;
use uuid::Uuid;

/// The type of a column, as far as the maintenance engine is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// A 128-bit identifier. ULIDs are stored as UUIDs
    Uuid,

    /// A UTF-8 string
    Text,

    /// An opaque byte string
    Bytes,

    /// A signed 64-bit integer
    BigInt,

    /// A boolean
    Bool,

    /// A timestamp with a timezone, always stored as UTC
    Timestamp,
}

impl ColumnType {
    /// A short, human-readable name for the type
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::BigInt => "bigint",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single column value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The SQL `NULL`
    Null,
    Uuid(Uuid),
    Text(String),
    Bytes(Vec<u8>),
    BigInt(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// The type of this value, or `None` for [`Value::Null`]
    #[must_use]
    pub const fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Uuid(_) => Some(ColumnType::Uuid),
            Self::Text(_) => Some(ColumnType::Text),
            Self::Bytes(_) => Some(ColumnType::Bytes),
            Self::BigInt(_) => Some(ColumnType::BigInt),
            Self::Bool(_) => Some(ColumnType::Bool),
            Self::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    /// A short name for the kind of value, used in error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self.column_type() {
            Some(ty) => ty.name(),
            None => "null",
        }
    }

    /// Returns `true` if this is [`Value::Null`]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare two values of the same type.
    ///
    /// Returns `None` if the values have different types or if either of them
    /// is `NULL`, mirroring SQL comparison semantics.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::BigInt(a), Self::BigInt(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<Ulid> for Value {
    fn from(value: Ulid) -> Self {
        Self::Uuid(Uuid::from(value))
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::BigInt(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
