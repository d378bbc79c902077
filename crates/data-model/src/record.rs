// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use thiserror::Error;
use ulid::Ulid;
use uuid::Uuid;

use crate::{Column, ColumnType, TableSchema, Value};

/// An error which can happen when decoding a row from its values
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The row doesn't have as many values as the table has columns
    #[error("table {table:?} has {expected} columns, got {actual} values")]
    Arity {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A value doesn't have the type the column expects
    #[error("column {column:?} expects a {expected} value, got {actual}")]
    Type {
        column: &'static str,
        expected: ColumnType,
        actual: &'static str,
    },

    /// More columns were read than the table has
    #[error("read past the last column of the row")]
    Exhausted,

    /// A non-nullable column holds a `NULL`
    #[error("column {column:?} is not nullable")]
    UnexpectedNull { column: &'static str },

    /// A value has the right type, but isn't valid for the column
    #[error("column {column:?} holds an invalid value")]
    Invalid {
        column: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl DecodeError {
    /// Build a [`DecodeError::Invalid`] error
    pub fn invalid(
        column: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self::Invalid {
            column,
            source: source.into(),
        }
    }
}

/// Types which can be extracted out of a single [`Value`]
pub trait FromValue: Sized {
    /// The type of column this is usually read from
    const COLUMN_TYPE: ColumnType;

    /// Decode the value
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the value doesn't have the expected type
    fn from_value(column: &'static str, value: Value) -> Result<Self, DecodeError>;
}

fn type_error<T: FromValue>(column: &'static str, value: &Value) -> DecodeError {
    if value.is_null() {
        DecodeError::UnexpectedNull { column }
    } else {
        DecodeError::Type {
            column,
            expected: T::COLUMN_TYPE,
            actual: value.type_name(),
        }
    }
}

macro_rules! impl_from_value {
    ($ty:ty, $column_type:ident, $value:pat => $out:expr) => {
        impl FromValue for $ty {
            const COLUMN_TYPE: ColumnType = ColumnType::$column_type;

            fn from_value(column: &'static str, value: Value) -> Result<Self, DecodeError> {
                match value {
                    $value => Ok($out),
                    other => Err(type_error::<Self>(column, &other)),
                }
            }
        }
    };
}

impl_from_value!(Uuid, Uuid, Value::Uuid(v) => v);
impl_from_value!(Ulid, Uuid, Value::Uuid(v) => Ulid::from(v));
impl_from_value!(String, Text, Value::Text(v) => v);
impl_from_value!(Vec<u8>, Bytes, Value::Bytes(v) => v);
impl_from_value!(i64, BigInt, Value::BigInt(v) => v);
impl_from_value!(bool, Bool, Value::Bool(v) => v);
impl_from_value!(DateTime<Utc>, Timestamp, Value::Timestamp(v) => v);

impl<T: FromValue> FromValue for Option<T> {
    const COLUMN_TYPE: ColumnType = T::COLUMN_TYPE;

    fn from_value(column: &'static str, value: Value) -> Result<Self, DecodeError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(column, value).map(Some)
        }
    }
}

/// A key which can be used as a pagination cursor
///
/// The key must be unique within its table and totally ordered. A scan
/// starts right after [`CursorKey::start`], so that value must sort before
/// any real key and can't be used as one.
pub trait CursorKey:
    FromValue + Into<Value> + Ord + Clone + Debug + Display + Send + Sync + 'static
{
    /// The cursor a scan starts from
    fn start() -> Self;
}

impl CursorKey for Ulid {
    fn start() -> Self {
        Ulid::nil()
    }
}

impl CursorKey for Uuid {
    fn start() -> Self {
        Uuid::nil()
    }
}

impl CursorKey for i64 {
    fn start() -> Self {
        i64::MIN
    }
}

impl CursorKey for String {
    fn start() -> Self {
        String::new()
    }
}

/// A row of a table which the maintenance engine can scan and mutate
pub trait Record: Clone + Send + Sync + 'static {
    /// The type of the unique ordering key
    type Key: CursorKey;

    /// The schema of the table this record lives in
    const SCHEMA: &'static TableSchema;

    /// The unique ordering key of this record
    fn key(&self) -> Self::Key;

    /// Encode the record as a list of values, in the order of the schema
    /// columns
    fn to_values(&self) -> Vec<Value>;

    /// Decode a record from a list of values, in the order of the schema
    /// columns
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the values don't match the schema
    fn from_values(values: Vec<Value>) -> Result<Self, DecodeError>;
}

/// A helper to decode a row, one column at a time
pub struct RowReader {
    columns: std::slice::Iter<'static, Column>,
    values: std::vec::IntoIter<Value>,
}

impl RowReader {
    /// Start reading a row of the given table
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError::Arity`] error if the number of values doesn't
    /// match the number of columns of the table
    pub fn new(schema: &'static TableSchema, values: Vec<Value>) -> Result<Self, DecodeError> {
        if values.len() != schema.columns.len() {
            return Err(DecodeError::Arity {
                table: schema.table,
                expected: schema.columns.len(),
                actual: values.len(),
            });
        }

        Ok(Self {
            columns: schema.columns.iter(),
            values: values.into_iter(),
        })
    }

    /// Read the next column
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the value can't be decoded as `T`, or if
    /// all the columns were already read
    pub fn read<T: FromValue>(&mut self) -> Result<T, DecodeError> {
        let (Some(column), Some(value)) = (self.columns.next(), self.values.next()) else {
            return Err(DecodeError::Exhausted);
        };

        if value.is_null() && !column.nullable {
            return Err(DecodeError::UnexpectedNull {
                column: column.name,
            });
        }

        T::from_value(column.name, value)
    }
}
