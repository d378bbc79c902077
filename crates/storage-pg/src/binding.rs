// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Conversion between engine-agnostic values and `sqlx` parameters and rows

use chrono::{DateTime, Utc};
use sqlx::{
    Postgres, Row,
    postgres::{PgArguments, PgRow},
    query::Query,
};
use sweep_data_model::{ColumnType, DecodeError, TableSchema, Value};
use sweep_storage::{
    LogicError,
    statement::{Param, Statement},
};
use uuid::Uuid;

pub(crate) type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn mismatch(column: &'static str, expected: ColumnType, value: &Value) -> LogicError {
    LogicError::TypeMismatch {
        column,
        expected,
        actual: value.type_name(),
    }
}

/// Collect the elements of an array parameter, which must all be of the type
/// `ty` or `NULL`
fn array_of<T>(
    ty: ColumnType,
    values: Vec<Value>,
    extract: impl Fn(Value) -> Result<T, Value>,
) -> Result<Vec<Option<T>>, LogicError> {
    values
        .into_iter()
        .map(|value| {
            if value.is_null() {
                return Ok(None);
            }
            extract(value)
                .map(Some)
                .map_err(|value| mismatch("array element", ty, &value))
        })
        .collect()
}

/// Bind a parameter to a query
pub(crate) fn bind(query: PgQuery<'_>, param: Param) -> Result<PgQuery<'_>, LogicError> {
    let query = match param {
        Param::Scalar(Value::Null) => {
            return Err(LogicError::UnboundNull { column: "parameter" });
        }
        Param::Scalar(Value::Uuid(v)) => query.bind(v),
        Param::Scalar(Value::Text(v)) => query.bind(v),
        Param::Scalar(Value::Bytes(v)) => query.bind(v),
        Param::Scalar(Value::BigInt(v)) => query.bind(v),
        Param::Scalar(Value::Bool(v)) => query.bind(v),
        Param::Scalar(Value::Timestamp(v)) => query.bind(v),

        Param::Array(ty @ ColumnType::Uuid, values) => query.bind(array_of(ty, values, |v| {
            if let Value::Uuid(v) = v { Ok(v) } else { Err(v) }
        })?),
        Param::Array(ty @ ColumnType::Text, values) => query.bind(array_of(ty, values, |v| {
            if let Value::Text(v) = v { Ok(v) } else { Err(v) }
        })?),
        Param::Array(ty @ ColumnType::Bytes, values) => query.bind(array_of(ty, values, |v| {
            if let Value::Bytes(v) = v { Ok(v) } else { Err(v) }
        })?),
        Param::Array(ty @ ColumnType::BigInt, values) => query.bind(array_of(ty, values, |v| {
            if let Value::BigInt(v) = v { Ok(v) } else { Err(v) }
        })?),
        Param::Array(ty @ ColumnType::Bool, values) => query.bind(array_of(ty, values, |v| {
            if let Value::Bool(v) = v { Ok(v) } else { Err(v) }
        })?),
        Param::Array(ty @ ColumnType::Timestamp, values) => {
            query.bind(array_of(ty, values, |v| {
                if let Value::Timestamp(v) = v { Ok(v) } else { Err(v) }
            })?)
        }
    };

    Ok(query)
}

/// Turn a rendered statement into a query, binding all its parameters
pub(crate) fn prepare(statement: &Statement) -> Result<PgQuery<'_>, LogicError> {
    statement
        .params
        .iter()
        .cloned()
        .try_fold(sqlx::query(&statement.sql), bind)
}

/// Decode a row into one value per column of the schema
pub(crate) fn decode_row(schema: &TableSchema, row: &PgRow) -> Result<Vec<Value>, DecodeError> {
    schema
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let invalid = |e: sqlx::Error| DecodeError::invalid(column.name, e);
            let value = match column.ty {
                ColumnType::Uuid => row.try_get::<Option<Uuid>, _>(index).map_err(invalid)?.into(),
                ColumnType::Text => row
                    .try_get::<Option<String>, _>(index)
                    .map_err(invalid)?
                    .into(),
                ColumnType::Bytes => row
                    .try_get::<Option<Vec<u8>>, _>(index)
                    .map_err(invalid)?
                    .into(),
                ColumnType::BigInt => row.try_get::<Option<i64>, _>(index).map_err(invalid)?.into(),
                ColumnType::Bool => row.try_get::<Option<bool>, _>(index).map_err(invalid)?.into(),
                ColumnType::Timestamp => row
                    .try_get::<Option<DateTime<Utc>>, _>(index)
                    .map_err(invalid)?
                    .into(),
            };
            Ok(value)
        })
        .collect()
}
