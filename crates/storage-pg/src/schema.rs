// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Checks that a live database matches the tables the maintenance jobs
//! expect to scan and mutate

use std::collections::HashMap;

use sqlx::PgPool;
use sweep_data_model::{ColumnType, TableSchema};
use sweep_storage::DialectKind;
use thiserror::Error;

use crate::{DatabaseError, tracing::ExecuteExt};

/// A difference between a declared [`TableSchema`] and the live table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaDrift {
    #[error("table {table:?} does not exist")]
    MissingTable { table: &'static str },

    #[error("column {table}.{column} does not exist")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("column {table}.{column} has type {actual:?}, expected {expected:?}")]
    WrongType {
        table: &'static str,
        column: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("column {table}.{column} is nullable in the database but not in the schema")]
    UnexpectedlyNullable {
        table: &'static str,
        column: &'static str,
    },

    #[error("column {table}.{column} is not nullable in the database but the schema allows it")]
    UnexpectedlyNotNull {
        table: &'static str,
        column: &'static str,
    },

    #[error("key column {table}.{column} has no unique constraint")]
    KeyNotUnique {
        table: &'static str,
        column: &'static str,
    },
}

/// A column as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LiveColumn {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
}

/// The `information_schema` name of a column type, as reported by both
/// PostgreSQL and CockroachDB
const fn information_schema_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Uuid => "uuid",
        ColumnType::Text => "text",
        ColumnType::Bytes => "bytea",
        ColumnType::BigInt => "bigint",
        ColumnType::Bool => "boolean",
        ColumnType::Timestamp => "timestamp with time zone",
    }
}

/// Guess the engine from the output of `SELECT version()`
#[must_use]
pub fn engine_from_version(version: &str) -> DialectKind {
    if version.starts_with("CockroachDB") {
        DialectKind::Cockroach
    } else {
        DialectKind::Postgres
    }
}

/// Compare the declared schema with the columns of the live table
///
/// Extra columns in the live table are fine, the engine only touches the ones
/// it declares.
pub(crate) fn compare(
    schema: &TableSchema,
    live: &[LiveColumn],
    key_is_unique: bool,
) -> Vec<SchemaDrift> {
    let table = schema.table;
    if live.is_empty() {
        return vec![SchemaDrift::MissingTable { table }];
    }

    let live: HashMap<&str, &LiveColumn> = live
        .iter()
        .map(|column| (column.column_name.as_str(), column))
        .collect();

    let mut drifts = Vec::new();
    for declared in schema.columns {
        let column = declared.name;
        let Some(found) = live.get(column) else {
            drifts.push(SchemaDrift::MissingColumn { table, column });
            continue;
        };

        let expected = information_schema_type(declared.ty);
        if !found.data_type.eq_ignore_ascii_case(expected) {
            drifts.push(SchemaDrift::WrongType {
                table,
                column,
                expected,
                actual: found.data_type.clone(),
            });
        }

        match (declared.nullable, found.is_nullable.eq_ignore_ascii_case("YES")) {
            (false, true) => drifts.push(SchemaDrift::UnexpectedlyNullable { table, column }),
            (true, false) => drifts.push(SchemaDrift::UnexpectedlyNotNull { table, column }),
            _ => {}
        }
    }

    if live.contains_key(schema.key) && !key_is_unique {
        drifts.push(SchemaDrift::KeyNotUnique {
            table,
            column: schema.key,
        });
    }

    drifts
}

/// Ask the server which engine it runs
///
/// # Errors
///
/// Returns an error if the query fails
#[tracing::instrument(name = "db.server_engine", skip_all, fields(db.query.text), err)]
pub async fn server_engine(pool: &PgPool) -> Result<DialectKind, DatabaseError> {
    let version: String = sqlx::query_scalar("SELECT version()")
        .traced(DialectKind::Postgres)
        .fetch_one(pool)
        .await?;

    Ok(engine_from_version(&version))
}

/// Check a table of the current schema against its declaration
///
/// # Errors
///
/// Returns an error if the `information_schema` queries fail
#[tracing::instrument(
    name = "db.check_schema",
    skip_all,
    fields(db.collection.name = schema.table, db.query.text),
    err,
)]
pub async fn check_schema(
    pool: &PgPool,
    schema: &TableSchema,
) -> Result<Vec<SchemaDrift>, DatabaseError> {
    let live: Vec<(String, String, String)> = sqlx::query_as(
        r"
            SELECT column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name = $1
        ",
    )
    .bind(schema.table)
    .traced(DialectKind::Postgres)
    .fetch_all(pool)
    .await?;
    let live: Vec<LiveColumn> = live
        .into_iter()
        .map(|(column_name, data_type, is_nullable)| LiveColumn {
            column_name,
            data_type,
            is_nullable,
        })
        .collect();

    let unique_constraints: i64 = sqlx::query_scalar(
        r"
            SELECT COUNT(*)
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_schema = tc.constraint_schema
             AND kcu.constraint_name = tc.constraint_name
             AND kcu.table_name = tc.table_name
            WHERE tc.table_schema = current_schema()
              AND tc.table_name = $1
              AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')
              AND kcu.column_name = $2
        ",
    )
    .bind(schema.table)
    .bind(schema.key)
    .fetch_one(pool)
    .await?;

    Ok(compare(schema, &live, unique_constraints > 0))
}
