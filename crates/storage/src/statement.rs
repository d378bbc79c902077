// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Rendering of the statements issued by the maintenance engine
//!
//! Statements are rendered from a [`TableSchema`] and a [`Dialect`], with
//! every value bound as a parameter. Column and table names only ever come
//! from the static schemas.

use std::{collections::HashSet, time::Duration};

use sweep_data_model::{Column, ColumnType, TableSchema, Value};

use crate::{
    Dialect, LogicError, WriteKind,
    dialect::WriteStrategy,
    filter::{Condition, ScanFilter},
};

/// A parameter bound to a [`Statement`]
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(Value),

    /// An array of values of the same type. `NULL` elements are allowed.
    Array(ColumnType, Vec<Value>),
}

/// A rendered SQL statement and its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

fn key_column(schema: &'static TableSchema) -> Result<(usize, &'static Column), LogicError> {
    schema.key_column().ok_or(LogicError::MissingKeyColumn {
        table: schema.table,
    })
}

fn check_type(column: &'static Column, value: &Value) -> Result<(), LogicError> {
    match value.column_type() {
        Some(ty) if ty == column.ty => Ok(()),
        None if column.nullable => Ok(()),
        None => Err(LogicError::UnboundNull {
            column: column.name,
        }),
        Some(_) => Err(LogicError::TypeMismatch {
            column: column.name,
            expected: column.ty,
            actual: value.type_name(),
        }),
    }
}

fn render_condition(
    dialect: &dyn Dialect,
    schema: &'static TableSchema,
    condition: &Condition,
    params: &mut Vec<Param>,
) -> Result<String, LogicError> {
    let (_, column) = schema
        .column(condition.column())
        .ok_or(LogicError::UnknownColumn {
            table: schema.table,
            column: condition.column(),
        })?;

    let (op, value) = match condition {
        Condition::IsNull(_) => return Ok(format!("{} IS NULL", column.name)),
        Condition::StartsWith(_, prefix) => {
            if column.ty != ColumnType::Text {
                return Err(LogicError::TypeMismatch {
                    column: column.name,
                    expected: column.ty,
                    actual: ColumnType::Text.name(),
                });
            }
            let (sql, value) = dialect.starts_with(column.name, prefix);
            params.push(Param::Scalar(value));
            return Ok(sql);
        }
        Condition::Eq(_, value) => ("=", value),
        Condition::Lt(_, value) => ("<", value),
        Condition::Gt(_, value) => (">", value),
    };

    // Comparing with NULL is never true in SQL, use an IS NULL condition
    if value.is_null() {
        return Err(LogicError::UnboundNull {
            column: column.name,
        });
    }
    check_type(column, value)?;

    params.push(Param::Scalar(value.clone()));
    Ok(format!("{} {op} ?", column.name))
}

/// Render the read of one page of rows, strictly after the `after` cursor,
/// in ascending key order
///
/// # Errors
///
/// Returns a [`LogicError`] if the cursor or the filter don't match the
/// schema
pub fn select_page(
    dialect: &dyn Dialect,
    schema: &'static TableSchema,
    after: Value,
    filter: &ScanFilter,
    limit: usize,
    staleness: Option<Duration>,
) -> Result<Statement, LogicError> {
    let (_, key) = key_column(schema)?;
    check_type(key, &after)?;
    if after.is_null() {
        return Err(LogicError::UnboundNull { column: key.name });
    }

    let mut params = vec![Param::Scalar(after)];
    let mut conditions = vec![format!("{} > ?", key.name)];
    for condition in filter.conditions() {
        conditions.push(render_condition(dialect, schema, condition, &mut params)?);
    }
    params.push(Param::Scalar(Value::BigInt(
        i64::try_from(limit).unwrap_or(i64::MAX),
    )));

    let sql = format!(
        "SELECT {columns} FROM {table}{stale} WHERE {conditions} ORDER BY {key} LIMIT ?",
        columns = schema.column_names().collect::<Vec<_>>().join(", "),
        table = schema.table,
        stale = dialect.stale_read_clause(staleness),
        conditions = conditions.join(" AND "),
        key = key.name,
    );

    Ok(Statement {
        sql: dialect.rebind(&sql),
        params,
    })
}

/// Render the read of the single row where `column` equals `value`
///
/// # Errors
///
/// Returns a [`LogicError`] if the column is unknown or the value doesn't
/// match its type
pub fn select_one(
    dialect: &dyn Dialect,
    schema: &'static TableSchema,
    column: &'static str,
    value: Value,
) -> Result<Statement, LogicError> {
    let mut params = Vec::with_capacity(1);
    let condition = render_condition(
        dialect,
        schema,
        &Condition::Eq(column, value),
        &mut params,
    )?;

    let sql = format!(
        "SELECT {columns} FROM {table} WHERE {condition} LIMIT 1",
        columns = schema.column_names().collect::<Vec<_>>().join(", "),
        table = schema.table,
    );

    Ok(Statement {
        sql: dialect.rebind(&sql),
        params,
    })
}

/// Render the deletion of a set of rows by their keys, as a single statement
/// binding the keys as one array parameter
///
/// # Errors
///
/// Returns a [`LogicError`] if a key doesn't match the type of the key column
pub fn delete_keys(
    dialect: &dyn Dialect,
    schema: &'static TableSchema,
    keys: Vec<Value>,
) -> Result<Statement, LogicError> {
    let (_, key) = key_column(schema)?;
    for value in &keys {
        if value.is_null() {
            return Err(LogicError::UnboundNull { column: key.name });
        }
        check_type(key, value)?;
    }

    let sql = format!(
        "DELETE FROM {table} WHERE {membership}",
        table = schema.table,
        membership = dialect.array_membership(key.name),
    );

    Ok(Statement {
        sql: dialect.rebind(&sql),
        params: vec![Param::Array(key.ty, keys)],
    })
}

/// Check a batch of rows against the schema before it is written.
///
/// Rows must have one value per column, of the right type, and the table
/// must have at least one column to overwrite.
///
/// # Errors
///
/// Returns a [`LogicError`] describing the first problem found
pub fn validate_upsert_rows(
    schema: &'static TableSchema,
    rows: &[Vec<Value>],
) -> Result<(), LogicError> {
    key_column(schema)?;
    if schema.mutable_columns().next().is_none() {
        return Err(LogicError::NoMutableColumns {
            table: schema.table,
        });
    }

    for row in rows {
        if row.len() != schema.columns.len() {
            return Err(LogicError::ColumnCountMismatch {
                table: schema.table,
                expected: schema.columns.len(),
                actual: row.len(),
            });
        }

        for (column, value) in schema.columns.iter().zip(row) {
            check_type(column, value)?;
        }
    }

    Ok(())
}

/// Check that no two rows of a batch share the same key
///
/// # Errors
///
/// Returns [`LogicError::DuplicateKeyInBatch`] with the first repeated key
pub fn ensure_unique_keys(
    schema: &'static TableSchema,
    rows: &[Vec<Value>],
) -> Result<(), LogicError> {
    let (key_index, _) = key_column(schema)?;
    let mut seen = HashSet::with_capacity(rows.len());
    for key in rows.iter().filter_map(|row| row.get(key_index)) {
        if !seen.insert(key) {
            return Err(LogicError::DuplicateKeyInBatch {
                table: schema.table,
                key: format!("{key:?}"),
            });
        }
    }

    Ok(())
}

/// Render an insert-or-update of a batch of rows, as a single statement
/// binding one array parameter per column.
///
/// Existing rows only get their mutable columns overwritten.
///
/// # Errors
///
/// Returns a [`LogicError`] if the dialect applies writes as native mutations
/// or if the rows don't pass [`validate_upsert_rows`] and
/// [`ensure_unique_keys`]. A single `ON CONFLICT` statement can't touch the
/// same row twice.
pub fn upsert_unnest(
    dialect: &dyn Dialect,
    schema: &'static TableSchema,
    rows: &[Vec<Value>],
) -> Result<Statement, LogicError> {
    if dialect.write_strategy() != WriteStrategy::ArrayStatement {
        return Err(LogicError::UnsupportedWrite {
            dialect: dialect.kind(),
            kind: WriteKind::UpsertOverwrite,
        });
    }
    validate_upsert_rows(schema, rows)?;
    ensure_unique_keys(schema, rows)?;

    let mut columns: Vec<Vec<Value>> = schema
        .columns
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();
    for row in rows {
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value.clone());
        }
    }

    let arrays = schema
        .columns
        .iter()
        .map(|column| format!("?::{}", dialect.array_type(column.ty)))
        .collect::<Vec<_>>()
        .join(", ");

    let updates = schema
        .mutable_columns()
        .map(|column| format!("{0} = EXCLUDED.{0}", column.name))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO {table} ({columns}) SELECT * FROM UNNEST({arrays}) ON CONFLICT ({key}) DO UPDATE SET {updates}",
        table = schema.table,
        columns = schema.column_names().collect::<Vec<_>>().join(", "),
        key = schema.key,
    );

    let params = schema
        .columns
        .iter()
        .zip(columns)
        .map(|(column, values)| Param::Array(column.ty, values))
        .collect();

    Ok(Statement {
        sql: dialect.rebind(&sql),
        params,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use sweep_data_model::{Column, Ulid};

    use super::*;
    use crate::dialect::{Cockroach, Postgres, Spanner};

    static SCHEMA: TableSchema = TableSchema {
        table: "api_key_usage",
        key: "api_key_id",
        columns: &[
            Column::new("api_key_id", ColumnType::Uuid),
            Column::new("label", ColumnType::Text).nullable(),
            Column::new("last_used_at", ColumnType::BigInt).mutable(),
        ],
    };

    static IMMUTABLE: TableSchema = TableSchema {
        table: "frozen",
        key: "id",
        columns: &[Column::new("id", ColumnType::BigInt)],
    };

    fn row(id: u128, label: Option<&str>, last_used_at: i64) -> Vec<Value> {
        vec![
            Ulid(id).into(),
            label.map(ToOwned::to_owned).into(),
            last_used_at.into(),
        ]
    }

    #[test]
    fn test_select_page_postgres() {
        let filter = ScanFilter::all().starts_with("label", "trial").lt("last_used_at", 50_i64);
        let statement = select_page(
            &Postgres,
            &SCHEMA,
            Ulid::nil().into(),
            &filter,
            100,
            Some(Duration::from_secs(10)),
        )
        .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT api_key_id, label, last_used_at FROM api_key_usage \
             WHERE api_key_id > $1 AND label LIKE $2 AND last_used_at < $3 \
             ORDER BY api_key_id LIMIT $4"
        );
        assert_eq!(
            statement.params,
            vec![
                Param::Scalar(Ulid::nil().into()),
                Param::Scalar("trial%".into()),
                Param::Scalar(Value::BigInt(50)),
                Param::Scalar(Value::BigInt(100)),
            ]
        );
    }

    #[test]
    fn test_select_page_cockroach_reads_stale_data() {
        let statement = select_page(
            &Cockroach,
            &SCHEMA,
            Ulid::nil().into(),
            &ScanFilter::all(),
            10,
            Some(Duration::from_secs(10)),
        )
        .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT api_key_id, label, last_used_at FROM api_key_usage \
             AS OF SYSTEM TIME '-10000ms' WHERE api_key_id > $1 \
             ORDER BY api_key_id LIMIT $2"
        );
    }

    #[test]
    fn test_select_page_spanner() {
        let filter = ScanFilter::all().starts_with("label", "trial").is_null("label");
        let statement = select_page(
            &Spanner,
            &SCHEMA,
            Ulid::nil().into(),
            &filter,
            10,
            Some(Duration::from_secs(10)),
        )
        .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT api_key_id, label, last_used_at FROM api_key_usage \
             WHERE api_key_id > @p1 AND STARTS_WITH(label, @p2) AND label IS NULL \
             ORDER BY api_key_id LIMIT @p3"
        );
    }

    #[test]
    fn test_select_page_rejects_bad_filters() {
        let cursor: Value = Ulid::nil().into();

        let filter = ScanFilter::all().eq("nope", 1_i64);
        assert_matches!(
            select_page(&Postgres, &SCHEMA, cursor.clone(), &filter, 10, None),
            Err(LogicError::UnknownColumn { column: "nope", .. })
        );

        let filter = ScanFilter::all().eq("label", Value::Null);
        assert_matches!(
            select_page(&Postgres, &SCHEMA, cursor.clone(), &filter, 10, None),
            Err(LogicError::UnboundNull { column: "label" })
        );

        let filter = ScanFilter::all().lt("last_used_at", "yesterday");
        assert_matches!(
            select_page(&Postgres, &SCHEMA, cursor, &filter, 10, None),
            Err(LogicError::TypeMismatch {
                column: "last_used_at",
                ..
            })
        );

        assert_matches!(
            select_page(&Postgres, &SCHEMA, Value::BigInt(0), &ScanFilter::all(), 10, None),
            Err(LogicError::TypeMismatch {
                column: "api_key_id",
                ..
            })
        );
    }

    #[test]
    fn test_select_one() {
        let statement =
            select_one(&Postgres, &SCHEMA, "label", Value::from("hello")).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT api_key_id, label, last_used_at FROM api_key_usage WHERE label = $1 LIMIT 1"
        );
        assert_eq!(statement.params, vec![Param::Scalar("hello".into())]);
    }

    #[test]
    fn test_duplicate_keys() {
        assert!(ensure_unique_keys(&SCHEMA, &[row(1, None, 1), row(2, None, 1)]).is_ok());
        assert_matches!(
            ensure_unique_keys(&SCHEMA, &[row(1, None, 1), row(2, None, 1), row(1, None, 2)]),
            Err(LogicError::DuplicateKeyInBatch {
                table: "api_key_usage",
                ..
            })
        );

        // Validating the shape of the rows alone lets them through
        assert!(validate_upsert_rows(&SCHEMA, &[row(1, None, 1), row(1, None, 2)]).is_ok());
    }

    #[test]
    fn test_delete_keys() {
        let keys = vec![Ulid(1).into(), Ulid(2).into()];

        let statement = delete_keys(&Postgres, &SCHEMA, keys.clone()).unwrap();
        assert_eq!(
            statement.sql,
            "DELETE FROM api_key_usage WHERE api_key_id = ANY($1)"
        );
        assert_eq!(
            statement.params,
            vec![Param::Array(ColumnType::Uuid, keys.clone())]
        );

        let statement = delete_keys(&Spanner, &SCHEMA, keys).unwrap();
        assert_eq!(
            statement.sql,
            "DELETE FROM api_key_usage WHERE api_key_id IN UNNEST(@p1)"
        );
    }

    #[test]
    fn test_upsert_unnest() {
        let rows = vec![row(1, Some("a"), 10), row(2, None, 20)];
        let statement = upsert_unnest(&Postgres, &SCHEMA, &rows).unwrap();

        assert_eq!(
            statement.sql,
            "INSERT INTO api_key_usage (api_key_id, label, last_used_at) \
             SELECT * FROM UNNEST($1::UUID[], $2::TEXT[], $3::INT8[]) \
             ON CONFLICT (api_key_id) DO UPDATE SET last_used_at = EXCLUDED.last_used_at"
        );
        assert_eq!(
            statement.params,
            vec![
                Param::Array(ColumnType::Uuid, vec![Ulid(1).into(), Ulid(2).into()]),
                Param::Array(ColumnType::Text, vec!["a".into(), Value::Null]),
                Param::Array(ColumnType::BigInt, vec![10_i64.into(), 20_i64.into()]),
            ]
        );
    }

    #[test]
    fn test_upsert_rejections() {
        assert_matches!(
            upsert_unnest(&Spanner, &SCHEMA, &[row(1, None, 1)]),
            Err(LogicError::UnsupportedWrite {
                kind: WriteKind::UpsertOverwrite,
                ..
            })
        );

        assert_matches!(
            upsert_unnest(&Postgres, &IMMUTABLE, &[vec![Value::BigInt(1)]]),
            Err(LogicError::NoMutableColumns { table: "frozen" })
        );

        assert_matches!(
            upsert_unnest(&Postgres, &SCHEMA, &[row(1, None, 1), row(1, None, 2)]),
            Err(LogicError::DuplicateKeyInBatch { .. })
        );

        assert_matches!(
            upsert_unnest(&Postgres, &SCHEMA, &[vec![Ulid(1).into()]]),
            Err(LogicError::ColumnCountMismatch {
                expected: 3,
                actual: 1,
                ..
            })
        );

        let mut bad = row(1, None, 1);
        bad[2] = Value::Null;
        assert_matches!(
            upsert_unnest(&Cockroach, &SCHEMA, &[bad]),
            Err(LogicError::UnboundNull {
                column: "last_used_at"
            })
        );
    }
}
