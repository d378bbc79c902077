// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use crate::ColumnType;

/// A column of a table, as seen by the maintenance engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// The name of the column in the database
    pub name: &'static str,

    /// The type of values stored in the column
    pub ty: ColumnType,

    /// Whether the column accepts `NULL` values
    pub nullable: bool,

    /// Whether an upsert is allowed to overwrite an existing value in this
    /// column. Immutable columns are only written when the row is first
    /// inserted.
    pub mutable: bool,
}

impl Column {
    /// A new non-nullable, immutable column
    #[must_use]
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            mutable: false,
        }
    }

    /// Mark the column as nullable
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark the column as mutable
    #[must_use]
    pub const fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }
}

/// The shape of a table the maintenance engine can scan and mutate
///
/// The `key` column must be unique and totally ordered, as it is used as the
/// pagination cursor.
#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    /// The name of the table
    pub table: &'static str,

    /// The name of the unique ordering key column
    pub key: &'static str,

    /// All the columns read and written by the engine, in order
    pub columns: &'static [Column],
}

impl TableSchema {
    /// Find the position and definition of a column by its name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<(usize, &'static Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, column)| column.name == name)
    }

    /// The position and definition of the key column, if it is part of the
    /// declared columns
    #[must_use]
    pub fn key_column(&self) -> Option<(usize, &'static Column)> {
        self.column(self.key)
    }

    /// Iterate over the names of all the columns
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + use<> {
        let columns: &'static [Column] = self.columns;
        columns.iter().map(|column| column.name)
    }

    /// Iterate over the columns an upsert may overwrite. The key column is
    /// never part of them, even if flagged as mutable.
    pub fn mutable_columns(&self) -> impl Iterator<Item = &'static Column> + use<> {
        let columns: &'static [Column] = self.columns;
        let key = self.key;
        columns
            .iter()
            .filter(move |column| column.mutable && column.name != key)
    }
}
