// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! SQL dialects supported by the maintenance engine
//!
//! A [`Dialect`] is selected once per backend, from its configured name, and
//! injected into the pagers and mutators of that backend. It knows how each
//! engine spells the few constructs the engine needs: placeholders, array
//! membership, bounded-staleness reads and prefix matching.

use std::{str::FromStr, sync::Arc, time::Duration};

use sweep_data_model::{ColumnType, Value};

use crate::ConfigurationError;

/// The SQL engines the maintenance engine knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    Postgres,
    Cockroach,
    Spanner,
}

impl DialectKind {
    /// The canonical name of the dialect, as used in the configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Cockroach => "cockroach",
            Self::Spanner => "spanner",
        }
    }
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgx" => Ok(Self::Postgres),
            "cockroach" | "cockroachdb" | "crdb" => Ok(Self::Cockroach),
            "spanner" => Ok(Self::Spanner),
            _ => Err(ConfigurationError::UnsupportedDialect(s.to_owned())),
        }
    }
}

/// How a dialect applies bulk writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// A single statement binding one array parameter per column
    ArrayStatement,

    /// A list of native mutations, applied in one tagged commit
    Mutations,
}

/// The dialect-specific parts of the SQL the engine renders
///
/// Statements are written with `?` placeholders and go through
/// [`Dialect::rebind`] once fully assembled.
pub trait Dialect: std::fmt::Debug + Send + Sync {
    /// Which engine this dialect targets
    fn kind(&self) -> DialectKind;

    /// The positional placeholder for the parameter at `index`, starting at 1
    fn placeholder(&self, index: usize) -> String;

    /// SQL fragment testing whether `column` is one of the values of an array
    /// parameter
    fn array_membership(&self, column: &str) -> String;

    /// SQL fragment placed right after the table name of a scanning read to
    /// allow slightly stale data. Empty if the dialect expresses staleness
    /// elsewhere or not at all.
    fn stale_read_clause(&self, staleness: Option<Duration>) -> String {
        let _ = staleness;
        String::new()
    }

    /// SQL fragment matching rows where the text `column` starts with
    /// `prefix`, along with the value to bind to its placeholder
    fn starts_with(&self, column: &str, prefix: &str) -> (String, Value);

    /// The SQL type of an array of `ty` values
    fn array_type(&self, ty: ColumnType) -> &'static str;

    /// How bulk writes are applied
    fn write_strategy(&self) -> WriteStrategy;

    /// Rewrite every `?` placeholder to the dialect positional syntax.
    ///
    /// Question marks inside single-quoted literals, double-quoted
    /// identifiers and comments are left untouched.
    fn rebind(&self, sql: &str) -> String {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Code,
            Literal,
            Identifier,
            LineComment,
            BlockComment,
        }

        let mut out = String::with_capacity(sql.len() + 8);
        let mut state = State::Code;
        let mut index = 0;
        let mut chars = sql.chars().peekable();

        while let Some(c) = chars.next() {
            match (state, c) {
                (State::Code, '?') => {
                    index += 1;
                    out.push_str(&self.placeholder(index));
                    continue;
                }
                (State::Code, '\'') => state = State::Literal,
                (State::Code, '"') => state = State::Identifier,
                (State::Code, '-') if chars.peek() == Some(&'-') => state = State::LineComment,
                (State::Code, '/') if chars.peek() == Some(&'*') => state = State::BlockComment,
                // A doubled quote is an escaped quote, and toggles the state
                // twice
                (State::Literal, '\'') | (State::Identifier, '"') => state = State::Code,
                (State::LineComment, '\n') => state = State::Code,
                (State::BlockComment, '*') if chars.peek() == Some(&'/') => {
                    out.push(c);
                    out.extend(chars.next());
                    state = State::Code;
                    continue;
                }
                _ => {}
            }

            out.push(c);
        }

        out
    }
}

/// Escape the `LIKE` wildcards of a literal prefix
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn postgres_array_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Uuid => "UUID[]",
        ColumnType::Text => "TEXT[]",
        ColumnType::Bytes => "BYTEA[]",
        ColumnType::BigInt => "INT8[]",
        ColumnType::Bool => "BOOL[]",
        ColumnType::Timestamp => "TIMESTAMPTZ[]",
    }
}

/// PostgreSQL
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn array_membership(&self, column: &str) -> String {
        format!("{column} = ANY(?)")
    }

    fn starts_with(&self, column: &str, prefix: &str) -> (String, Value) {
        let pattern = format!("{}%", escape_like(prefix));
        (format!("{column} LIKE ?"), Value::Text(pattern))
    }

    fn array_type(&self, ty: ColumnType) -> &'static str {
        postgres_array_type(ty)
    }

    fn write_strategy(&self) -> WriteStrategy {
        WriteStrategy::ArrayStatement
    }
}

/// CockroachDB, which speaks the PostgreSQL wire protocol and supports
/// follower reads
#[derive(Debug, Clone, Copy, Default)]
pub struct Cockroach;

impl Dialect for Cockroach {
    fn kind(&self) -> DialectKind {
        DialectKind::Cockroach
    }

    fn placeholder(&self, index: usize) -> String {
        Postgres.placeholder(index)
    }

    fn array_membership(&self, column: &str) -> String {
        Postgres.array_membership(column)
    }

    fn stale_read_clause(&self, staleness: Option<Duration>) -> String {
        match staleness.map(|d| d.as_millis()) {
            None | Some(0) => String::new(),
            Some(millis) => format!(" AS OF SYSTEM TIME '-{millis}ms'"),
        }
    }

    fn starts_with(&self, column: &str, prefix: &str) -> (String, Value) {
        Postgres.starts_with(column, prefix)
    }

    fn array_type(&self, ty: ColumnType) -> &'static str {
        postgres_array_type(ty)
    }

    fn write_strategy(&self) -> WriteStrategy {
        WriteStrategy::ArrayStatement
    }
}

/// Google Cloud Spanner, using the GoogleSQL dialect
///
/// Bounded-staleness reads are expressed as a timestamp bound on the read
/// itself, not in the SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spanner;

impl Dialect for Spanner {
    fn kind(&self) -> DialectKind {
        DialectKind::Spanner
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{index}")
    }

    fn array_membership(&self, column: &str) -> String {
        format!("{column} IN UNNEST(?)")
    }

    fn starts_with(&self, column: &str, prefix: &str) -> (String, Value) {
        (
            format!("STARTS_WITH({column}, ?)"),
            Value::Text(prefix.to_owned()),
        )
    }

    fn array_type(&self, ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::Uuid | ColumnType::Bytes => "ARRAY<BYTES>",
            ColumnType::Text => "ARRAY<STRING>",
            ColumnType::BigInt => "ARRAY<INT64>",
            ColumnType::Bool => "ARRAY<BOOL>",
            ColumnType::Timestamp => "ARRAY<TIMESTAMP>",
        }
    }

    fn write_strategy(&self) -> WriteStrategy {
        WriteStrategy::Mutations
    }
}

/// Get the dialect for an engine
#[must_use]
pub fn for_kind(kind: DialectKind) -> Arc<dyn Dialect> {
    match kind {
        DialectKind::Postgres => Arc::new(Postgres),
        DialectKind::Cockroach => Arc::new(Cockroach),
        DialectKind::Spanner => Arc::new(Spanner),
    }
}

/// Get the dialect from its configured name
///
/// # Errors
///
/// Returns [`ConfigurationError::UnsupportedDialect`] if the name is not
/// known
pub fn from_name(name: &str) -> Result<Arc<dyn Dialect>, ConfigurationError> {
    name.parse().map(for_kind)
}
