// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use ulid::Ulid;

use crate::{Column, ColumnType, DecodeError, Record, RowReader, TableSchema, Value};

/// An API key, as stored in the `api_keys` table
///
/// The secret part of the key is never stored, only its `head`, which is
/// what incoming requests are matched against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKey {
    pub id: Ulid,
    pub project_id: Ulid,
    pub head: Vec<u8>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Returns `true` if the key was created more than `lifetime` ago
    #[must_use]
    pub fn is_expired(&self, lifetime: Duration, now: DateTime<Utc>) -> bool {
        self.created_at
            .checked_add_signed(lifetime)
            .is_some_and(|expires_at| now > expires_at)
    }

    #[doc(hidden)]
    #[must_use]
    pub fn samples(now: DateTime<Utc>, rng: &mut impl Rng) -> Vec<Self> {
        vec![
            Self {
                id: Ulid::from_datetime_with_source(now.into(), rng),
                project_id: Ulid::from_datetime_with_source(now.into(), rng),
                head: b"head-1".to_vec(),
                name: "default".to_owned(),
                created_at: now,
            },
            Self {
                id: Ulid::from_datetime_with_source(now.into(), rng),
                project_id: Ulid::from_datetime_with_source(now.into(), rng),
                head: b"head-2".to_vec(),
                name: "trial-key".to_owned(),
                created_at: now,
            },
        ]
    }
}

pub static API_KEYS: TableSchema = TableSchema {
    table: "api_keys",
    key: "id",
    columns: &[
        Column::new("id", ColumnType::Uuid),
        Column::new("project_id", ColumnType::Uuid),
        Column::new("head", ColumnType::Bytes),
        Column::new("name", ColumnType::Text).mutable(),
        Column::new("created_at", ColumnType::Timestamp),
    ],
};

impl Record for ApiKey {
    type Key = Ulid;
    const SCHEMA: &'static TableSchema = &API_KEYS;

    fn key(&self) -> Ulid {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.project_id.into(),
            self.head.clone().into(),
            self.name.clone().into(),
            self.created_at.into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, DecodeError> {
        let mut row = RowReader::new(Self::SCHEMA, values)?;
        Ok(Self {
            id: row.read()?,
            project_id: row.read()?,
            head: row.read()?,
            name: row.read()?,
            created_at: row.read()?,
        })
    }
}

/// When an API key was first and last used, as stored in the
/// `api_key_usage` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyUsage {
    pub api_key_id: Ulid,
    pub project_id: Ulid,
    pub first_used_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl ApiKeyUsage {
    /// A usage row for a key which was seen for the first time at `now`
    #[must_use]
    pub fn new(api_key_id: Ulid, project_id: Ulid, now: DateTime<Utc>) -> Self {
        Self {
            api_key_id,
            project_id,
            first_used_at: now,
            last_used_at: now,
        }
    }
}

pub static API_KEY_USAGE: TableSchema = TableSchema {
    table: "api_key_usage",
    key: "api_key_id",
    columns: &[
        Column::new("api_key_id", ColumnType::Uuid),
        Column::new("project_id", ColumnType::Uuid),
        Column::new("first_used_at", ColumnType::Timestamp),
        Column::new("last_used_at", ColumnType::Timestamp).mutable(),
    ],
};

impl Record for ApiKeyUsage {
    type Key = Ulid;
    const SCHEMA: &'static TableSchema = &API_KEY_USAGE;

    fn key(&self) -> Ulid {
        self.api_key_id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.api_key_id.into(),
            self.project_id.into(),
            self.first_used_at.into(),
            self.last_used_at.into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, DecodeError> {
        let mut row = RowReader::new(Self::SCHEMA, values)?;
        Ok(Self {
            api_key_id: row.read()?,
            project_id: row.read()?,
            first_used_at: row.read()?,
            last_used_at: row.read()?,
        })
    }
}
