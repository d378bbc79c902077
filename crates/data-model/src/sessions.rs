// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use ulid::Ulid;

use crate::{Column, ColumnType, DecodeError, Record, RowReader, TableSchema, Value};

/// A browser session on the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebappSession {
    pub id: Ulid,
    pub user_id: Ulid,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl WebappSession {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    #[doc(hidden)]
    #[must_use]
    pub fn samples(now: DateTime<Utc>, rng: &mut impl Rng) -> Vec<Self> {
        let user_id = Ulid::from_datetime_with_source(now.into(), rng);
        vec![
            Self {
                id: Ulid::from_datetime_with_source(now.into(), rng),
                user_id,
                ip_address: "192.0.2.1".to_owned(),
                user_agent: Some("Mozilla/5.0".to_owned()),
                expires_at: now - Duration::hours(1),
            },
            Self {
                id: Ulid::from_datetime_with_source(now.into(), rng),
                user_id,
                ip_address: "192.0.2.2".to_owned(),
                user_agent: None,
                expires_at: now + Duration::days(7),
            },
        ]
    }
}

pub static WEBAPP_SESSIONS: TableSchema = TableSchema {
    table: "webapp_sessions",
    key: "id",
    columns: &[
        Column::new("id", ColumnType::Uuid),
        Column::new("user_id", ColumnType::Uuid),
        Column::new("ip_address", ColumnType::Text),
        Column::new("user_agent", ColumnType::Text).nullable(),
        Column::new("expires_at", ColumnType::Timestamp).mutable(),
    ],
};

impl Record for WebappSession {
    type Key = Ulid;
    const SCHEMA: &'static TableSchema = &WEBAPP_SESSIONS;

    fn key(&self) -> Ulid {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.user_id.into(),
            self.ip_address.clone().into(),
            self.user_agent.clone().into(),
            self.expires_at.into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, DecodeError> {
        let mut row = RowReader::new(Self::SCHEMA, values)?;
        Ok(Self {
            id: row.read()?,
            user_id: row.read()?,
            ip_address: row.read()?,
            user_agent: row.read()?,
            expires_at: row.read()?,
        })
    }
}
