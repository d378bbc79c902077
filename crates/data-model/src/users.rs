// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use ulid::Ulid;

use crate::{
    Column, ColumnType, DecodeError, FromValue, Record, RowReader, TableSchema, Value,
};

/// The lifecycle status of a console user, stored as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// The user signed up but never verified their email address
    Inactive,
    Active,
    Deleted,
    PendingDeletion,
    LegalHold,
    PendingBotVerification,
}

#[derive(Debug, Error)]
#[error("unknown user status {0}")]
pub struct UnknownUserStatus(i64);

impl UserStatus {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Inactive => 0,
            Self::Active => 1,
            Self::Deleted => 2,
            Self::PendingDeletion => 3,
            Self::LegalHold => 4,
            Self::PendingBotVerification => 5,
        }
    }
}

impl TryFrom<i64> for UserStatus {
    type Error = UnknownUserStatus;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Inactive),
            1 => Ok(Self::Active),
            2 => Ok(Self::Deleted),
            3 => Ok(Self::PendingDeletion),
            4 => Ok(Self::LegalHold),
            5 => Ok(Self::PendingBotVerification),
            other => Err(UnknownUserStatus(other)),
        }
    }
}

impl From<UserStatus> for Value {
    fn from(value: UserStatus) -> Self {
        Self::BigInt(value.as_i64())
    }
}

impl FromValue for UserStatus {
    const COLUMN_TYPE: ColumnType = ColumnType::BigInt;

    fn from_value(column: &'static str, value: Value) -> Result<Self, DecodeError> {
        let raw = i64::from_value(column, value)?;
        Self::try_from(raw).map_err(|e| DecodeError::invalid(column, e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Ulid,
    pub email: String,
    pub full_name: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Returns `true` if the user never verified their account and signed up
    /// before `before`
    #[must_use]
    pub fn is_unverified_before(&self, before: DateTime<Utc>) -> bool {
        self.status == UserStatus::Inactive && self.created_at < before
    }

    #[doc(hidden)]
    #[must_use]
    pub fn samples(now: DateTime<Utc>, rng: &mut impl Rng) -> Vec<Self> {
        vec![
            Self {
                id: Ulid::from_datetime_with_source(now.into(), rng),
                email: "john@example.com".to_owned(),
                full_name: "John Doe".to_owned(),
                status: UserStatus::Active,
                created_at: now,
            },
            Self {
                id: Ulid::from_datetime_with_source(now.into(), rng),
                email: "jane@example.com".to_owned(),
                full_name: "Jane Doe".to_owned(),
                status: UserStatus::Inactive,
                created_at: now,
            },
        ]
    }
}

pub static USERS: TableSchema = TableSchema {
    table: "users",
    key: "id",
    columns: &[
        Column::new("id", ColumnType::Uuid),
        Column::new("email", ColumnType::Text).mutable(),
        Column::new("full_name", ColumnType::Text).mutable(),
        Column::new("status", ColumnType::BigInt).mutable(),
        Column::new("created_at", ColumnType::Timestamp),
    ],
};

impl Record for User {
    type Key = Ulid;
    const SCHEMA: &'static TableSchema = &USERS;

    fn key(&self) -> Ulid {
        self.id
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.email.clone().into(),
            self.full_name.clone().into(),
            self.status.into(),
            self.created_at.into(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, DecodeError> {
        let mut row = RowReader::new(Self::SCHEMA, values)?;
        Ok(Self {
            id: row.read()?,
            email: row.read()?,
            full_name: row.read()?,
            status: row.read()?,
            created_at: row.read()?,
        })
    }
}
