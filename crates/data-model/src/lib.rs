// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

#![allow(clippy::module_name_repetitions)]

mod api_keys;
pub mod clock;
mod record;
mod schema;
mod sessions;
mod users;
mod value;

pub use ulid::Ulid;
pub use uuid::Uuid;

pub use self::{
    api_keys::{API_KEY_USAGE, API_KEYS, ApiKey, ApiKeyUsage},
    clock::{Clock, MockClock, SystemClock},
    record::{CursorKey, DecodeError, FromValue, Record, RowReader},
    schema::{Column, TableSchema},
    sessions::{WEBAPP_SESSIONS, WebappSession},
    users::{USERS, UnknownUserStatus, User, UserStatus},
    value::{ColumnType, Value},
};
