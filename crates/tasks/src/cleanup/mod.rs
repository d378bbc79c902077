// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Database cleanup targets
//!
//! Each function here builds the [`MaintenanceTarget`] of one cleanup job.
//! Cutoffs which depend on the current time are computed when the target is
//! built, so a target is meant to be built right before each run. The scan
//! filter narrows the read on the database side, and the predicate checks
//! every row again against the clock of the run.
//!
//! - [`api_keys`]: API keys with a given name prefix, past their lifetime
//! - [`sessions`]: expired webapp sessions
//! - [`user`]: users who never verified their account
//!
//! [`MaintenanceTarget`]: sweep_storage::MaintenanceTarget

mod api_keys;
mod sessions;
mod user;

pub use self::{
    api_keys::expired_api_keys, sessions::expired_webapp_sessions, user::unverified_users,
};
