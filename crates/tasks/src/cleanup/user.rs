// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use chrono::{DateTime, Duration, Utc};
use sweep_data_model::{User, UserStatus};
use sweep_storage::{ConfigurationError, MaintenanceTarget, ScanFilter};

/// Delete the users who are still inactive more than `ttl` after signing up
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the page size is zero, or if `ttl`
/// reaches before the earliest representable time
pub fn unverified_users(
    ttl: Duration,
    page_size: usize,
    now: DateTime<Utc>,
) -> Result<MaintenanceTarget<User>, ConfigurationError> {
    const NAME: &str = "unverified-users";
    let cutoff = now
        .checked_sub_signed(ttl)
        .ok_or_else(|| ConfigurationError::CutoffOutOfRange {
            target: NAME.to_owned(),
        })?;

    let target = MaintenanceTarget::delete(NAME, page_size, move |user: &User, now| {
        now.checked_sub_signed(ttl)
            .is_some_and(|before| user.is_unverified_before(before))
    })?
    .with_scan_filter(
        ScanFilter::all()
            .eq("status", UserStatus::Inactive)
            .lt("created_at", cutoff),
    );

    Ok(target)
}
