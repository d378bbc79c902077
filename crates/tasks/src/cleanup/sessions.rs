// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use chrono::{DateTime, Utc};
use sweep_data_model::WebappSession;
use sweep_storage::{ConfigurationError, MaintenanceTarget, ScanFilter};

/// Delete the webapp sessions which expired before `now`
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the page size is zero
pub fn expired_webapp_sessions(
    page_size: usize,
    now: DateTime<Utc>,
) -> Result<MaintenanceTarget<WebappSession>, ConfigurationError> {
    let target = MaintenanceTarget::delete(
        "expired-webapp-sessions",
        page_size,
        |session: &WebappSession, now| session.is_expired(now),
    )?
    .with_scan_filter(ScanFilter::all().lt("expires_at", now));

    Ok(target)
}
