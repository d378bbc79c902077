// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use chrono::{DateTime, Duration, Utc};
use sweep_data_model::ApiKey;
use sweep_storage::{ConfigurationError, MaintenanceTarget, ScanFilter};

/// Delete the API keys whose name starts with `name_prefix` and which were
/// created more than `lifetime` ago
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the page size is zero, or if
/// `lifetime` reaches before the earliest representable time
pub fn expired_api_keys(
    name_prefix: &str,
    lifetime: Duration,
    page_size: usize,
    now: DateTime<Utc>,
) -> Result<MaintenanceTarget<ApiKey>, ConfigurationError> {
    const NAME: &str = "expired-api-keys";
    let cutoff = now
        .checked_sub_signed(lifetime)
        .ok_or_else(|| ConfigurationError::CutoffOutOfRange {
            target: NAME.to_owned(),
        })?;

    let prefix = name_prefix.to_owned();
    let target = MaintenanceTarget::delete(
        NAME,
        page_size,
        move |key: &ApiKey, now| key.name.starts_with(&prefix) && key.is_expired(lifetime, now),
    )?
    .with_scan_filter(
        ScanFilter::all()
            .starts_with("name", name_prefix)
            .lt("created_at", cutoff),
    );

    Ok(target)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;
    use sweep_data_model::{Clock, MockClock, Ulid};
    use sweep_storage::{maintenance, memory::MemoryTable};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn key(rng: &mut ChaChaRng, name: &str, created_at: DateTime<Utc>) -> ApiKey {
        ApiKey {
            id: Ulid::from_datetime_with_source(created_at.into(), rng),
            project_id: Ulid::from_datetime_with_source(created_at.into(), rng),
            head: name.as_bytes().to_vec(),
            name: name.to_owned(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_only_expired_prefixed_keys_are_deleted() {
        let clock = Arc::new(MockClock::default());
        let mut rng = ChaChaRng::seed_from_u64(42);
        let start = clock.now();

        let old_trial = key(&mut rng, "trial-1", start);
        let old_other = key(&mut rng, "production", start);
        let old_percent = key(&mut rng, "trial%2", start);
        clock.advance(Duration::days(20));
        let recent_trial = key(&mut rng, "trial-3", clock.now());
        clock.advance(Duration::days(20));

        let table = MemoryTable::from_rows([
            old_trial.clone(),
            old_other.clone(),
            old_percent.clone(),
            recent_trial.clone(),
        ]);

        // A `%` in the prefix is not a wildcard
        let target = expired_api_keys("trial%", Duration::days(30), 10, clock.now()).unwrap();
        let report = maintenance::run(
            &target,
            &table,
            &table,
            clock.as_ref(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.mutated, 1);
        assert!(!table.rows().await.contains(&old_percent));

        let target = expired_api_keys("trial", Duration::days(30), 10, clock.now()).unwrap();
        let report = maintenance::run(
            &target,
            &table,
            &table,
            clock.as_ref(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.mutated, 1);

        let mut remaining = table.rows().await;
        remaining.sort_by_key(|key| key.id);
        let mut expected = vec![old_other, recent_trial];
        expected.sort_by_key(|key| key.id);
        assert_eq!(remaining, expected);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let now = MockClock::default().now();
        assert!(matches!(
            expired_api_keys("trial", Duration::days(30), 0, now),
            Err(ConfigurationError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_unrepresentable_lifetime_is_rejected() {
        let now = MockClock::default().now();
        assert!(matches!(
            expired_api_keys("trial", Duration::MAX, 10, now),
            Err(ConfigurationError::CutoffOutOfRange { target }) if target == "expired-api-keys"
        ));

        // A key can't outlive the end of time
        let mut rng = ChaChaRng::seed_from_u64(42);
        let key = key(&mut rng, "trial-1", now);
        assert!(!key.is_expired(Duration::MAX, now));
    }
}
