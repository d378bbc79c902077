// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use chrono::Duration;
use sweep_data_model::{ApiKey, Clock};
use thiserror::Error;

use crate::{StorageError, cache::ExpiringCache};

/// Looks up API keys in the underlying storage
#[async_trait]
pub trait CredentialLookup: Send + Sync {
    /// Lookup an [`ApiKey`] by its head
    ///
    /// Returns `None` if no [`ApiKey`] has this head
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the underlying storage fails
    async fn lookup_by_head(&self, head: &[u8]) -> Result<Option<ApiKey>, StorageError>;
}

#[async_trait]
impl<L: CredentialLookup + ?Sized> CredentialLookup for Arc<L> {
    async fn lookup_by_head(&self, head: &[u8]) -> Result<Option<ApiKey>, StorageError> {
        (**self).lookup_by_head(head).await
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Caches API key lookups by head, on the request hot path
///
/// Unknown heads are never cached, so that a key is usable as soon as it is
/// created. A deleted key may still be served until its entry expires.
pub struct CredentialCache<L> {
    lookup: L,
    cache: ExpiringCache<Vec<u8>, ApiKey>,
}

impl<L: CredentialLookup> CredentialCache<L> {
    pub fn new(lookup: L, clock: Arc<dyn Clock>, ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            lookup,
            cache: ExpiringCache::new(clock, ttl, capacity),
        }
    }

    /// Get the API key with the given head
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] if no key has this head, or
    /// [`CredentialError::Storage`] if the lookup failed
    #[tracing::instrument(name = "cache.credentials.get_by_head", skip_all, err)]
    pub async fn get_by_head(&self, head: &[u8]) -> Result<ApiKey, CredentialError> {
        self.cache
            .get(head.to_vec(), || async {
                self.lookup
                    .lookup_by_head(head)
                    .await?
                    .ok_or(CredentialError::NotFound)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use assert_matches::assert_matches;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;
    use sweep_data_model::MockClock;

    use super::*;

    struct FakeLookup {
        keys: HashMap<Vec<u8>, ApiKey>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialLookup for FakeLookup {
        async fn lookup_by_head(&self, head: &[u8]) -> Result<Option<ApiKey>, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.keys.get(head).cloned())
        }
    }

    #[tokio::test]
    async fn test_cached_lookups() {
        let clock = Arc::new(MockClock::default());
        let mut rng = ChaChaRng::seed_from_u64(42);
        let keys = ApiKey::samples(clock.now(), &mut rng);
        let lookup = Arc::new(FakeLookup {
            keys: keys.iter().map(|k| (k.head.clone(), k.clone())).collect(),
            calls: AtomicUsize::new(0),
        });

        let cache = CredentialCache::new(
            Arc::clone(&lookup),
            clock.clone(),
            Duration::minutes(1),
            NonZeroUsize::new(16).unwrap(),
        );

        let key = cache.get_by_head(&keys[0].head).await.unwrap();
        assert_eq!(key, keys[0]);
        let key = cache.get_by_head(&keys[0].head).await.unwrap();
        assert_eq!(key, keys[0]);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        // Unknown heads are looked up every time
        assert_matches!(
            cache.get_by_head(b"nope").await,
            Err(CredentialError::NotFound)
        );
        assert_matches!(
            cache.get_by_head(b"nope").await,
            Err(CredentialError::NotFound)
        );
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 3);

        clock.advance(Duration::minutes(1));
        cache.get_by_head(&keys[0].head).await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 4);
    }
}
