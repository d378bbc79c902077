// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! An expiring, size-bounded lookup cache
//!
//! [`ExpiringCache`] sits in front of a hot lookup. Values are kept for a
//! fixed time-to-live after being loaded, and the least recently used entry
//! is evicted once the cache is full. Concurrent lookups of the same missing
//! key share a single load. Failed loads are not cached.
//!
//! The cache doesn't know about changes made to the underlying data: a value
//! deleted from the database may still be served until it expires.

use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
    num::NonZeroUsize,
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use sweep_data_model::Clock;
use tokio::sync::{Mutex, OnceCell};

use crate::telemetry::{CACHE_LOOKUPS_COUNTER, RESULT};

struct Loaded<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

type Slot<V> = Arc<OnceCell<Loaded<V>>>;

struct Entry<V> {
    slot: Slot<V>,
    last_used: u64,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,

    /// Keys ordered by their last use, oldest first
    recency: BTreeMap<u64, K>,

    tick: u64,
}

impl<K: Hash + Eq + Clone, V> State<K, V> {
    fn touch(&mut self, key: &K) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.last_used);
            entry.last_used = tick;
            self.recency.insert(tick, key.clone());
        }
    }

    fn insert(&mut self, key: K, slot: Slot<V>, capacity: NonZeroUsize) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(previous) = self.entries.insert(
            key.clone(),
            Entry {
                slot,
                last_used: tick,
            },
        ) {
            self.recency.remove(&previous.last_used);
        }
        self.recency.insert(tick, key);

        // Slots still loading are never evicted, so that their key keeps a
        // single loader. The cache may go over capacity until they finish.
        while self.entries.len() > capacity.get() {
            let oldest_loaded = self.recency.iter().find_map(|(tick, key)| {
                self.entries
                    .get(key)
                    .filter(|entry| entry.slot.initialized())
                    .map(|_| *tick)
            });
            let Some(tick) = oldest_loaded else {
                break;
            };
            if let Some(key) = self.recency.remove(&tick) {
                self.entries.remove(&key);
            }
        }
    }

    /// Forget the entry for `key`, but only if it still holds `slot`
    fn remove_slot(&mut self, key: &K, slot: &Slot<V>) {
        let Some(entry) = self.entries.get(key) else {
            return;
        };

        if Arc::ptr_eq(&entry.slot, slot) {
            let last_used = entry.last_used;
            self.entries.remove(key);
            self.recency.remove(&last_used);
        }
    }
}

/// A cache of values which expire after a fixed time-to-live
pub struct ExpiringCache<K, V> {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    capacity: NonZeroUsize,
    state: Mutex<State<K, V>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Create an empty cache
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            clock,
            ttl,
            capacity,
            state: Mutex::new(State {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    /// Number of entries currently held, including the ones being loaded and
    /// the expired ones which were not looked up since
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get the value for `key`, loading it with `loader` if it is missing or
    /// expired.
    ///
    /// If another lookup for the same key is already loading it, this waits
    /// for that load instead of calling `loader`.
    ///
    /// # Errors
    ///
    /// Returns the error of the loader. The error is not cached, the next
    /// lookup tries again.
    pub async fn get<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send,
        E: Send,
    {
        let slot = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();

            let existing = state.entries.get(&key).map(|entry| Arc::clone(&entry.slot));
            match existing {
                Some(slot) => match slot.get() {
                    Some(loaded) if loaded.expires_at > now => {
                        let value = loaded.value.clone();
                        state.touch(&key);
                        CACHE_LOOKUPS_COUNTER.add(1, &[KeyValue::new(RESULT, "hit")]);
                        return Ok(value);
                    }

                    // Expired, replace it with a fresh slot
                    Some(_) => {
                        let slot = Slot::default();
                        state.insert(key.clone(), Arc::clone(&slot), self.capacity);
                        CACHE_LOOKUPS_COUNTER.add(1, &[KeyValue::new(RESULT, "miss")]);
                        slot
                    }

                    // Someone else is loading it
                    None => {
                        state.touch(&key);
                        CACHE_LOOKUPS_COUNTER.add(1, &[KeyValue::new(RESULT, "coalesced")]);
                        slot
                    }
                },

                None => {
                    let slot = Slot::default();
                    state.insert(key.clone(), Arc::clone(&slot), self.capacity);
                    CACHE_LOOKUPS_COUNTER.add(1, &[KeyValue::new(RESULT, "miss")]);
                    slot
                }
            }
        };

        let result = slot
            .get_or_try_init(|| async {
                let value = loader().await?;
                Ok::<_, E>(Loaded {
                    value,
                    expires_at: self.clock.now() + self.ttl,
                })
            })
            .await;

        match result {
            Ok(loaded) => Ok(loaded.value.clone()),
            Err(error) => {
                if !slot.initialized() {
                    self.state.lock().await.remove_slot(&key, &slot);
                }
                Err(error)
            }
        }
    }
}
