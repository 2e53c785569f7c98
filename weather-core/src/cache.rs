//! In-memory store for aggregated results with a single global TTL.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::model::AggregatedWeather;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub weather: Arc<AggregatedWeather>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is usable until its age strictly exceeds `ttl`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Thread-safe cache keyed by `"city,country"`.
///
/// Stale entries are never evicted; they read as absent and get overwritten by
/// the next successful aggregation or dropped by [`CacheStore::clear`].
#[derive(Debug)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn from_minutes(minutes: u32) -> Self {
        Self::new(Duration::minutes(i64::from(minutes)))
    }

    pub fn get(&self, key: &str) -> Option<Arc<AggregatedWeather>> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Arc<AggregatedWeather>> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;

        if entry.is_stale(now, self.ttl) {
            return None;
        }

        Some(Arc::clone(&entry.weather))
    }

    pub fn put(&self, key: impl Into<String>, weather: Arc<AggregatedWeather>) {
        self.put_at(key, weather, Utc::now());
    }

    pub fn put_at(
        &self,
        key: impl Into<String>,
        weather: Arc<AggregatedWeather>,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            weather,
            created_at: now,
        };
        self.entries.write().insert(key.into(), entry);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
