//! Entry storage with per-entry expiry.
//!
//! Values are type-erased so one store can hold pages of every feed family.
//! Expiry is lazy on read and eager in [`EntryStore::sweep_expired`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) type CachedValue = Arc<dyn Any + Send + Sync>;

/// A stored value together with its lifetime.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    pub data: CachedValue,
    pub timestamp: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn new(data: CachedValue, ttl: Duration) -> Self {
        let timestamp = Instant::now();
        Self {
            data,
            timestamp,
            expires_at: timestamp + ttl,
        }
    }

    /// Entries stay valid up to and including `expires_at`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Result of a lookup.
pub(crate) enum Lookup {
    Hit(CachedValue),
    /// The entry had outlived its TTL and was removed; carries its age.
    Expired(Duration),
    Miss,
}

/// Point-in-time entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub in_flight: usize,
}

#[derive(Default)]
pub(crate) struct EntryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, data: CachedValue, ttl: Duration) {
        rw_write(&self.entries, SOURCE, "insert")
            .insert(key.to_string(), CacheEntry::new(data, ttl));
    }

    /// Look a key up, deleting it if it has expired.
    ///
    /// Reads never extend an entry's lifetime.
    pub fn lookup(&self, key: &str) -> Lookup {
        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, "lookup");
            match entries.get(key) {
                None => return Lookup::Miss,
                Some(entry) if !entry.is_expired_at(now) => {
                    return Lookup::Hit(Arc::clone(&entry.data));
                }
                Some(_) => {}
            }
        }

        let mut entries = rw_write(&self.entries, SOURCE, "lookup.expire");
        // Re-check: a writer may have refreshed the key between the two locks.
        match entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                let age = now.duration_since(entry.timestamp);
                entries.remove(key);
                Lookup::Expired(age)
            }
            Some(entry) => Lookup::Hit(Arc::clone(&entry.data)),
            None => Lookup::Miss,
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "remove")
            .remove(key)
            .is_some()
    }

    pub fn remove_matching(&self, pattern: &str) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "remove_matching");
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        before - entries.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "sweep_expired");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    /// Returns `(total, expired)` without removing anything.
    pub fn counts(&self) -> (usize, usize) {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "counts");
        let expired = entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .count();
        (entries.len(), expired)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = rw_read(&self.entries, SOURCE, "keys")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        rw_read(&self.entries, SOURCE, "entry").get(key).cloned()
    }
}
