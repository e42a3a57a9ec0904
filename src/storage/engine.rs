//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core table of the cache: a `HashMap` from key
//! to [`Entry`] guarded by a single `Mutex`.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: Every operation, including `dump` and the sweep pass,
//!    holds the same lock for its whole duration. Operations are therefore
//!    linearizable and a dump is always a consistent point-in-time copy.
//! 2. **Hybrid Expiry**: Readers re-check expiry on every access (lazy) and
//!    the [`ExpirySweeper`](crate::storage::ExpirySweeper) periodically
//!    removes whatever nobody reads (active).
//! 3. **Wall-Clock Expiry**: Expiry is an absolute `SystemTime` so it keeps
//!    its meaning across a snapshot and restart.
//! 4. **No Failures**: Lookups miss, deletes of absent keys are no-ops. None
//!    of the operations return errors.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              StorageEngine               │
//! │  ┌────────────────────────────────────┐  │
//! │  │ Mutex<HashMap<String, Entry>>      │  │
//! │  └────────────────────────────────────┘  │
//! │        ▲            ▲            ▲       │
//! │   connections    sweeper     snapshots   │
//! └──────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// Lifetime given to entries written by `SET`. Long enough to mean
/// "does not expire" in practice.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A stored value with its absolute expiry time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The value, uninterpreted by the engine
    pub value: String,
    /// When this entry expires
    pub expires_at: SystemTime,
}

impl Entry {
    /// Creates an entry that expires [`DEFAULT_TTL`] from now.
    pub fn new(value: impl Into<String>) -> Self {
        Self::with_expiry(value, SystemTime::now() + DEFAULT_TTL)
    }

    /// Creates an entry with an explicit expiry time.
    pub fn with_expiry(value: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Checks if this entry is expired at the given instant.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// A full copy of the table, as produced by [`StorageEngine::dump`] and
/// consumed by [`StorageEngine::restore`].
pub type Snapshot = HashMap<String, Entry>;

/// Counters describing engine activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub expired: u64,
}

/// The storage engine of the cache.
///
/// This struct is designed to be wrapped in an `Arc` and shared by the
/// server, every connection task, the sweeper and the snapshot store.
///
/// # Example
///
/// ```
/// use cacher::storage::StorageEngine;
/// use std::time::{Duration, SystemTime};
///
/// let engine = StorageEngine::new();
///
/// engine.set("name", "Ariz");
/// assert_eq!(engine.get("name"), Some("Ariz".to_string()));
///
/// engine.expire_at("name", SystemTime::now() - Duration::from_secs(1));
/// assert_eq!(engine.get("name"), None);
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    /// The table
    data: Mutex<Snapshot>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys removed (lazily or by the sweeper)
    expired_count: AtomicU64,
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the table lock.
    ///
    /// Every mutation is a single `HashMap` call, so a panic while the lock
    /// is held cannot leave the table half-written and poisoning is ignored.
    fn table(&self) -> MutexGuard<'_, Snapshot> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// An expired entry is removed on the spot ("lazy expiry").
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.table();
        let entry = data.get(key)?;

        if entry.is_expired() {
            data.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Sets a key-value pair with the default expiry.
    ///
    /// If the key already exists, its value and expiry are overwritten.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        self.table().insert(key.into(), Entry::new(value)).is_none()
    }

    /// Deletes a key. Deleting an absent key is a no-op.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        self.table().remove(key).is_some()
    }

    /// Overwrites the expiry of an existing key.
    ///
    /// An absent key is left absent; no entry is created.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key existed.
    pub fn expire_at(&self, key: &str, at: SystemTime) -> bool {
        match self.table().get_mut(key) {
            Some(entry) => {
                entry.expires_at = at;
                true
            }
            None => false,
        }
    }

    /// Returns a deep copy of every entry, including expired entries the
    /// sweeper has not reached yet.
    pub fn dump(&self) -> Snapshot {
        self.table().clone()
    }

    /// Merges a snapshot into the table.
    ///
    /// Keys already present in the table win: an incoming entry is only
    /// inserted when its key is absent.
    ///
    /// # Returns
    ///
    /// Returns the number of entries inserted.
    pub fn restore(&self, incoming: Snapshot) -> usize {
        let mut data = self.table();
        let mut inserted = 0;

        for (key, entry) in incoming {
            if let std::collections::hash_map::Entry::Vacant(slot) = data.entry(key) {
                slot.insert(entry);
                inserted += 1;
            }
        }

        inserted
    }

    /// Removes every expired entry in one pass under the lock.
    ///
    /// # Returns
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = SystemTime::now();
        let mut data = self.table();
        let before = data.len();

        data.retain(|_, entry| !entry.is_expired_at(now));

        let cleaned = (before - data.len()) as u64;
        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    /// Returns the number of entries in the table, expired or not.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Returns a snapshot of the engine counters.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            gets: self.get_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            deletes: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
