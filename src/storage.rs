/*!
 * In-Memory Storage Implementation
 *
 * The store shared by every connection. Each key maps to a single `Entry`
 * holding its value, type tag and optional expiry, so a purge removes all
 * three at once under the owning shard's lock.
 */

use bytes::Bytes;
use dashmap::DashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Type tag reported for keys that are not in the store
pub const TYPE_NONE: &str = "none";

/// Type of a stored value
///
/// Only strings can be loaded today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
}

impl ValueType {
    /// Name of the type as reported by `TYPE`
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
        }
    }
}

/// A single keyed record
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Bytes,
    pub value_type: ValueType,
    /// Absolute expiry in Unix milliseconds; `None` never expires
    pub expires_at: Option<i64>,
}

impl Entry {
    /// An entry is expired once `now` is strictly past its expiry.
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }
}

/// Concurrent key-value store with passive expiry
///
/// Uses AHash inside DashMap's shards for fast lookups.
#[derive(Default)]
pub struct Store {
    inner: DashMap<Bytes, Entry, ahash::RandomState>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a string entry
    pub fn insert(&self, key: Bytes, value: Bytes, expires_at: Option<i64>) {
        self.inner.insert(
            key,
            Entry {
                value,
                value_type: ValueType::String,
                expires_at,
            },
        );
    }

    /// Get the value for `key` using the wall clock
    ///
    /// An expired entry is purged and reported as missing.
    #[inline]
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_at(key, now_ms())
    }

    /// Get the value for `key` as of `now` (Unix milliseconds)
    pub fn get_at(&self, key: &[u8], now: i64) -> Option<Bytes> {
        {
            let entry = self.inner.get(key)?;
            if !entry.is_expired_at(now) {
                return Some(entry.value.clone());
            }
        }
        // The read guard is gone; re-check under the write lock in case the
        // key was replaced in between.
        if self.inner.remove_if(key, |_, e| e.is_expired_at(now)).is_some() {
            log::debug!("purged expired key {:?}", String::from_utf8_lossy(key));
        }
        None
    }

    /// Type tag of `key`, or `"none"` if absent
    ///
    /// Expiry is not evaluated here; a key past its expiry still reports its
    /// type until a `get` purges it.
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        self.inner
            .get(key)
            .map(|e| e.value_type.as_str())
            .unwrap_or(TYPE_NONE)
    }

    /// Snapshot of the raw entry, without expiry checks
    pub fn entry(&self, key: &[u8]) -> Option<Entry> {
        self.inner.get(key).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Current wall-clock time in Unix milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
