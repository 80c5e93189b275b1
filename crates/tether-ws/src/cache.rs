//! TTL cache for idempotent read requests.
//!
//! Keys are derived from the operation type plus the canonical JSON form of
//! its parameters, so two parameter objects that differ only in field order
//! share an entry. Entries may belong to a resource family; mutating
//! operations clear whole families.

use dashmap::DashMap;
use serde_json::Value;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub cached_at: Instant,
    pub ttl: Duration,
    pub family: Option<String>,
}

impl CacheEntry {
    /// Whether the entry is still valid at `now` (`now - cached_at < ttl`).
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) < self.ttl
    }
}

/// Derive the cache key for an operation and its parameters.
pub fn cache_key(operation: &str, params: &Value) -> String {
    let mut key = String::with_capacity(operation.len() + 32);
    key.push_str(operation);
    key.push(':');
    write_canonical(params, &mut key);
    key
}

/// Canonical JSON: object keys sorted recursively, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a string cannot fail.
                let _ = write!(out, "{}", Value::String((*k).clone()));
                out.push(':');
                write_canonical(&map[k.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

/// Response cache keyed by canonical request key.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl ResponseCache {
    /// Create a cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Default TTL applied by [`ResponseCache::put`].
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fresh value for `key`, if any. Expired entries are removed on lookup.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_fresh_at(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
            debug!(key, "Cache entry expired");
        }
        None
    }

    /// Store `value` under `key` with the default TTL.
    pub fn put(&self, key: String, value: Value, family: Option<String>) {
        self.put_with_ttl(key, value, family, self.default_ttl);
    }

    /// Store `value` under `key` with an explicit TTL.
    pub fn put_with_ttl(&self, key: String, value: Value, family: Option<String>, ttl: Duration) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            cached_at: Instant::now(),
            ttl,
            family,
        };
        self.entries.insert(key, entry);
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry belonging to `family`. Returns how many were removed.
    pub fn invalidate_family(&self, family: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.family.as_deref() != Some(family));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(family, removed, "Cache family invalidated");
        }
        removed
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_fresh_at(now));
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
