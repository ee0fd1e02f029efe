//! The address cache.
//!
//! Maps a destination `(host, port)` to the address family that last won a
//! race, with a TTL. Not thread-safe by design: the library performs no
//! internal locking beyond what's needed to swap the process-wide handle
//! (see [`crate::set_cache`]). A caller wanting thread-safe caching across
//! racing threads of their own supplies a [`Cache`] implementation that
//! locks internally; it honors the same three-operation contract.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::endpoint::Endpoint;

/// Default cache entry validity, per RFC 6555 §4.2 guidance.
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(60);

/// A pluggable cache of winning endpoints.
///
/// Implementors must be cheap to call from the hot path of
/// [`crate::create_connection`]. The crate ships two implementations:
/// [`MemoryCache`], the default, and [`NullCache`], which disables caching.
pub trait Cache: Debug + Send + Sync {
    /// Return the cached endpoint for `(host, port)` if present and
    /// unexpired. An expired entry is removed as a side effect.
    fn get(&self, host: &str, port: u16) -> Option<Endpoint>;

    /// Record `endpoint` as the winning endpoint for `(host, port)`.
    fn put(&self, host: &str, port: u16, endpoint: Endpoint);

    /// Drop all entries.
    fn clear(&self);
}

struct CacheEntry {
    endpoint: Endpoint,
    expires_at: Instant,
}

/// The default in-memory [`Cache`] implementation.
///
/// Guarded by an internal mutex so a single instance may still be shared
/// across threads that each perform their own racing `create_connection`
/// calls; this is an implementation detail, not a thread-safety guarantee
/// for the cache semantics themselves (see module docs).
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, u16), CacheEntry>>,
    validity_duration: Duration,
}

impl MemoryCache {
    /// Create a cache whose entries expire after `validity_duration`.
    pub fn new(validity_duration: Duration) -> MemoryCache {
        MemoryCache {
            entries: Mutex::new(HashMap::new()),
            validity_duration,
        }
    }

    /// Create a cache with the [`DEFAULT_VALIDITY`] TTL.
    pub fn new_default() -> MemoryCache {
        MemoryCache::new(DEFAULT_VALIDITY)
    }

    /// The configured entry TTL.
    pub fn validity_duration(&self) -> Duration {
        self.validity_duration
    }
}

impl Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("validity_duration", &self.validity_duration)
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        MemoryCache::new_default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, host: &str, port: u16) -> Option<Endpoint> {
        let key = (host.to_string(), port);
        let mut entries = self.entries.lock().unwrap();

        let expired = match entries.get(&key) {
            Some(e) => Instant::now() >= e.expires_at,
            None => return None,
        };

        if expired {
            entries.remove(&key);
            return None;
        }

        entries.get(&key).map(|e| e.endpoint.clone())
    }

    fn put(&self, host: &str, port: u16, endpoint: Endpoint) {
        let key = (host.to_string(), port);
        let entry = CacheEntry {
            endpoint,
            expires_at: Instant::now() + self.validity_duration,
        };
        self.entries.lock().unwrap().insert(key, entry);
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// A [`Cache`] that stores nothing. Assigning this via [`crate::set_cache`]
/// is equivalent to disabling caching, except it avoids an `Option` check
/// at every call site.
#[derive(Debug, Default)]
pub struct NullCache;

impl Cache for NullCache {
    fn get(&self, _host: &str, _port: u16) -> Option<Endpoint> {
        None
    }

    fn put(&self, _host: &str, _port: u16, _endpoint: Endpoint) {}

    fn clear(&self) {}
}
