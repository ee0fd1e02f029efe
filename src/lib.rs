#![forbid(unsafe_code)]
#![warn(clippy::all)]
//! A synchronous Happy Eyeballs (RFC 6555) connection establishment crate.
//!
//! Given a destination `(host, port)`, this crate resolves the candidate
//! addresses and races nonblocking connect attempts across them, staggered
//! by 250ms, so that user-visible connect latency is bounded by the
//! fastest responsive path rather than by a slow or broken one (typically
//! IPv6 on networks with degraded v6 reachability).
//!
//! ```no_run
//! let stream = happy_eyeballs::create_connection(("example.com", 80), None, None)?;
//! # Ok::<(), happy_eyeballs::Error>(())
//! ```
//!
//! The entry point is meant as a drop-in replacement for the platform's
//! standard blocking `TcpStream::connect`: name resolution, the race
//! engine, the IPv6 capability probe, and a pluggable winning-address
//! cache are all handled internally.
//!
//! # Scope
//!
//! Out of scope: asynchronous APIs, TLS, proxying, DNS caching, and any
//! protocol other than TCP streams. This crate returns a connected
//! [`std::net::TcpStream`] and nothing more.

#[macro_use]
extern crate log;

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

mod cache;
mod config;
mod endpoint;
mod error;
mod probe;
mod race;
mod timeout;

pub use cache::{Cache, MemoryCache, NullCache, DEFAULT_VALIDITY};
pub use config::Config;
pub use endpoint::{Endpoint, Family};
pub use error::{Error, Result};
pub use probe::ipv6_supported;

static HAPPY_EYEBALLS_ENABLED: AtomicBool = AtomicBool::new(true);
static CACHE: OnceLock<Mutex<Option<Arc<dyn Cache>>>> = OnceLock::new();
static CONFIG: OnceLock<Mutex<Config>> = OnceLock::new();

fn cache_handle() -> &'static Mutex<Option<Arc<dyn Cache>>> {
    CACHE.get_or_init(|| Mutex::new(Some(Arc::new(MemoryCache::new_default()))))
}

fn config_handle() -> &'static Mutex<Config> {
    CONFIG.get_or_init(|| Mutex::new(Config::default()))
}

/// Whether the Happy Eyeballs race is used at all.
///
/// Reads are unsynchronized beyond the atomic load itself; the flag is
/// process-wide mutable state by design (see [`set_happy_eyeballs_enabled`]).
pub fn happy_eyeballs_enabled() -> bool {
    HAPPY_EYEBALLS_ENABLED.load(Ordering::Relaxed)
}

/// Enable or disable the Happy Eyeballs race process-wide.
///
/// When disabled, [`create_connection`] always falls back to a plain
/// iterative blocking connect, even for dual-stack destinations.
pub fn set_happy_eyeballs_enabled(enabled: bool) {
    HAPPY_EYEBALLS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Install a process-wide cache, or `None` to disable caching entirely.
///
/// The default cache is a [`MemoryCache`] with [`DEFAULT_VALIDITY`]. Swap
/// it for an implementation that locks internally if you need thread-safe
/// caching across multiple `create_connection` callers; the library itself
/// performs no locking around the cache's own operations.
pub fn set_cache(cache: Option<Arc<dyn Cache>>) {
    *cache_handle().lock().unwrap() = cache;
}

/// Run `f` with the current process-wide cache, or `None` if caching is
/// disabled.
pub fn with_cache<R>(f: impl FnOnce(Option<&dyn Cache>) -> R) -> R {
    let guard = cache_handle().lock().unwrap();
    f(guard.as_deref())
}

/// Replace the process-wide default [`Config`].
pub fn set_config(config: Config) {
    *config_handle().lock().unwrap() = config;
}

fn default_connect_timeout() -> Option<Duration> {
    config_handle().lock().unwrap().connect_timeout
}

/// Connect to `address`, racing IPv4 and IPv6 candidates when both are
/// present and supported.
///
/// `timeout` overrides the process-wide [`Config::connect_timeout`]
/// default for this call; it bounds the entire race, not any single
/// attempt. `source_address`, if given, is bound on every attempt socket.
///
/// # Dispatch
///
/// 1. If Happy Eyeballs is disabled, or this host has no usable IPv6, the
///    plain iterative blocking connect is used directly.
/// 2. Otherwise `address` is resolved via the OS resolver.
/// 3. A fresh cache entry for `address`, if any, is moved to the head of
///    the resolved list (tried first, other endpoints remain as fallback).
/// 4. If the resolved list has only one endpoint or only one address
///    family, the plain blocking connect is used (racing would not help).
/// 5. Otherwise the race engine is invoked; on success the winning
///    endpoint is recorded in the cache.
pub fn create_connection(
    address: (&str, u16),
    timeout: Option<Duration>,
    source_address: Option<SocketAddr>,
) -> Result<TcpStream> {
    let (host, port) = address;
    let timeout = timeout.or_else(default_connect_timeout);

    // Rule 1.
    if !happy_eyeballs_enabled() || !ipv6_supported() {
        debug!("happy eyeballs disabled or ipv6 unsupported, connecting to {}:{} directly", host, port);
        let (stream, _) = race::blocking_connect(&resolve(host, port)?, timeout, source_address)
            .map_err(Error::Connect)?;
        return Ok(stream);
    }

    // Rule 2.
    let mut endpoints = resolve(host, port)?;

    // Rule 3.
    if let Some(cached) = with_cache(|c| c.and_then(|c| c.get(host, port))) {
        if let Some(pos) = endpoints.iter().position(|e| *e == cached) {
            let head = endpoints.remove(pos);
            endpoints.insert(0, head);
        }
    }

    // Rule 4.
    if endpoints.len() == 1 || !endpoint::has_multiple_families(&endpoints) {
        debug!("single endpoint or single family for {}:{}, skipping race", host, port);
        let (stream, _) = race::blocking_connect(&endpoints, timeout, source_address)
            .map_err(Error::Connect)?;
        return Ok(stream);
    }

    // Rule 5.
    let (stream, winner) = race::race(&endpoints, timeout, source_address).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Error::Timeout
        } else {
            Error::Connect(e)
        }
    })?;

    with_cache(|c| {
        if let Some(c) = c {
            c.put(host, port, winner);
        }
    });

    Ok(stream)
}

fn resolve(host: &str, port: u16) -> Result<Vec<Endpoint>> {
    endpoint::resolve(host, port).map_err(Error::Resolution)
}
