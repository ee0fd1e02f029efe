//! One-shot feature detection for IPv6 availability.

use std::net::ToSocketAddrs;
use std::sync::OnceLock;

use socket2::{Domain, Protocol, Socket, Type};

static SUPPORTED: OnceLock<bool> = OnceLock::new();

/// Whether this host can create IPv6 sockets and resolve IPv6 addresses.
///
/// Idempotent and memoized process-wide after the first evaluation. Never
/// issues a connect and never blocks on network traffic; a benign race
/// between two threads evaluating this for the first time is acceptable
/// since the result is deterministic.
pub fn ipv6_supported() -> bool {
    *SUPPORTED.get_or_init(evaluate)
}

fn evaluate() -> bool {
    let socket = match Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP)) {
        Ok(s) => s,
        Err(e) => {
            log::debug!("ipv6 probe: socket creation failed: {}", e);
            return false;
        }
    };
    // `socket` is closed on drop regardless of which branch below runs.
    let has_loopback = match "[::1]:0".to_socket_addrs() {
        Ok(mut addrs) => addrs.next().is_some(),
        Err(e) => {
            log::debug!("ipv6 probe: resolving ::1 failed: {}", e);
            false
        }
    };
    drop(socket);
    has_loopback
}
