//! Resolved connection candidates.
//!
//! Name resolving is delegated entirely to the host platform via
//! [`std::net::ToSocketAddrs`], which is backed by `getaddrinfo` (or its
//! platform equivalent). This crate never caches DNS results itself — see
//! [`crate::cache`] for the *winning endpoint* cache, which is a different
//! thing.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use socket2::{Domain, Protocol, Type};

/// Address family of a resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

/// A fully resolved connection candidate.
///
/// Endpoints are produced by name resolution and are immutable for the
/// lifetime of one [`crate::create_connection`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub(crate) addr: SocketAddr,
}

impl Endpoint {
    pub(crate) fn new(addr: SocketAddr) -> Endpoint {
        Endpoint { addr }
    }

    /// The resolved socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The address family of this endpoint.
    pub fn family(&self) -> Family {
        if self.addr.is_ipv4() {
            Family::V4
        } else {
            Family::V6
        }
    }

    pub(crate) fn domain(&self) -> Domain {
        match self.family() {
            Family::V4 => Domain::IPV4,
            Family::V6 => Domain::IPV6,
        }
    }

    pub(crate) fn socket_type(&self) -> Type {
        Type::STREAM
    }

    pub(crate) fn protocol(&self) -> Protocol {
        Protocol::TCP
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Resolve `(host, port)` to an ordered list of candidate endpoints.
///
/// The order returned by the OS resolver is preserved; this crate never
/// reorders families.
pub(crate) fn resolve(host: &str, port: u16) -> io::Result<Vec<Endpoint>> {
    let addrs = (host, port).to_socket_addrs()?;
    let endpoints: Vec<Endpoint> = addrs.map(Endpoint::new).collect();

    if endpoints.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {}:{}", host, port),
        ));
    }

    Ok(endpoints)
}

/// `true` if `endpoints` contains more than one distinct address family.
pub(crate) fn has_multiple_families(endpoints: &[Endpoint]) -> bool {
    let mut saw_v4 = false;
    let mut saw_v6 = false;
    for e in endpoints {
        match e.family() {
            Family::V4 => saw_v4 = true,
            Family::V6 => saw_v6 = true,
        }
        if saw_v4 && saw_v6 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_localhost() {
        let endpoints = resolve("localhost", 0).unwrap();
        assert!(!endpoints.is_empty());
    }

    #[test]
    fn single_family_is_not_multiple() {
        let endpoints = vec![Endpoint::new("127.0.0.1:80".parse().unwrap())];
        assert!(!has_multiple_families(&endpoints));
    }

    #[test]
    fn mixed_family_is_multiple() {
        let endpoints = vec![
            Endpoint::new("127.0.0.1:80".parse().unwrap()),
            Endpoint::new("[::1]:80".parse().unwrap()),
        ];
        assert!(has_multiple_families(&endpoints));
    }
}
