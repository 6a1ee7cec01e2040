// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Address parsing and canonicalization for the Socket Manager.
//!
//! Requests and canonical addresses are compared by resolved port
//! equality plus host equivalence, where any unspecified/wildcard host
//! is considered equivalent to any other unspecified/wildcard host — a
//! literal request like `:8080` must match an OS-canonical `[::]:8080`
//! or `0.0.0.0:8080`. `std::net::SocketAddr`'s `FromStr` rejects the
//! bare `:PORT` form (no host), so requested addresses are parsed here
//! instead of going through `ToSocketAddrs`.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("malformed address {0:?}")]
    Malformed(String),
}

/// Host portion of a parsed address request: either "any interface" or
/// a concrete IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSpec {
    Unspecified,
    Ip(IpAddr),
}

/// An address as requested by a caller of `ensure_listener`, before
/// resolution against the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAddr {
    pub host: HostSpec,
    pub port: u16,
}

impl ParsedAddr {
    /// Parse a request string. Accepts `:PORT` (wildcard host),
    /// `HOST:PORT`, and bracketed IPv6 (`[::1]:PORT`).
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if let Some(port_str) = s.strip_prefix(':') {
            let port: u16 =
                port_str.parse().map_err(|_| AddressError::Malformed(s.to_string()))?;
            return Ok(ParsedAddr { host: HostSpec::Unspecified, port });
        }
        let addr: SocketAddr = s.parse().map_err(|_| AddressError::Malformed(s.to_string()))?;
        Ok(ParsedAddr::from(addr))
    }

    /// Port `0` requests never match an existing entry; they always
    /// allocate a fresh listener.
    pub fn wants_fresh_port(&self) -> bool {
        self.port == 0
    }

    /// A concrete bindable address, resolving the wildcard host to
    /// `0.0.0.0` (dual-stack binding is not attempted; operators who
    /// need IPv6 specify an explicit `[::]` host).
    pub fn to_socket_addr(self) -> SocketAddr {
        match self.host {
            HostSpec::Unspecified => {
                SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), self.port)
            }
            HostSpec::Ip(ip) => SocketAddr::new(ip, self.port),
        }
    }
}

impl From<SocketAddr> for ParsedAddr {
    fn from(addr: SocketAddr) -> Self {
        let host =
            if addr.ip().is_unspecified() { HostSpec::Unspecified } else { HostSpec::Ip(addr.ip()) };
        ParsedAddr { host, port: addr.port() }
    }
}

fn hosts_equivalent(a: HostSpec, b: HostSpec) -> bool {
    match (a, b) {
        (HostSpec::Unspecified, _) | (_, HostSpec::Unspecified) => true,
        (HostSpec::Ip(x), HostSpec::Ip(y)) => x == y,
    }
}

/// The host:port form the OS reports for a bound listener — the
/// canonical key for a `ListeningSocketEntry`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalAddr(String);

impl CanonicalAddr {
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        CanonicalAddr(addr.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parsed(&self) -> ParsedAddr {
        // Constructed only from `SocketAddr::to_string()`, always reparses.
        self.0.parse::<SocketAddr>().map(ParsedAddr::from).unwrap_or(ParsedAddr {
            host: HostSpec::Unspecified,
            port: 0,
        })
    }

    /// True when `requested` resolves to this canonical address under
    /// the host-equivalence rule. Port-zero requests never match.
    pub fn matches(&self, requested: &ParsedAddr) -> bool {
        if requested.wants_fresh_port() {
            return false;
        }
        let parsed = self.parsed();
        parsed.port == requested.port && hosts_equivalent(parsed.host, requested.host)
    }
}

impl fmt::Display for CanonicalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
