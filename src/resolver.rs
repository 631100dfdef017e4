//! Endpoint resolution. Treated as an external collaborator: the actual name lookup is
//! `tokio::net::lookup_host`, never a hand-rolled resolver. This module only adds the edge-case
//! handling and watchdog the spec requires on top of it.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Internal watchdog bound on a single resolution attempt.
const WATCHDOG: Duration = Duration::from_secs(60);

/// Resolver output for either transport family. Never cached across calls — every `resolve_*`
/// call re-runs the lookup.
#[derive(Debug, Clone)]
pub enum EndpointList {
    /// TCP: the original host/port plus every address it resolved to.
    Tcp {
        /// The host as supplied by the caller (kept for diagnostics/`InfoMap` population).
        host: String,
        /// The port as supplied by the caller.
        port: u16,
        /// Resolved socket addresses, in resolver order.
        addresses: Vec<SocketAddr>,
    },
    /// UNIX-domain: trivially "resolves" to itself.
    Unix {
        /// The filesystem path to connect/bind to.
        path: PathBuf,
    },
}

impl EndpointList {
    /// Iterates candidate socket addresses for a TCP list, or a single-element degenerate
    /// iterator for UNIX (the connector special-cases UNIX rather than iterating `SocketAddr`s).
    pub fn tcp_addresses(&self) -> &[SocketAddr] {
        match self {
            EndpointList::Tcp { addresses, .. } => addresses,
            EndpointList::Unix { .. } => &[],
        }
    }
}

fn is_wildcard_host(host: &str) -> bool {
    matches!(host, "" | "0.0.0.0" | "[::]")
}

/// Resolves `host:port` to a list of candidate addresses. `host` in `{"", "0.0.0.0", "[::]"}`
/// bypasses resolution entirely and yields a single wildcard IPv6 bind endpoint — this shortcut
/// only makes sense for a server connector's bind target, never a client dial target.
pub async fn resolve_tcp(host: &str, port: u16) -> Result<EndpointList> {
    if is_wildcard_host(host) {
        return Ok(EndpointList::Tcp {
            host: host.to_string(),
            port,
            addresses: vec![SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)],
        });
    }

    let lookup = tokio::time::timeout(WATCHDOG, tokio::net::lookup_host((host, port)))
        .await
        .map_err(|_| Error::TimedOut)?
        .map_err(|e| Error::Resolution(e.to_string()))?;

    Ok(EndpointList::Tcp {
        host: host.to_string(),
        port,
        addresses: lookup.collect(),
    })
}

/// Resolves a UNIX-domain path. Synchronous and trivial: a path resolves to itself.
pub fn resolve_unix(path: impl Into<PathBuf>) -> EndpointList {
    EndpointList::Unix { path: path.into() }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wildcard_hosts_bypass_resolution() {
        for host in ["", "0.0.0.0", "[::]"] {
            assert!(is_wildcard_host(host), "{host} should be a wildcard host");
        }
        assert!(!is_wildcard_host("example.com"));
    }

    #[tokio::test]
    async fn empty_host_yields_unspecified_ipv6_bind_endpoint() {
        let list = resolve_tcp("", 8080).await.unwrap();
        match list {
            EndpointList::Tcp { addresses, .. } => {
                assert_eq!(1, addresses.len());
                assert_eq!(
                    SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 8080),
                    addresses[0]
                );
            }
            EndpointList::Unix { .. } => panic!("expected Tcp variant"),
        }
    }

    #[tokio::test]
    async fn loopback_ip_resolves_to_itself() {
        let list = resolve_tcp("127.0.0.1", 9000).await.unwrap();
        let addrs = list.tcp_addresses();
        assert_eq!(1, addrs.len());
        assert_eq!("127.0.0.1:9000".parse::<SocketAddr>().unwrap(), addrs[0]);
    }

    #[test]
    fn unix_path_resolves_to_itself() {
        let list = resolve_unix("/tmp/socket");
        match list {
            EndpointList::Unix { path } => assert_eq!(PathBuf::from("/tmp/socket"), path),
            EndpointList::Tcp { .. } => panic!("expected Unix variant"),
        }
    }
}
