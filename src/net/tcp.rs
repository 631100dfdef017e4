//! TCP listener/stream helpers. Grounded in the teacher's `net::tcp_listener`/`net::tcp_stream`
//! trait split, collapsed here into plain async functions since `tokio::net::TcpListener`/
//! `TcpStream` already provide everything those traits abstracted over `mio`'s blocking-vs-async
//! registration dance.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

/// Binds and listens on the first address in `addrs` that succeeds, matching the connector's
/// "first success wins" contract. Returns the bound listener and the address it bound to.
pub async fn bind_first(addrs: &[SocketAddr]) -> io::Result<(TcpListener, SocketAddr)> {
    let mut last_err = None;
    for &addr in addrs {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let bound = listener.local_addr()?;
                return Ok((listener, bound));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses")))
}

/// Attempts to connect to each of `addrs` in order, applying `watchdog` per attempt. Returns the
/// first successful stream, or the last error observed if every attempt fails.
pub async fn connect_first(
    addrs: &[SocketAddr],
    watchdog: std::time::Duration,
) -> io::Result<TcpStream> {
    let mut last_err = None;
    for &addr in addrs {
        match tokio::time::timeout(watchdog, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => last_err = Some(e),
            Err(_) => last_err = Some(io::Error::from(io::ErrorKind::TimedOut)),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses")))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn bind_first_skips_unavailable_addresses_and_succeeds() {
        let unavailable = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)), 0);
        let good = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let (_, bound) = bind_first(&[unavailable, good]).await.unwrap();
        assert_eq!(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.ip());
    }

    #[tokio::test]
    async fn connect_first_returns_last_error_when_exhausted() {
        // port 0 is never connectable; this exercises the "exhausted" path without relying on
        // network access.
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1);
        let result = connect_first(&[addr], std::time::Duration::from_millis(200)).await;
        assert!(result.is_err());
    }
}
