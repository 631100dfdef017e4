//! A transport-family-erased raw stream, so the connection and TLS layers above do not need to
//! duplicate themselves per transport. Plays the role the teacher's `TcpStream`/`TcpListener`
//! traits played over `mio` — here expressed as a small enum rather than a trait, since `tokio`
//! already gives both transports the same `AsyncRead`/`AsyncWrite` shape and an enum is the
//! simpler way to erase "which one" without a trait object.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

use super::PeerAddr;

/// Either half of a raw, pre-TLS connection.
pub enum RawStream {
    /// A TCP stream.
    Tcp(TcpStream),
    /// A UNIX-domain stream.
    Unix(UnixStream),
}

impl RawStream {
    /// Addresses to populate the `InfoMap` with.
    pub fn peer_addr(&self) -> io::Result<PeerAddr> {
        match self {
            RawStream::Tcp(s) => Ok(PeerAddr::Tcp {
                local: s.local_addr()?,
                remote: s.peer_addr()?,
            }),
            RawStream::Unix(_) => Ok(PeerAddr::Unix { path: None }),
        }
    }

    /// Best-effort count of bytes available to read without blocking. TCP exposes this cheaply
    /// via `peek`; UNIX sockets on most platforms do not expose an equivalent without an ioctl
    /// this crate does not reach for, so `available()` on a UNIX socket returns `0` — a
    /// documented best-effort shortfall, not a bug (see `Connection::available`).
    pub async fn available(&self) -> io::Result<usize> {
        match self {
            RawStream::Tcp(s) => {
                let mut probe = [0u8; 1];
                match s.peek(&mut probe).await {
                    Ok(0) => Ok(0),
                    Ok(_) => Ok(1), // a cheap lower bound; exact counts need SIOCINQ via libc
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
                    Err(e) => Err(e),
                }
            }
            RawStream::Unix(_) => Ok(0),
        }
    }
}

impl AsyncRead for RawStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RawStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            RawStream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RawStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            RawStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            RawStream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RawStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            RawStream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RawStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            RawStream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
