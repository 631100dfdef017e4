//! A single accepted/dialed connection: one socket (raw or TLS-wrapped), one strand, one
//! `InfoMap`. Grounded in the teacher's `Connection` trait / `PlainConnection`+`TlsConnection`
//! split (`src/connection.rs`), generalized from HTTP-only `mio` state machines to a
//! transport-and-TLS-erased async type the stream layer can read/write through uniformly.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_rustls::{client, server};

use crate::error::{Error, Result};
use crate::info::InfoMap;
use crate::net::raw::RawStream;
use crate::strand::Strand;

enum Io {
    Plain(RawStream),
    TlsServer(Box<server::TlsStream<RawStream>>),
    TlsClient(Box<client::TlsStream<RawStream>>),
}

impl Io {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Io::Plain(s) => s.read(buf).await,
            Io::TlsServer(s) => s.read(buf).await,
            Io::TlsClient(s) => s.read(buf).await,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Io::Plain(s) => s.write(buf).await,
            Io::TlsServer(s) => s.write(buf).await,
            Io::TlsClient(s) => s.write(buf).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Io::Plain(s) => s.shutdown().await,
            // TLS close performs the protocol-level shutdown before the lowest-layer close;
            // `AsyncWriteExt::shutdown` on a `tokio_rustls` stream already does exactly that.
            Io::TlsServer(s) => s.shutdown().await,
            Io::TlsClient(s) => s.shutdown().await,
        }
    }

    async fn available(&self) -> io::Result<usize> {
        match self {
            Io::Plain(s) => s.available().await,
            Io::TlsServer(s) => s.get_ref().0.available().await,
            Io::TlsClient(s) => s.get_ref().0.available().await,
        }
    }
}

/// One connection: raw or TLS, TCP or UNIX. All socket operations are expected to be driven
/// through [`Connection::post`] by higher layers so that only one read and one write are ever
/// in flight at a time (the stream layer is the only caller that does this directly).
pub struct Connection {
    io: Io,
    info: InfoMap,
    sni: String,
    strand: Strand,
    open: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

impl Connection {
    /// Wraps a raw (non-TLS) stream.
    pub fn plain(io: RawStream, info: InfoMap, strand: Strand) -> Self {
        Self {
            io: Io::Plain(io),
            info,
            sni: String::new(),
            strand,
            open: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Wraps a server-side TLS stream. `sni` is the client-offered name read off the completed
    /// handshake (empty if the client sent none).
    pub fn tls_server(
        io: server::TlsStream<RawStream>,
        info: InfoMap,
        strand: Strand,
        sni: String,
    ) -> Self {
        Self {
            io: Io::TlsServer(Box::new(io)),
            info,
            sni,
            strand,
            open: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Wraps a client-side TLS stream. `sni` is the name the caller supplied when dialing.
    pub fn tls_client(
        io: client::TlsStream<RawStream>,
        info: InfoMap,
        strand: Strand,
        sni: String,
    ) -> Self {
        Self {
            io: Io::TlsClient(Box::new(io)),
            info,
            sni,
            strand,
            open: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Transport metadata inherited from the connector plus whatever this connection added.
    pub fn info(&self) -> &InfoMap {
        &self.info
    }

    /// SNI recorded at handshake; empty for raw connections.
    pub fn get_sni(&self) -> &str {
        &self.sni
    }

    /// Schedules `task` on this connection's strand — the sole mechanism for external code to
    /// piggy-back on the connection's serial executor.
    pub fn post<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.strand.post(task);
    }

    /// Whether the lowest-layer socket is still open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Cancels all outstanding async operations on this connection with [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.notify_waiters();
    }

    /// Pending readable bytes on the lowest layer (best-effort; see [`RawStream::available`]).
    pub async fn available(&self) -> Result<usize> {
        Ok(self.io.available().await?)
    }

    /// Reads up to `buf.len()` bytes, completing with the number of bytes transferred (which may
    /// be less than `buf.len()`).
    pub async fn async_read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        tokio::select! {
            result = self.io.read(buf) => {
                let n = result?;
                if n == 0 {
                    self.open.store(false, Ordering::Release);
                }
                Ok(n)
            }
            _ = self.cancel.notified() => Err(Error::Cancelled),
        }
    }

    /// Writes up to `buf.len()` bytes, completing with the number of bytes transferred.
    pub async fn async_write_some(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        tokio::select! {
            result = self.io.write(buf) => Ok(result?),
            _ = self.cancel.notified() => Err(Error::Cancelled),
        }
    }

    /// Closes the connection. For TLS this performs protocol shutdown before the lowest-layer
    /// close; failures during close are logged and swallowed (idempotent close-on-close).
    pub async fn close(&mut self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return; // already closed
        }
        if let Err(e) = self.io.shutdown().await {
            tracing::warn!(error = %e, "error while closing connection");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("sni", &self.sni)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::Runtime;

    async fn make_pair(strand: Strand) -> (Connection, Connection) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let server = accept.await.unwrap();
        (
            Connection::plain(RawStream::Tcp(client), InfoMap::new(), strand.clone()),
            Connection::plain(RawStream::Tcp(server), InfoMap::new(), strand),
        )
    }

    #[test]
    fn read_write_round_trip() {
        let rt = Runtime::new().unwrap();
        rt.run();
        rt.run_join(async {
            let strand = Strand::new(&rt);
            let (mut a, mut b) = make_pair(strand).await;
            a.async_write_some(b"hello").await.unwrap();
            let mut buf = [0u8; 5];
            let n = b.async_read_some(&mut buf).await.unwrap();
            assert_eq!(5, n);
            assert_eq!(b"hello", &buf);
        });
    }

    #[test]
    fn cancel_aborts_a_pending_read() {
        let rt = Runtime::new().unwrap();
        rt.run();
        rt.run_join(async {
            let strand = Strand::new(&rt);
            let (a, mut b) = make_pair(strand).await;
            let cancel_handle = b.cancel.clone();
            let read = tokio::spawn(async move {
                let mut buf = [0u8; 1];
                b.async_read_some(&mut buf).await
            });
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel_handle.notify_waiters();
            let result = read.await.unwrap();
            assert!(matches!(result, Err(Error::Cancelled)));
            drop(a); // keep alive until here so the peer socket is not closed under `b`
        });
    }

    #[test]
    fn close_is_idempotent() {
        let rt = Runtime::new().unwrap();
        rt.run();
        rt.run_join(async {
            let strand = Strand::new(&rt);
            let (_a, mut b) = make_pair(strand).await;
            b.close().await;
            b.close().await; // must not panic or re-enter a closed socket
            assert!(!b.is_open());
        });
    }
}
