//! UNIX-domain listener/stream helpers, the other half of the transport family the connector
//! supports alongside TCP.

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

/// Binds a UNIX-domain listener at `path`. Unlike TCP there is only ever one candidate address,
/// so there is no "first success wins" iteration — a stale socket file at `path` is removed
/// first, mirroring the source's unlink-on-bind-conflict behavior for a clean restart.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}

/// Connects to a UNIX-domain socket at `path`, applying a watchdog the same way the TCP dialer
/// does (UNIX connects are local and rarely hang, but the spec does not special-case transport
/// family for the watchdog).
pub async fn connect(path: &Path, watchdog: std::time::Duration) -> io::Result<UnixStream> {
    tokio::time::timeout(watchdog, UnixStream::connect(path))
        .await
        .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))?
}

/// Removes the filesystem entry a server socket created. Idempotent: a missing file is not an
/// error, matching the source's "unlink on close and on destruction" contract, which tolerates
/// being invoked twice (once at `close`, once at `Drop`).
pub fn unlink(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(?path, error = %e, "failed to unlink unix socket path");
        }
    }
}

/// Owns a bound UNIX listener plus the path it bound to, so the bind path can be unlinked on
/// `Drop` without the caller having to remember it separately.
pub struct OwnedListener {
    listener: UnixListener,
    path: PathBuf,
}

impl OwnedListener {
    /// Binds at `path`, taking ownership of cleanup.
    pub fn bind(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let listener = bind(&path)?;
        Ok(Self { listener, path })
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts one connection.
    pub async fn accept(&self) -> io::Result<(UnixStream, tokio::net::unix::SocketAddr)> {
        self.listener.accept().await
    }
}

impl Drop for OwnedListener {
    fn drop(&mut self) {
        unlink(&self.path);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn bind_and_connect_round_trips_a_byte() {
        let dir = std::env::temp_dir().join(format!("stranded-unix-test-{}", std::process::id()));
        let owned = OwnedListener::bind(&dir).unwrap();
        let path = owned.path().to_path_buf();

        let accept = tokio::spawn(async move { owned.accept().await });
        let mut client = connect(&path, std::time::Duration::from_secs(1))
            .await
            .unwrap();

        use tokio::io::AsyncWriteExt;
        client.write_all(b"x").await.unwrap();

        let (mut server, _) = accept.await.unwrap().unwrap();
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 1];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(b'x', buf[0]);

        assert!(!path.exists() || std::fs::remove_file(&path).is_ok());
    }

    #[test]
    fn unlink_tolerates_missing_file() {
        unlink(Path::new("/tmp/stranded-does-not-exist-xyz"));
    }
}
