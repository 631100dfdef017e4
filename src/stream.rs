//! Buffered byte I/O over a [`Connection`]. Grounded in the teacher's buffered-read patterns in
//! `connection.rs`/`worker.rs` (a fixed-size scratch buffer topped up from the socket, drained
//! into caller-owned `Vec`s), generalized from a fixed 8 KiB slab entry to a caller-sized `Vec`.

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Largest slice transferred to or from the socket in a single `async_write_string`/
/// `async_read_string` call.
pub const CHUNK_SIZE: usize = 65_536;

/// Wraps a [`Connection`] with the two buffered operations every higher layer builds on. Not
/// self-serializing: callers that need ordering between a write and a read on the same stream
/// must route both through [`StreamLayer::post`] (typically via the owning `MessageLayer`'s own
/// strand).
pub struct StreamLayer {
    connection: Option<Connection>,
}

impl StreamLayer {
    /// Wraps `connection`.
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// Borrows the underlying connection, if still present.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Borrows the underlying connection mutably, if still present.
    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    /// Drops the underlying connection, if any is held.
    pub fn take_connection(&mut self) -> Option<Connection> {
        self.connection.take()
    }

    /// Transfers as many bytes as the socket accepts this turn (capped at [`CHUNK_SIZE`]),
    /// removing them from the front of `buf`.
    pub async fn async_write_string(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        if buf.is_empty() {
            return Err(Error::NoData);
        }
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        let take = buf.len().min(CHUNK_SIZE);
        let written = connection.async_write_some(&buf[..take]).await?;
        buf.drain(..written);
        Ok(())
    }

    /// Appends up to [`CHUNK_SIZE`] bytes to `buf`. `cap` is the caller-imposed ceiling on
    /// `buf`'s length; reaching it without room for at least one more byte is `Error::NoBufferSpace`.
    pub async fn async_read_string(&mut self, buf: &mut Vec<u8>, cap: usize) -> Result<()> {
        if buf.len() >= cap {
            return Err(Error::NoBufferSpace);
        }
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
        let want = (cap - buf.len()).min(CHUNK_SIZE);
        let start = buf.len();
        buf.resize(start + want, 0);
        let n = connection.async_read_some(&mut buf[start..]).await?;
        buf.truncate(start + n);
        Ok(())
    }

    /// Delegates to the underlying connection's strand.
    pub fn post<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if let Some(connection) = &self.connection {
            connection.post(task);
        }
    }
}
