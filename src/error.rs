//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate resolves to [`Error`]. Several variants carry the
//! POSIX-compatible integer the source protocol used on the wire/ABI boundary; [`Error::as_errno`]
//! recovers it for callers that still need an errno-shaped value to hand to other code.

use std::io;

/// Errors produced by the resolver, connector, stream layer, message layer, broker, and lock.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying socket gave a transient or terminal I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Name resolution failed or exceeded its watchdog.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// The message/stream layer has no underlying connection to operate on.
    #[error("not connected")]
    NotConnected,

    /// `async_write_string` was called with an empty buffer.
    #[error("no data to write")]
    NoData,

    /// `async_read_string` could not grow its buffer to accept more bytes.
    #[error("read buffer exhausted")]
    NoBufferSpace,

    /// A request/status line or header exceeded the configured `max_read` bound.
    #[error("message line exceeded maximum size")]
    MessageSize,

    /// Body I/O was attempted while the message layer's state machine was not primed for it.
    #[error("invalid exchange state for body i/o")]
    InvalidExchangeState,

    /// A broker handle's underlying connection is gone.
    #[error("broker handle has no underlying connection")]
    NoUnderlyingConnection,

    /// A connect/resolve attempt exceeded its watchdog.
    #[error("operation timed out")]
    TimedOut,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A timer expired with no waiter registered to observe it (used internally by the timer's
    /// cancellation path; surfaced only if a caller awaits a timer handle after cancelling it).
    #[error("timer expired")]
    Expired,

    /// TLS handshake or configuration failure.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
}

impl Error {
    /// Returns the POSIX-compatible integer the spec's wire/ABI boundary uses for this error
    /// kind, for interop with code that expects an errno-shaped value. `Io` forwards the
    /// underlying `raw_os_error()` when the platform provided one.
    pub fn as_errno(&self) -> i32 {
        // Values match the documented contract (ENOTCONN, ENODATA, ...) on Linux; they are
        // carried here as plain constants rather than `libc` bindings since no other part of
        // the crate needs a libc dependency.
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or(5 /* EIO */),
            Error::Resolution(_) => 110, // ETIMEDOUT as a reasonable fallback for resolution
            Error::NotConnected => 107,  // ENOTCONN
            Error::NoData => 61,         // ENODATA
            Error::NoBufferSpace => 105, // ENOBUFS
            Error::MessageSize => 90,    // EMSGSIZE
            Error::InvalidExchangeState => 52, // EBADE
            Error::NoUnderlyingConnection => 123, // ENOMEDIUM
            Error::TimedOut => 110,      // ETIMEDOUT
            Error::Cancelled => 125,     // ECANCELED
            Error::Expired => 62,        // ETIME
            Error::Tls(_) => 5,          // EIO
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn as_errno_maps_known_variants() {
        assert_eq!(107, Error::NotConnected.as_errno());
        assert_eq!(90, Error::MessageSize.as_errno());
        assert_eq!(52, Error::InvalidExchangeState.as_errno());
        assert_eq!(123, Error::NoUnderlyingConnection.as_errno());
    }

    #[test]
    fn io_error_forwards_raw_os_error() {
        let io_err = io::Error::from_raw_os_error(32); // EPIPE
        let err: Error = io_err.into();
        assert_eq!(32, err.as_errno());
    }
}
