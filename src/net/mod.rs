//! Transport-family helpers. The rest of the crate talks to [`Destination`] and the raw
//! connection types rather than reaching into `tcp`/`unix` directly.

pub mod raw;
pub mod tcp;
pub mod unix;

use std::net::SocketAddr;
use std::path::PathBuf;

/// What a connector binds/dials: either a TCP `host:port`, or a UNIX-domain path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// TCP destination.
    Tcp {
        /// Hostname or literal address, as supplied by the caller.
        host: String,
        /// Port number.
        port: u16,
    },
    /// UNIX-domain destination.
    Unix {
        /// Socket path.
        path: PathBuf,
    },
}

impl Destination {
    /// Renders the `<host>:<port>` / `<path>` half of a [`crate::broker::PoolKey`].
    pub fn key_prefix(&self) -> String {
        match self {
            Destination::Tcp { host, port } => format!("{host}:{port}"),
            Destination::Unix { path } => path.display().to_string(),
        }
    }
}

/// Raw (pre-TLS) socket addresses observed on a connection, used to populate the `InfoMap`.
#[derive(Debug, Clone)]
pub enum PeerAddr {
    /// TCP local/remote pair.
    Tcp {
        /// Local socket address.
        local: SocketAddr,
        /// Remote socket address.
        remote: SocketAddr,
    },
    /// UNIX-domain path (both ends share the same bind path in practice).
    Unix {
        /// Path the accepting/connecting socket used.
        path: Option<PathBuf>,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_prefix_matches_pool_key_contract() {
        let tcp = Destination::Tcp {
            host: "example.com".into(),
            port: 443,
        };
        assert_eq!("example.com:443", tcp.key_prefix());

        let unix = Destination::Unix {
            path: "/tmp/sock".into(),
        };
        assert_eq!("/tmp/sock", unix.key_prefix());
    }
}
