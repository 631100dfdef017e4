//! Asynchronous connection toolkit: name resolution, accept/dial connectors (TCP or UNIX-domain,
//! optional TLS with SNI), a layered byte-buffered I/O stack, an HTTP/1.x-line-style
//! request/response codec, a connection-pooling broker, a keyed mutual-exclusion lock, and a
//! hybrid wall-clock/monotonic timer — all driven by a shared [`runtime::Runtime`] and serialized,
//! where state is shared, through per-object [`strand::Strand`]s.
//!
//! # Layering
//!
//! ```text
//! resolver -> connector -> connection -> stream -> message -> broker
//!                                                      ^
//!                                                   lock, timer (independent of the above)
//! ```
//!
//! Each layer only depends on the one below it; `broker` is the only layer that depends on
//! `connector` directly (to mint new connections on a pool miss).

pub mod broker;
pub mod connection;
pub mod connector;
pub mod error;
pub mod info;
pub mod lock;
pub mod message;
pub mod net;
pub mod resolver;
pub mod runtime;
pub mod stream;
pub mod strand;
pub mod timer;

pub use broker::{Broker, BrokerHandle, BrokerTls, PoolKey};
pub use connection::Connection;
pub use connector::{Connector, Role};
pub use error::{Error, Result};
pub use info::InfoMap;
pub use lock::{KeyedLock, LockGuard};
pub use message::{Header, MessageLayer, RequestLine, ResponseLine, Status as MessageStatus};
pub use net::Destination;
pub use resolver::EndpointList;
pub use runtime::Runtime;
pub use strand::Strand;
pub use stream::StreamLayer;
pub use timer::{Status as TimerStatus, Timer};
