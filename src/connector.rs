//! Accept-loop / dial-loop connectors. Grounded in the teacher's `Listener`/`MultiListener`
//! accept-loop shape (`src/listener.rs`, `src/multilistener.rs`) and its TLS wrapping in
//! `src/connection.rs`, generalized from a single-threaded `mio` poll loop to per-call
//! `async fn`s driven by `tokio`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, ServerConfig};
use rustls_pki_types::ServerName;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::info::InfoMap;
use crate::net::raw::RawStream;
use crate::net::unix::OwnedListener;
use crate::net::{tcp, unix, Destination, PeerAddr};
use crate::resolver::{resolve_tcp, EndpointList};
use crate::runtime::Runtime;
use crate::strand::Strand;

/// Per-attempt watchdog applied to resolution and each connect/bind attempt.
pub const WATCHDOG: Duration = Duration::from_secs(60);

/// Process-wide counter stamped into every produced connection's `InfoMap` as `connection_seq` —
/// lets a caller (or a test) distinguish "the same underlying connection" from "a freshly dialed
/// one" without comparing socket addresses.
static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Which side of the connection this connector produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts inbound connections.
    Server,
    /// Dials outbound connections.
    Client,
}

enum ServerListener {
    Tcp(TcpListener),
    Unix(OwnedListener),
}

#[derive(Default)]
struct ServerState {
    listener: Option<ServerListener>,
    error: Option<String>,
}

enum TlsMode {
    None,
    Server(Arc<ServerConfig>),
    Client(Arc<ClientConfig>, ServerName<'static>),
}

fn server_name_to_string(name: &ServerName<'_>) -> String {
    match name {
        ServerName::DnsName(dns) => dns.as_ref().to_owned(),
        other => format!("{other:?}"),
    }
}

/// Produces [`Connection`]s by accepting (server role) or dialing (client role).
pub struct Connector {
    role: Role,
    destination: Destination,
    tls: TlsMode,
    runtime: Arc<Runtime>,
    strand: Strand,
    info: InfoMap,
    server_state: Arc<AsyncMutex<ServerState>>,
    closed: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
}

impl Connector {
    /// A connector that accepts inbound connections at `destination`. `tls` wraps every accepted
    /// socket in TLS when supplied.
    pub fn server(destination: Destination, tls: Option<Arc<ServerConfig>>, runtime: &Arc<Runtime>) -> Self {
        let mut info = InfoMap::new();
        populate_destination_info(&mut info, &destination);
        info.set("connector_server", "1");
        info.set("socket_enc", if tls.is_some() { "1" } else { "0" });
        Self {
            role: Role::Server,
            destination,
            tls: tls.map(TlsMode::Server).unwrap_or(TlsMode::None),
            runtime: Arc::clone(runtime),
            strand: Strand::new(runtime),
            info,
            server_state: Arc::new(AsyncMutex::new(ServerState::default())),
            closed: Arc::new(AtomicBool::new(false)),
            cancel_notify: Arc::new(Notify::new()),
        }
    }

    /// A connector that dials `destination` fresh on every `async_connection` call (no caching).
    /// `tls` wraps the dialed socket in TLS, using `sni` as the requested server name, when
    /// supplied.
    pub fn client(
        destination: Destination,
        tls: Option<(Arc<ClientConfig>, ServerName<'static>)>,
        runtime: &Arc<Runtime>,
    ) -> Self {
        let mut info = InfoMap::new();
        populate_destination_info(&mut info, &destination);
        info.set("connector_server", "0");
        let tls = match tls {
            Some((cfg, name)) => {
                info.set("connector_sni", server_name_to_string(&name));
                info.set("socket_enc", "1");
                TlsMode::Client(cfg, name)
            }
            None => {
                info.set("socket_enc", "0");
                TlsMode::None
            }
        };
        Self {
            role: Role::Client,
            destination,
            tls,
            runtime: Arc::clone(runtime),
            strand: Strand::new(runtime),
            info,
            server_state: Arc::new(AsyncMutex::new(ServerState::default())),
            closed: Arc::new(AtomicBool::new(false)),
            cancel_notify: Arc::new(Notify::new()),
        }
    }

    /// Which role this connector plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Delivers one [`Connection`]: one `accept` for a server connector, one dial attempt across
    /// the resolved endpoint list for a client connector.
    pub async fn async_connection(&self) -> Result<Connection> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        let work = async {
            match self.role {
                Role::Server => self.accept_one().await,
                Role::Client => self.dial_one().await,
            }
        };
        tokio::select! {
            result = work => result,
            _ = self.cancel_notify.notified() => Err(Error::Cancelled),
        }
    }

    /// Closes the connector: no further connections are produced. For a server connector this
    /// also drops the listener immediately, which unlinks a UNIX-domain bind path right away
    /// rather than waiting for the whole `Connector` to be dropped.
    pub fn close(&self) {
        let closed = Arc::clone(&self.closed);
        let server_state = Arc::clone(&self.server_state);
        self.strand.post(async move {
            closed.store(true, Ordering::SeqCst);
            server_state.lock().await.listener = None;
        });
    }

    /// Whether the connector has not been closed.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// For a server connector, whether binding has latched a terminal error. Always `false` for
    /// a client connector, which re-resolves (and so can always retry) on every call.
    pub fn is_error(&self) -> bool {
        match self.role {
            Role::Server => self
                .server_state
                .try_lock()
                .map(|state| state.error.is_some())
                .unwrap_or(false),
            Role::Client => false,
        }
    }

    /// Aborts an in-flight `async_connection` call with `Error::Cancelled`.
    pub fn cancel(&self) {
        self.cancel_notify.notify_waiters();
    }

    /// For a TCP server connector, forces the listener to bind (a no-op if already bound) and
    /// reports the address it bound to — chiefly useful for learning an ephemeral port before the
    /// first `async_connection` call. Not meaningful for a client connector or a UNIX-domain
    /// server, both of which return `Error::NotConnected`.
    pub async fn local_addr(&self) -> Result<std::net::SocketAddr> {
        if self.role != Role::Server {
            return Err(Error::NotConnected);
        }
        self.ensure_listener().await?;
        let state = self.server_state.lock().await;
        match state.listener.as_ref() {
            Some(ServerListener::Tcp(listener)) => Ok(listener.local_addr()?),
            Some(ServerListener::Unix(_)) => Err(Error::NotConnected),
            None => unreachable!("ensure_listener guarantees a listener is present"),
        }
    }

    async fn ensure_listener(&self) -> Result<()> {
        let mut state = self.server_state.lock().await;
        if state.listener.is_some() {
            return Ok(());
        }
        if let Some(err) = &state.error {
            return Err(Error::Resolution(err.clone()));
        }
        match self.bind().await {
            Ok(listener) => {
                state.listener = Some(listener);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(target: "stranded::connector", error = %e, "bind failed, latching error for future calls");
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn bind(&self) -> Result<ServerListener> {
        match &self.destination {
            Destination::Tcp { host, port } => {
                let endpoints = resolve_tcp(host, *port).await?;
                let addrs = match &endpoints {
                    EndpointList::Tcp { addresses, .. } => addresses.as_slice(),
                    EndpointList::Unix { .. } => &[],
                };
                let (listener, _bound) = tcp::bind_first(addrs).await?;
                Ok(ServerListener::Tcp(listener))
            }
            Destination::Unix { path } => {
                let listener = OwnedListener::bind(path)?;
                Ok(ServerListener::Unix(listener))
            }
        }
    }

    async fn accept_one(&self) -> Result<Connection> {
        self.ensure_listener().await?;
        let mut info = self.info.clone();
        let raw = {
            let state = self.server_state.lock().await;
            match state.listener.as_ref() {
                Some(ServerListener::Tcp(listener)) => {
                    let (stream, _addr) = listener.accept().await?;
                    info.set("socket_type", "tcp");
                    RawStream::Tcp(stream)
                }
                Some(ServerListener::Unix(listener)) => {
                    let (stream, _addr) = listener.accept().await?;
                    info.set("socket_type", "local");
                    RawStream::Unix(stream)
                }
                None => unreachable!("ensure_listener guarantees a listener is present"),
            }
        };
        if let Ok(PeerAddr::Tcp { local, remote }) = raw.peer_addr() {
            info.set("socket_local", local.to_string());
            info.set("socket_remote", remote.to_string());
        }
        info.set("connection_seq", CONNECTION_SEQ.fetch_add(1, Ordering::SeqCst).to_string());
        tracing::debug!(target: "stranded::connector", remote = info.get("socket_remote").unwrap_or(""), "accepted connection");

        let strand = Strand::new(&self.runtime);
        match &self.tls {
            TlsMode::None => Ok(Connection::plain(raw, info, strand)),
            TlsMode::Server(cfg) => {
                let acceptor = tokio_rustls::TlsAcceptor::from(Arc::clone(cfg));
                let tls_stream = acceptor.accept(raw).await.inspect_err(|e| {
                    tracing::warn!(target: "stranded::connector", error = %e, "tls handshake failed");
                })?;
                let sni = tls_stream
                    .get_ref()
                    .1
                    .server_name()
                    .unwrap_or_default()
                    .to_string();
                info.set("connector_sni", sni.clone());
                Ok(Connection::tls_server(tls_stream, info, strand, sni))
            }
            TlsMode::Client(..) => unreachable!("a server connector never holds client tls"),
        }
    }

    async fn dial_one(&self) -> Result<Connection> {
        let mut info = self.info.clone();
        let raw = match &self.destination {
            Destination::Tcp { host, port } => {
                let endpoints = resolve_tcp(host, *port).await?;
                let addrs = match &endpoints {
                    EndpointList::Tcp { addresses, .. } => addresses.as_slice(),
                    EndpointList::Unix { .. } => &[],
                };
                let stream = tcp::connect_first(addrs, WATCHDOG).await?;
                info.set("socket_type", "tcp");
                RawStream::Tcp(stream)
            }
            Destination::Unix { path } => {
                let stream = unix::connect(path, WATCHDOG).await?;
                info.set("socket_type", "local");
                RawStream::Unix(stream)
            }
        };
        if let Ok(PeerAddr::Tcp { local, remote }) = raw.peer_addr() {
            info.set("socket_local", local.to_string());
            info.set("socket_remote", remote.to_string());
        }
        info.set("connection_seq", CONNECTION_SEQ.fetch_add(1, Ordering::SeqCst).to_string());
        tracing::debug!(target: "stranded::connector", remote = info.get("socket_remote").unwrap_or(""), "dialed connection");

        let strand = Strand::new(&self.runtime);
        match &self.tls {
            TlsMode::None => Ok(Connection::plain(raw, info, strand)),
            TlsMode::Client(cfg, name) => {
                let connector = tokio_rustls::TlsConnector::from(Arc::clone(cfg));
                let sni = server_name_to_string(name);
                let tls_stream = connector.connect(name.clone(), raw).await.inspect_err(|e| {
                    tracing::warn!(target: "stranded::connector", error = %e, "tls handshake failed");
                })?;
                Ok(Connection::tls_client(tls_stream, info, strand, sni))
            }
            TlsMode::Server(..) => unreachable!("a client connector never holds server tls"),
        }
    }
}

fn populate_destination_info(info: &mut InfoMap, destination: &Destination) {
    match destination {
        Destination::Tcp { host, port } => {
            info.set("connector_host", host);
            info.set("connector_port", port.to_string());
        }
        Destination::Unix { path } => {
            info.set("connector_path", path.display().to_string());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn server_then_client_round_trip_over_tcp() {
        let rt = Runtime::new().unwrap();
        rt.run();
        rt.run_join(async {
            let server = Connector::server(
                Destination::Tcp {
                    host: "127.0.0.1".into(),
                    port: 0,
                },
                None,
                &rt,
            );
            // Force bind so we can learn the ephemeral port before dialing.
            server.ensure_listener().await.unwrap();
            let port = {
                let state = server.server_state.lock().await;
                match state.listener.as_ref().unwrap() {
                    ServerListener::Tcp(l) => l.local_addr().unwrap().port(),
                    ServerListener::Unix(_) => unreachable!(),
                }
            };

            let client = Connector::client(
                Destination::Tcp {
                    host: "127.0.0.1".into(),
                    port,
                },
                None,
                &rt,
            );

            let accepted = tokio::spawn(async move { server.async_connection().await });
            let dialed = client.async_connection().await.unwrap();
            let accepted = accepted.await.unwrap().unwrap();

            assert!(dialed.is_open());
            assert!(accepted.is_open());
        });
    }

    #[test]
    fn closed_connector_refuses_further_connections() {
        let rt = Runtime::new().unwrap();
        rt.run();
        rt.run_join(async {
            let client = Connector::client(
                Destination::Tcp {
                    host: "127.0.0.1".into(),
                    port: 1,
                },
                None,
                &rt,
            );
            client.close();
            let result = client.async_connection().await;
            assert!(matches!(result, Err(Error::NotConnected)));
        });
    }
}
