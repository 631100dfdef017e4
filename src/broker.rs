//! Connection-pooling broker: per-destination `Connector`s, SNI-bucketed idle/waiter queues, and
//! a gradual idle-trim sweeper. Grounded in the teacher's `worker.rs` connection-table bookkeeping
//! (a map the accept loop consults before spinning up new state), generalized from a single
//! shared table to the two-level `PoolKey -> SniBucket` map this spec calls for.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustls::{ClientConfig, ServerConfig};
use rustls_pki_types::ServerName;
use tokio::sync::oneshot;

use crate::connector::{Connector, Role};
use crate::error::{Error, Result};
use crate::info::InfoMap;
use crate::message::{Header, MessageLayer, RequestLine, ResponseLine, Status};
use crate::net::Destination;
use crate::runtime::Runtime;
use crate::strand::Strand;
use crate::stream::StreamLayer;

/// How long an unused idle bucket survives before the sweeper reclaims it.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Sweeper tick interval.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// TLS material for a broker-created connector. Mirrors [`crate::connector::Connector`]'s own
/// split, since the broker decides which constructor to call based on `Role`.
#[derive(Clone)]
pub enum BrokerTls {
    /// No TLS.
    None,
    /// Server-side TLS config (used when `role == Role::Server`).
    Server(Arc<ServerConfig>),
    /// Client-side TLS config plus requested SNI (used when `role == Role::Client`).
    Client(Arc<ClientConfig>, ServerName<'static>),
}

impl BrokerTls {
    fn into_server(self) -> Option<Arc<ServerConfig>> {
        match self {
            BrokerTls::Server(cfg) => Some(cfg),
            _ => None,
        }
    }

    fn into_client(self) -> Option<(Arc<ClientConfig>, ServerName<'static>)> {
        match self {
            BrokerTls::Client(cfg, name) => Some((cfg, name)),
            _ => None,
        }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Server => "server",
        Role::Client => "client",
    }
}

/// Identifies one `(destination, role)` pool: `<host>:<port>:<role>` for TCP, `<path>:<role>` for
/// UNIX-domain destinations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey(String);

impl PoolKey {
    fn new(destination: &Destination, role: Role) -> Self {
        Self(format!("{}:{}", destination.key_prefix(), role_str(role)))
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn make_connector(destination: Destination, role: Role, tls: BrokerTls, runtime: &Arc<Runtime>) -> Connector {
    match role {
        Role::Server => Connector::server(destination, tls.into_server(), runtime),
        Role::Client => Connector::client(destination, tls.into_client(), runtime),
    }
}

struct Bucket {
    waiters: VecDeque<oneshot::Sender<Result<BrokerHandle>>>,
    idle: VecDeque<MessageLayer>,
    last_usage: tokio::time::Instant,
}

impl Bucket {
    fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
            idle: VecDeque::new(),
            last_usage: tokio::time::Instant::now(),
        }
    }
}

struct PoolEntry {
    connector: Arc<Connector>,
    buckets: HashMap<String, Bucket>,
}

type Pools = HashMap<PoolKey, PoolEntry>;

/// A connection-pooling broker keyed by `(destination, role)` with an SNI-bucketed second level.
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct Broker {
    runtime: Arc<Runtime>,
    strand: Strand,
    pools: Arc<Mutex<Pools>>,
}

impl Broker {
    /// Creates an empty broker and starts its idle-trim sweeper.
    pub fn new(runtime: &Arc<Runtime>) -> Self {
        let pools = Arc::new(Mutex::new(HashMap::new()));
        let strand = Strand::new(runtime);
        spawn_sweeper(runtime, strand.clone(), Arc::clone(&pools));
        Self {
            runtime: Arc::clone(runtime),
            strand,
            pools,
        }
    }

    /// Hands back an idle pooled connection for `(destination, role, sni)`, or asks the
    /// destination's connector for a new one.
    pub async fn get(
        &self,
        destination: Destination,
        role: Role,
        tls: BrokerTls,
        sni: Option<String>,
    ) -> Result<BrokerHandle> {
        let pool_key = PoolKey::new(&destination, role);
        let sni_key = sni.unwrap_or_default();

        enum Outcome {
            Idle(MessageLayer),
            Wait(oneshot::Receiver<Result<BrokerHandle>>, Arc<Connector>),
        }

        let pools = Arc::clone(&self.pools);
        let runtime = Arc::clone(&self.runtime);
        let pool_key_reg = pool_key.clone();
        let sni_key_reg = sni_key.clone();
        let outcome = self
            .strand
            .post_and_wait(async move {
                let mut pools = pools.lock();
                let entry = pools.entry(pool_key_reg).or_insert_with(|| PoolEntry {
                    connector: Arc::new(make_connector(destination, role, tls, &runtime)),
                    buckets: HashMap::new(),
                });
                let bucket = entry.buckets.entry(sni_key_reg).or_insert_with(Bucket::new);
                bucket.last_usage = tokio::time::Instant::now();
                if let Some(message) = bucket.idle.pop_front() {
                    Outcome::Idle(message)
                } else {
                    let (tx, rx) = oneshot::channel();
                    bucket.waiters.push_back(tx);
                    Outcome::Wait(rx, Arc::clone(&entry.connector))
                }
            })
            .await
            .expect("broker strand is still running");

        match outcome {
            Outcome::Idle(message) => Ok(BrokerHandle::new(self.clone(), pool_key, sni_key, message)),
            Outcome::Wait(rx, connector) => {
                let broker = self.clone();
                let pool_key_fetch = pool_key.clone();
                let sni_key_fetch = sni_key.clone();
                self.runtime.post(async move {
                    match connector.async_connection().await {
                        Ok(connection) => {
                            let message = MessageLayer::new(StreamLayer::new(connection));
                            let broker = broker.clone();
                            broker.strand.post(async move {
                                broker.put_sync(pool_key_fetch, message);
                            });
                        }
                        Err(e) => {
                            tracing::warn!(target: "stranded::broker", pool_key = %pool_key_fetch, error = %e, "connector failed to fill a pool miss");
                            let broker = broker.clone();
                            broker.strand.post(async move {
                                broker.fail_one_waiter_sync(&pool_key_fetch, &sni_key_fetch, e);
                            });
                        }
                    }
                });
                rx.await.map_err(|_| Error::NoUnderlyingConnection)?
            }
        }
    }

    /// Synchronous pool mutation: delivers `message` to a waiting caller, or parks it idle.
    /// Called only from tasks already running on `self.strand` (the broker handle's `Drop`, or
    /// the `get`-spawned fetch task's own strand-posted continuation) — never posts further work
    /// onto the strand itself, avoiding the self-wait a nested `post_and_wait` would cause.
    fn put_sync(&self, pool_key: PoolKey, message: MessageLayer) {
        let sni = message.get_sni();
        let mut pools = self.pools.lock();
        if let Some(entry) = pools.get_mut(&pool_key) {
            let bucket = entry.buckets.entry(sni.clone()).or_insert_with(Bucket::new);
            bucket.last_usage = tokio::time::Instant::now();
            match bucket.waiters.pop_front() {
                Some(waiter) => {
                    let handle = BrokerHandle::new(self.clone(), pool_key, sni, message);
                    let _ = waiter.send(Ok(handle));
                }
                None => bucket.idle.push_back(message),
            }
        }
        // A missing pool entry means the sweeper reclaimed it mid-fetch; the connection is
        // simply dropped (closed on `MessageLayer`'s own drop).
    }

    fn fail_one_waiter_sync(&self, pool_key: &PoolKey, sni: &str, err: Error) {
        let mut pools = self.pools.lock();
        if let Some(entry) = pools.get_mut(pool_key) {
            if let Some(bucket) = entry.buckets.get_mut(sni) {
                if let Some(waiter) = bucket.waiters.pop_front() {
                    let _ = waiter.send(Err(err));
                }
            }
        }
    }
}

fn spawn_sweeper(runtime: &Arc<Runtime>, strand: Strand, pools: Arc<Mutex<Pools>>) {
    runtime.post(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let pools = Arc::clone(&pools);
            strand.post(async move { sweep_once(&pools) });
        }
    });
}

fn sweep_once(pools: &Arc<Mutex<Pools>>) {
    let now = tokio::time::Instant::now();
    let mut pools = pools.lock();
    let mut dead_pool_keys = Vec::new();
    for (pool_key, entry) in pools.iter_mut() {
        let mut sni_keys: Vec<String> = entry.buckets.keys().cloned().collect();
        // the empty-SNI (default) bucket is evaluated last, so buckets that fall back to it are
        // cleaned up first.
        sni_keys.sort_by_key(|k| k.is_empty());

        let mut dead_bucket_keys = Vec::new();
        for sni in sni_keys {
            let bucket = entry.buckets.get_mut(&sni).expect("key just collected above");
            if !bucket.waiters.is_empty() {
                continue;
            }
            if now.saturating_duration_since(bucket.last_usage) < IDLE_TIMEOUT {
                continue;
            }
            if let Some(connection) = bucket.idle.pop_front() {
                // gradual drain: exactly one idle connection reclaimed per sweep cycle.
                drop(connection);
            } else {
                dead_bucket_keys.push(sni);
            }
        }
        for key in dead_bucket_keys {
            tracing::debug!(target: "stranded::broker", pool_key = %pool_key, sni = %key, "reclaiming idle bucket");
            entry.buckets.remove(&key);
        }
        if entry.buckets.is_empty() {
            dead_pool_keys.push(pool_key.clone());
        }
    }
    for key in dead_pool_keys {
        tracing::debug!(target: "stranded::broker", pool_key = %key, "reclaiming pool key with no remaining buckets");
        pools.remove(&key);
    }
}

/// A pooled [`MessageLayer`] borrowed from a [`Broker`]. Returned to the pool automatically when
/// dropped.
pub struct BrokerHandle {
    broker: Broker,
    pool_key: PoolKey,
    sni: String,
    message: Option<MessageLayer>,
}

impl BrokerHandle {
    fn new(broker: Broker, pool_key: PoolKey, sni: String, message: MessageLayer) -> Self {
        Self {
            broker,
            pool_key,
            sni,
            message: Some(message),
        }
    }

    fn message_ref(&self) -> Result<&MessageLayer> {
        self.message.as_ref().ok_or(Error::NoUnderlyingConnection)
    }

    fn message_mut(&mut self) -> Result<&mut MessageLayer> {
        self.message.as_mut().ok_or(Error::NoUnderlyingConnection)
    }

    /// Transport metadata of the wrapped connection.
    pub fn info(&self) -> Result<InfoMap> {
        Ok(self.message_ref()?.info().cloned().unwrap_or_default())
    }

    /// SNI of the wrapped connection (empty string if none or if the connection is gone).
    pub fn get_sni(&self) -> String {
        self.message.as_ref().map(|m| m.get_sni()).unwrap_or_default()
    }

    /// Whether the wrapped connection is open.
    pub fn is_open(&self) -> bool {
        self.message.as_ref().map(|m| m.is_open()).unwrap_or(false)
    }

    /// Pending readable bytes on the wrapped connection.
    pub async fn available(&self) -> Result<usize> {
        self.message_ref()?.available().await
    }

    /// Cancels outstanding operations on the wrapped connection.
    pub fn cancel(&self) {
        if let Some(m) = &self.message {
            m.cancel();
        }
    }

    /// Closes the wrapped connection. A closed handle is still returned to the pool on drop, but
    /// the next `get` for its bucket will observe it closed and discard it on first I/O.
    pub async fn close(&mut self) {
        if let Some(m) = self.message.as_mut() {
            m.close().await;
        }
    }

    /// Delegates to the wrapped connection's strand.
    pub fn post<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(m) = &self.message {
            m.post(task);
        }
    }

    /// Current exchange state of the wrapped message layer.
    pub fn status(&self) -> Option<Status> {
        self.message.as_ref().map(|m| m.status())
    }

    /// Writes a request line and headers.
    pub async fn async_write_request_headers(&mut self, request: RequestLine, headers: &[Header]) -> Result<()> {
        self.message_mut()?.async_write_request_headers(request, headers).await
    }

    /// Reads a request line and headers.
    pub async fn async_read_request_headers(&mut self) -> Result<(RequestLine, Vec<Header>)> {
        self.message_mut()?.async_read_request_headers().await
    }

    /// Writes a status line and headers.
    pub async fn async_write_response_headers(&mut self, response: ResponseLine, headers: &[Header]) -> Result<()> {
        self.message_mut()?.async_write_response_headers(response, headers).await
    }

    /// Reads a status line and headers.
    pub async fn async_read_response_headers(&mut self) -> Result<(ResponseLine, Vec<Header>)> {
        self.message_mut()?.async_read_response_headers().await
    }

    /// Writes body bytes. The broker wrapper guards body I/O: a handle whose headers phase is
    /// still `Status::Unknown` (no request/response headers staged yet) is rejected rather than
    /// silently writing a headerless body.
    pub async fn async_write_body(&mut self, data: &[u8], bytes_left: &mut usize) -> Result<()> {
        self.guard_body_io()?;
        self.message_mut()?.async_write_body(data, bytes_left).await
    }

    /// Reads body bytes. The broker wrapper guards body I/O: a handle whose headers phase is
    /// still `Status::Unknown` (no request/response headers read yet) is rejected rather than
    /// silently reading a headerless body.
    pub async fn async_read_body(&mut self, data: &mut Vec<u8>, bytes_left: &mut usize) -> Result<()> {
        self.guard_body_io()?;
        self.message_mut()?.async_read_body(data, bytes_left).await
    }

    fn guard_body_io(&self) -> Result<()> {
        match self.message_ref()?.status() {
            Status::Unknown => Err(Error::InvalidExchangeState),
            _ => Ok(()),
        }
    }
}

impl Drop for BrokerHandle {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            let broker = self.broker.clone();
            let pool_key = self.pool_key.clone();
            // Cannot `.await` in `Drop`; hand the connection off through the strand's
            // non-blocking mpsc sender instead.
            self.broker.strand.post(async move {
                broker.put_sync(pool_key, message);
            });
        }
        let _ = &self.sni; // retained for diagnostics/symmetry with `pool_key`
    }
}
