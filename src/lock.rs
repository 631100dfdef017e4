//! Keyed mutual exclusion: one FIFO queue of waiters per key, unrelated keys fully parallel.
//! Grounded in the same strand-as-serial-executor pattern used throughout this crate (see
//! [`crate::strand`]) — the map of per-key queues lives on the lock's own strand rather than
//! behind a `Mutex` a caller could contend on directly.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::runtime::Runtime;
use crate::strand::Strand;

type WaiterQueue = VecDeque<oneshot::Sender<LockGuard>>;

/// A keyed mutual-exclusion service. Cheap to clone; clones share the same key map.
#[derive(Clone)]
pub struct KeyedLock {
    strand: Strand,
    map: Arc<Mutex<HashMap<String, WaiterQueue>>>,
}

impl KeyedLock {
    /// Creates an empty lock bound to `runtime`'s strand pool.
    pub fn new(runtime: &Arc<Runtime>) -> Self {
        Self {
            strand: Strand::new(runtime),
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquires the exclusion for `key`, waiting in FIFO order behind any other holder. The
    /// returned guard releases on drop.
    pub async fn acquire(&self, key: impl Into<String>) -> LockGuard {
        let key = key.into();
        let this = self.clone();

        enum Outcome {
            Immediate(LockGuard),
            Wait(oneshot::Receiver<LockGuard>),
        }

        let registration_key = key.clone();
        let outcome = self
            .strand
            .post_and_wait(async move {
                let mut map = this.map.lock();
                match map.get_mut(&registration_key) {
                    None => {
                        map.insert(registration_key.clone(), VecDeque::new());
                        Outcome::Immediate(LockGuard {
                            key: registration_key,
                            lock: this.clone(),
                        })
                    }
                    Some(queue) => {
                        tracing::debug!(target: "stranded::lock", key = %registration_key, waiters = queue.len() + 1, "queued behind current holder");
                        let (tx, rx) = oneshot::channel();
                        queue.push_back(tx);
                        Outcome::Wait(rx)
                    }
                }
            })
            .await
            .expect("keyed lock strand is still running");

        match outcome {
            Outcome::Immediate(guard) => guard,
            Outcome::Wait(rx) => rx
                .await
                .expect("lock strand dropped a waiter without handing it a guard"),
        }
    }
}

/// Holds the exclusion for one key. Dropping releases it, handing it to the next FIFO waiter if
/// one is queued.
pub struct LockGuard {
    key: String,
    lock: KeyedLock,
}

impl LockGuard {
    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let lock = self.lock.clone();
        let key = std::mem::take(&mut self.key);
        lock.strand.post(async move {
            let mut map = lock.map.lock();
            if let Some(queue) = map.get_mut(&key) {
                match queue.pop_front() {
                    Some(waiter) => {
                        let _ = waiter.send(LockGuard {
                            key: key.clone(),
                            lock: lock.clone(),
                        });
                    }
                    None => {
                        map.remove(&key);
                    }
                }
            }
        });
    }
}
