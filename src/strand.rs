//! Serial executors ("strands") bound to the shared [`Runtime`](crate::runtime::Runtime).
//!
//! A strand is an unbounded MPSC channel paired with a single task that drains it — the Design
//! Notes' explicitly preferred option for this component, chosen over an async mutex around the
//! whole owning object because the channel gives an explicit FIFO queue that is trivial to
//! reason about under (STRAND-SERIAL): two tasks posted in order T1, T2 cannot have T2's first
//! action race T1's last, because the drain loop only ever holds one boxed future at a time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A serial executor: tasks posted through the same `Strand` run one at a time, in submission
/// order. Tasks posted through different strands may run concurrently on the runtime's worker
/// pool.
#[derive(Clone)]
pub struct Strand {
    sender: mpsc::UnboundedSender<BoxedTask>,
}

impl Strand {
    /// Spawns the strand's drain task onto `runtime` and returns a handle that can be cloned and
    /// shared by every owner of the serialized object.
    pub fn new(runtime: &Arc<crate::runtime::Runtime>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BoxedTask>();
        runtime.post(async move {
            while let Some(task) = receiver.recv().await {
                task.await;
            }
        });
        Self { sender }
    }

    /// Enqueues `task` for execution on this strand. Returns `Err` only if the strand's drain
    /// task has already exited (the owning object is being torn down); the task is dropped
    /// un-run in that case, same as a `post` delivered to a stopped runtime.
    pub fn post<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // An unbounded send never blocks; a full strand cannot deadlock its caller. A failed
        // send (receiver dropped) is deliberately silent — it mirrors a no-op post to a
        // stopped runtime, not an error the caller can act on.
        let _ = self.sender.send(Box::pin(task));
    }

    /// Enqueues `task` and returns a future that resolves with its result once the strand has
    /// run it to completion. Useful when the caller needs the strand's serialization guarantee
    /// but also needs the outcome (e.g. the broker's `get`, which must observe results in
    /// submission order but still report success/failure to its own caller).
    pub async fn post_and_wait<F, T>(&self, task: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.post(async move {
            let _ = tx.send(task.await);
        });
        rx.await.ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::Runtime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn posted_tasks_run_in_submission_order() {
        let rt = Runtime::new().unwrap();
        rt.run();
        let strand = Strand::new(&rt);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            strand.post(async move {
                order.lock().unwrap().push(i);
            });
        }

        rt.run_join(async {
            // give the drain task a chance to process everything posted above.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        });

        assert_eq!((0..10).collect::<Vec<_>>(), *order.lock().unwrap());
    }

    #[test]
    fn post_and_wait_returns_the_task_result() {
        let rt = Runtime::new().unwrap();
        rt.run();
        let strand = Strand::new(&rt);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);

        let result = rt.run_join(async move {
            strand
                .post_and_wait(async move {
                    counter2.fetch_add(1, Ordering::SeqCst);
                    42
                })
                .await
        });

        assert_eq!(Some(Some(42)), result);
        assert_eq!(1, counter.load(Ordering::SeqCst));
    }
}
