//! End-to-end: three back-to-back acquisitions of the same key fire in submission order, each
//! only after its predecessor's guard is dropped.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use stranded::{KeyedLock, Runtime};

#[tokio::test]
async fn same_key_acquisitions_fire_in_submission_order() {
    let runtime = Runtime::new().unwrap();
    runtime.run();

    let lock = KeyedLock::new(&runtime);
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = lock.acquire("k").await;

    let mut handles = Vec::new();
    for i in 1..=2 {
        let lock = lock.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let _guard = lock.acquire("k").await;
            order.lock().push(i);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }));
    }

    // give both spawned tasks time to register as waiters behind `first`
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(order.lock().is_empty(), "waiters must not fire before the holder releases");

    drop(first);
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(vec![1, 2], *order.lock());
}
