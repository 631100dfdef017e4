//! End-to-end: a dropped broker handle is returned to the pool and handed back out, rather than
//! triggering a fresh dial, observable via the `connection_seq` stamp on the `InfoMap`.

use stranded::{Broker, BrokerTls, Destination, Role, Runtime};

#[tokio::test]
async fn dropped_handle_is_reused_instead_of_redialed() {
    let runtime = Runtime::new().unwrap();
    runtime.run();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = std::sync::Arc::new(parking_lot::Mutex::new(0usize));
    let accepted_count = std::sync::Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            *accepted_count.lock() += 1;
            // keep the socket alive instead of closing it immediately underneath the client
            tokio::spawn(async move {
                let _stream = stream;
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            });
        }
    });

    let broker = Broker::new(&runtime);
    let destination = Destination::Tcp {
        host: "127.0.0.1".into(),
        port,
    };

    let handle_a = broker
        .get(destination.clone(), Role::Client, BrokerTls::None, None)
        .await
        .unwrap();
    let seq_a = handle_a.info().unwrap().get("connection_seq").unwrap().to_string();
    drop(handle_a);
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let handle_b = broker
        .get(destination, Role::Client, BrokerTls::None, None)
        .await
        .unwrap();
    let seq_b = handle_b.info().unwrap().get("connection_seq").unwrap().to_string();

    assert_eq!(seq_a, seq_b);
    assert_eq!(1, *accepted.lock());
}
