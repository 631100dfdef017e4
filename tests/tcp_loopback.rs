//! End-to-end: a server connector accepts what a client connector dials, over TCP on loopback,
//! round-tripping a payload in each direction.

use stranded::{Connector, Destination, Runtime};

#[tokio::test]
async fn server_accepts_what_client_dials_over_tcp() {
    let runtime = Runtime::new().unwrap();
    runtime.run();

    let server = Connector::server(
        Destination::Tcp {
            host: "127.0.0.1".into(),
            port: 0,
        },
        None,
        &runtime,
    );
    let addr = server.local_addr().await.unwrap();

    let accept_task = tokio::spawn(async move { server.async_connection().await });

    let client = Connector::client(
        Destination::Tcp {
            host: "127.0.0.1".into(),
            port: addr.port(),
        },
        None,
        &runtime,
    );
    let mut dialed = client.async_connection().await.unwrap();
    let mut accepted = accept_task.await.unwrap().unwrap();

    assert!(dialed.is_open());
    assert!(accepted.is_open());

    let sent = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 0];
    dialed.async_write_some(&sent).await.unwrap();
    let mut got = [0u8; 10];
    let mut total = 0;
    while total < got.len() {
        total += accepted.async_read_some(&mut got[total..]).await.unwrap();
    }
    assert_eq!(sent, got);

    let reply = [b'a', b'b', b'c', b'd'];
    accepted.async_write_some(&reply).await.unwrap();
    let mut got_reply = [0u8; 4];
    let mut total = 0;
    while total < got_reply.len() {
        total += dialed.async_read_some(&mut got_reply[total..]).await.unwrap();
    }
    assert_eq!(reply, got_reply);
}
