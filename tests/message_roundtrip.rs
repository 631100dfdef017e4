//! End-to-end: a full request/response exchange over the HTTP/1.x-line-style codec.

use stranded::{Connection, Connector, Destination, Header, MessageLayer, RequestLine, ResponseLine, Runtime, StreamLayer};

#[tokio::test]
async fn request_then_response_round_trips_through_the_message_codec() {
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
    let dialed: Connection = client.async_connection().await.unwrap();
    let accepted: Connection = accept_task.await.unwrap().unwrap();

    let mut client_side = MessageLayer::new(StreamLayer::new(dialed));
    let mut server_side = MessageLayer::new(StreamLayer::new(accepted));

    client_side
        .async_write_request_headers(
            RequestLine {
                method: "POST".into(),
                uri: "/".into(),
                version: "HTTP/1.1".into(),
            },
            &[Header::new("Host", "example.com")],
        )
        .await
        .unwrap();

    let (request, headers) = server_side.async_read_request_headers().await.unwrap();
    assert_eq!("POST", request.method);
    assert_eq!("/", request.uri);
    assert_eq!("HTTP/1.1", request.version);
    assert_eq!("Host", headers[0].name);
    assert_eq!("example.com", headers[0].value);
    assert!(headers[1].is_sentinel());

    server_side
        .async_write_response_headers(
            ResponseLine {
                version: "HTTP/1.1".into(),
                code: "200".into(),
                explanation: "OK".into(),
            },
            &[Header::new("Date", "Thu, 30 Jul 2026 00:00:00 GMT")],
        )
        .await
        .unwrap();

    let (response, headers) = client_side.async_read_response_headers().await.unwrap();
    assert_eq!("HTTP/1.1", response.version);
    assert_eq!("200", response.code);
    assert_eq!("OK", response.explanation);
    assert_eq!("Date", headers[0].name);
    assert!(headers[1].is_sentinel());
}
