//! Half-close and full-close semantics.
//!
//! - data written before `close_write` is still read, then end of stream
//! - the other direction keeps working after a half-close
//! - `close_read` fails the peer's writes, including a blocked one
//! - dropping an end behaves like closing it

use std::time::Duration;

use moonpool_memnet::{MemNetwork, NetError, NetworkConfiguration};
use tokio::io::AsyncReadExt;

use super::{connected, init_tracing};

#[tokio::test]
async fn test_server_writes_then_drops_client_reads_all() {
    init_tracing();
    let network = MemNetwork::new();
    let (_listener, mut client, mut server) = connected(&network, "response").await;

    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\nHello, World!";
    server.write_all(response).await.unwrap();
    drop(server);

    let mut received = Vec::new();
    client.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, response);
}

#[tokio::test]
async fn test_close_write_keeps_other_direction_open() {
    init_tracing();
    let network = MemNetwork::new();
    let (_listener, mut client, mut server) = connected(&network, "request").await;

    client.write_all(b"request").await.unwrap();
    client.close_write();

    let mut request = Vec::new();
    server.read_to_end(&mut request).await.unwrap();
    assert_eq!(request, b"request");

    server.write_all(b"reply").await.unwrap();
    server.close_write();

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"reply");
}

#[tokio::test]
async fn test_end_of_stream_is_sticky() {
    init_tracing();
    let network = MemNetwork::new();
    let (_listener, mut client, mut server) = connected(&network, "eof").await;

    client.close_write();
    let mut buf = [0u8; 8];
    for _ in 0..3 {
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }
    assert_eq!(client.write(b"late").await, Err(NetError::ConnClosed));
}

#[tokio::test]
async fn test_close_read_fails_peer_writes() {
    init_tracing();
    let network = MemNetwork::new();
    let (_listener, mut client, mut server) = connected(&network, "deaf").await;

    server.close_read();
    assert!(client.is_peer_closed());

    let err = client.write(b"ignored").await.unwrap_err();
    assert_eq!(err, NetError::ConnClosed);
    assert_eq!(
        std::io::Error::from(err).kind(),
        std::io::ErrorKind::BrokenPipe
    );

    // The server can still talk.
    server.write_all(b"still talking").await.unwrap();
    let mut buf = [0u8; 32];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"still talking");
}

#[tokio::test(start_paused = true)]
async fn test_close_read_unblocks_blocked_writer() {
    init_tracing();
    let network =
        MemNetwork::with_config(NetworkConfiguration::default().with_inbound_capacity(1));
    let (_listener, mut client, mut server) = connected(&network, "stuck").await;

    client.write(b"fills the queue").await.unwrap();

    let (blocked, ()) = tokio::join!(client.write(b"blocked"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        server.close_read();
    });
    assert_eq!(blocked, Err(NetError::ConnClosed));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    init_tracing();
    let network = MemNetwork::new();
    let (_listener, mut client, mut server) = connected(&network, "twice").await;

    client.close();
    client.close();
    assert!(client.is_read_closed());
    assert!(client.is_write_closed());

    let mut buf = [0u8; 4];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    assert_eq!(server.write(b"x").await, Err(NetError::ConnClosed));
}
