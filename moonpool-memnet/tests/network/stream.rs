//! Byte stream behavior: ordering, partial reads, back-pressure and the tokio
//! io traits.

use std::time::Duration;

use moonpool_memnet::{MemNetwork, NetworkConfiguration};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use super::{connected, init_tracing, tight_network};

#[tokio::test]
async fn test_partial_reads_split_at_buffer_boundaries() {
    init_tracing();
    let network = MemNetwork::new();
    let (_listener, mut client, mut server) = connected(&network, "partial").await;

    client.write(b"abc").await.unwrap();
    client.write(b"de").await.unwrap();

    let mut buf = [0u8; 2];
    let mut reads = Vec::new();
    for _ in 0..3 {
        let n = server.read(&mut buf).await.unwrap();
        reads.push(buf[..n].to_vec());
    }
    assert_eq!(reads, vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()]);
}

#[tokio::test]
async fn test_bytes_arrive_in_write_order() {
    init_tracing();
    let network = tight_network();
    let (_listener, mut client, mut server) = connected(&network, "ordered").await;

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let writer = tokio::spawn(async move {
        client.write_all(&payload).await.unwrap();
        client.close_write();
    });

    let mut received = Vec::new();
    let mut buf = [0u8; 777];
    loop {
        let n = server.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }

    writer.await.unwrap();
    assert_eq!(received, expected);
}

#[tokio::test(start_paused = true)]
async fn test_writer_blocks_until_reader_drains() {
    init_tracing();
    let network =
        MemNetwork::with_config(NetworkConfiguration::default().with_inbound_capacity(2));
    let (_listener, mut client, mut server) = connected(&network, "pressure").await;

    client.write(b"1").await.unwrap();
    client.write(b"2").await.unwrap();

    let blocked = tokio::time::timeout(Duration::from_secs(1), client.write(b"3")).await;
    assert!(blocked.is_err(), "third write should wait for room");

    let mut buf = [0u8; 1];
    server.read(&mut buf).await.unwrap();
    assert_eq!(&buf, b"1");

    client.write(b"3").await.unwrap();
    let mut rest = [0u8; 2];
    server.read_exact(&mut rest).await.unwrap();
    assert_eq!(&rest, b"23");
}

#[tokio::test]
async fn test_split_echo() {
    init_tracing();
    let network = MemNetwork::new();
    let (_listener, mut client, server) = connected(&network, "echo").await;

    let echo = tokio::spawn(async move {
        let (mut reader, mut writer) = tokio::io::split(server);
        tokio::io::copy(&mut reader, &mut writer).await.unwrap();
        writer.shutdown().await.unwrap();
    });

    AsyncWriteExt::write_all(&mut client, b"line one\nline two\n")
        .await
        .unwrap();
    AsyncWriteExt::shutdown(&mut client).await.unwrap();

    let mut lines = BufReader::new(client).lines();
    let mut received = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        received.push(line);
    }
    assert_eq!(received, ["line one", "line two"]);

    echo.await.unwrap();
}

#[tokio::test]
async fn test_short_writes_above_payload_limit() {
    init_tracing();
    let network =
        MemNetwork::with_config(NetworkConfiguration::default().with_max_write_payload(3));
    let (_listener, mut client, mut server) = connected(&network, "short").await;

    assert_eq!(client.write(b"abcdef").await.unwrap(), 3);
    assert_eq!(
        AsyncWriteExt::write(&mut client, b"defgh").await.unwrap(),
        3
    );

    let mut buf = [0u8; 16];
    let n = server.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"abcdef");
}
