//! Backlog capacity, ordering and connect timeouts.

use std::time::Duration;

use moonpool_memnet::{MemNetwork, NetError, NetworkConfiguration};
use tokio::time::Instant;

use super::init_tracing;

fn network_with_backlog(capacity: usize) -> MemNetwork {
    MemNetwork::with_config(
        NetworkConfiguration::default()
            .with_backlog_capacity(capacity)
            .with_connect_timeout(Duration::from_secs(5)),
    )
}

#[tokio::test(start_paused = true)]
async fn test_full_backlog_fails_immediately() {
    init_tracing();
    let network = network_with_backlog(2);
    let listener = network.listen("full").unwrap();

    let queued: Vec<_> = (0..2)
        .map(|_| {
            let network = network.clone();
            tokio::spawn(async move { network.dial("full").await })
        })
        .collect();
    // Let both dialers enqueue.
    tokio::time::sleep(Duration::from_millis(1)).await;

    let start = Instant::now();
    let err = network.dial("full").await.unwrap_err();
    assert_eq!(err, NetError::ListenQueueFull);
    assert!(err.is_temporary());
    assert_eq!(Instant::now(), start);

    // The queued dials are still served.
    for _ in 0..2 {
        listener.accept().await.unwrap();
    }
    for dialer in queued {
        assert!(dialer.await.unwrap().is_ok());
    }

    // Room again.
    let (client, server) = tokio::join!(network.dial("full"), listener.accept());
    assert_eq!(client.unwrap().pair_id(), server.unwrap().pair_id());
}

#[tokio::test(start_paused = true)]
async fn test_backlog_is_served_in_dial_order() {
    init_tracing();
    let network = network_with_backlog(8);
    let listener = network.listen("fifo").unwrap();

    let mut dialers = Vec::new();
    for _ in 0..3 {
        let network = network.clone();
        dialers.push(tokio::spawn(async move { network.dial("fifo").await }));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let mut servers = Vec::new();
    for _ in 0..3 {
        servers.push(listener.accept().await.unwrap());
    }

    for (dialer, server) in dialers.into_iter().zip(&servers) {
        let client = dialer.await.unwrap().unwrap();
        assert_eq!(client.pair_id(), server.pair_id());
    }
}

#[tokio::test(start_paused = true)]
async fn test_dial_times_out_without_accept() {
    init_tracing();
    let network = MemNetwork::with_config(
        NetworkConfiguration::default().with_connect_timeout(Duration::from_millis(200)),
    );
    let _listener = network.listen("idle").unwrap();

    let start = Instant::now();
    let err = network.dial("idle").await.unwrap_err();
    assert_eq!(err, NetError::ConnTimeout);
    assert!(err.is_timeout());
    assert!(!err.is_temporary());
    assert!(Instant::now() - start >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_accept_skips_abandoned_dial() {
    init_tracing();
    let network = MemNetwork::with_config(
        NetworkConfiguration::default().with_connect_timeout(Duration::from_millis(100)),
    );
    let listener = network.listen("late").unwrap();

    let err = network.dial("late").await.unwrap_err();
    assert_eq!(err, NetError::ConnTimeout);

    listener.set_deadline(Some(Instant::now() + Duration::from_millis(50)));
    let err = listener.accept().await.unwrap_err();
    assert_eq!(err, NetError::AcceptTimeout);

    listener.set_deadline(None);
    let (client, server) = tokio::join!(network.dial("late"), listener.accept());
    assert_eq!(client.unwrap().pair_id(), server.unwrap().pair_id());
}

#[tokio::test]
async fn test_closed_listener_refuses_and_fails_dials() {
    init_tracing();
    let network = MemNetwork::new();
    let listener = network.listen("closing").unwrap();

    let dialer = {
        let network = network.clone();
        tokio::spawn(async move { network.dial("closing").await })
    };
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    listener.close();
    assert_eq!(dialer.await.unwrap().unwrap_err(), NetError::ConnClosed);
    let err = network.dial("closing").await.unwrap_err();
    assert_eq!(err, NetError::ConnRefused);
    let err = listener.accept().await.unwrap_err();
    assert_eq!(err, NetError::ListenerClosed);
}

#[tokio::test]
async fn test_dropped_listener_fails_queued_dials() {
    init_tracing();
    let network = MemNetwork::new();
    let listener = network.listen("dropping").unwrap();

    let dialers: Vec<_> = (0..2)
        .map(|_| {
            let network = network.clone();
            tokio::spawn(async move { network.dial("dropping").await })
        })
        .collect();
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    // Unregistered first, so only the drop releases the backlog.
    assert!(network.unregister("dropping"));
    drop(listener);

    for dialer in dialers {
        let err = dialer.await.unwrap().unwrap_err();
        assert_eq!(err, NetError::ConnClosed);
    }
}
