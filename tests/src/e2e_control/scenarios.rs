//! Control-plane e2e scenarios: server + SDK + manager + stub processes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sdk::Error;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use super::helpers::{TestServer, booting_factory, healthy_factory, stub_binary};

/// The headline scenario: start a 5-node cluster, wait healthy, remove
/// node3, restart node2, stop - twice.
#[tokio::test]
async fn full_cluster_lifecycle() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir);
    let store = Arc::new(Mutex::new(Vec::new()));
    let server = TestServer::spawn(&dir, healthy_factory(Arc::clone(&store))).await;
    let client = &server.client;

    // Start returns immediately with a pending cluster view.
    let pending = client.start(&binary, Some(5), None).await.unwrap();
    assert!(!pending.healthy);

    // A second start on the same server is a usage error.
    let err = client.start(&binary, Some(5), None).await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 409, .. }));

    // Health blocks until the cluster is ready.
    let ready = client.health().await.unwrap();
    assert!(ready.healthy);
    assert_eq!(
        ready.node_names,
        vec!["node1", "node2", "node3", "node4", "node5"]
    );
    assert!(ready.ready_at_unix.is_some());
    for name in &ready.node_names {
        let node = &ready.node_infos[name];
        assert!(node.uri.starts_with("http://127.0.0.1:"));
        assert!(node.id.starts_with("NodeID-"));
        assert!(!node.config.is_empty());
    }

    let uris = client.uris().await.unwrap();
    assert_eq!(uris.len(), 5);

    // Remove node3: the count drops to 4 and the catalog excludes it.
    let info = client.remove_node("node3").await.unwrap();
    assert_eq!(info.node_names, vec!["node1", "node2", "node4", "node5"]);
    assert!(!info.node_infos.contains_key("node3"));

    // Removing it again is NotFound.
    let err = client.remove_node("node3").await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 404, .. }));

    // Restart node2: same name survives, catalog stays at 4 nodes.
    let info = client.restart_node("node2", None, None).await.unwrap();
    assert_eq!(info.node_names.len(), 4);
    assert!(info.node_names.contains(&"node2".to_string()));

    // Status reflects the mutations but keeps the one-time readiness
    // timestamp.
    let status = client.status().await.unwrap();
    assert_eq!(status.node_names.len(), 4);
    assert_eq!(status.ready_at_unix, ready.ready_at_unix);

    // Stop is idempotent: both calls observe the same clean outcome.
    let first = client.stop().await.unwrap();
    assert!(first.error.is_none());
    assert!(first.cluster_info.node_names.is_empty());
    let second = client.stop().await.unwrap();
    assert!(second.error.is_none());
    assert!(second.cluster_info.node_names.is_empty());

    // Teardown closed every node's client connection.
    for mock in store.lock().unwrap().iter() {
        assert!(mock.is_closed());
    }
}

#[tokio::test]
async fn health_surfaces_startup_failure() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir);
    let server = TestServer::spawn(&dir, booting_factory()).await;

    server.client.start(&binary, Some(2), None).await.unwrap();

    let err = server.client.health().await.unwrap_err();
    match err {
        Error::Server { status, message } => {
            assert_eq!(status, 503);
            assert!(message.contains("Timed out"), "unexpected: {message}");
        }
        other => panic!("expected server error, got {other:?}"),
    }

    // Stop still tears the spawned processes down.
    assert!(server.client.stop().await.unwrap().error.is_none());
}

#[tokio::test]
async fn requests_before_start_are_rejected() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::spawn(&dir, booting_factory()).await;

    let err = server.client.health().await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 503, .. }));

    let err = server.client.remove_node("node1").await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 503, .. }));

    // Stop before start is a harmless no-op.
    let resp = server.client.stop().await.unwrap();
    assert!(resp.error.is_none());
    assert!(resp.cluster_info.node_names.is_empty());
}

#[tokio::test]
async fn stream_status_pushes_snapshots_and_ends_on_stop() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir);
    let server = TestServer::spawn(&dir, healthy_factory(Arc::new(Mutex::new(Vec::new())))).await;
    let client = &server.client;

    client.start(&binary, Some(2), None).await.unwrap();
    client.health().await.unwrap();

    // Consume a few snapshots, then drop the stream mid-flight.
    let mut stream = client.stream_status(Duration::from_millis(50)).await.unwrap();
    for _ in 0..3 {
        let info = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("snapshot within deadline")
            .expect("stream still open");
        assert_eq!(info.node_names.len(), 2);
    }
    drop(stream);

    // A dropped stream does not poison the endpoint: a fresh stream works.
    let mut stream = client.stream_status(Duration::from_millis(50)).await.unwrap();
    let info = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("snapshot within deadline")
        .expect("stream open");
    assert!(info.healthy);

    // Stopping the cluster terminates the live stream.
    client.stop().await.unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if stream.next().await.is_none() {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok(), "stream must end after stop");
}

#[tokio::test]
async fn attach_peer_and_inject_message() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir);
    let server = TestServer::spawn(&dir, healthy_factory(Arc::new(Mutex::new(Vec::new())))).await;
    let client = &server.client;

    // The stub process does not listen on the staking port; stand in for
    // node1's peer-protocol listener (base staking port of the default
    // layout).
    let listener = tokio::net::TcpListener::bind("127.0.0.1:9651")
        .await
        .expect("staking port free for test");

    client.start(&binary, Some(1), None).await.unwrap();
    client.health().await.unwrap();

    // Unknown node fails before any connection is attempted.
    let err = client.attach_peer("ghost").await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 404, .. }));

    let peer = client.attach_peer("node1").await.unwrap();
    assert_eq!(peer.node_name, "node1");
    assert!(!peer.peer_id.is_empty());

    let (mut socket, _) = listener.accept().await.unwrap();

    // Unknown peer ID under a known node is NotFound.
    let err = client
        .send_outbound_message("node1", "bogus-peer", 1, b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Server { status: 404, .. }));

    // A real injection arrives framed on the node side.
    let sent = client
        .send_outbound_message("node1", &peer.peer_id, 0x2a, b"hello")
        .await
        .unwrap();
    assert!(sent);

    let mut frame = [0u8; 13];
    socket.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame[..4], &9u32.to_be_bytes());
    assert_eq!(&frame[4..8], &0x2au32.to_be_bytes());
    assert_eq!(&frame[8..], b"hello");

    client.stop().await.unwrap();
}

#[tokio::test]
async fn concurrent_stops_agree_on_the_outcome() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir);
    let server = TestServer::spawn(&dir, healthy_factory(Arc::new(Mutex::new(Vec::new())))).await;
    let client = &server.client;

    client.start(&binary, Some(3), None).await.unwrap();
    client.health().await.unwrap();

    let (a, b) = tokio::join!(client.stop(), client.stop());
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a.error.is_none());
    assert!(b.error.is_none());
    assert!(a.cluster_info.node_names.is_empty());
    assert!(b.cluster_info.node_names.is_empty());
}
