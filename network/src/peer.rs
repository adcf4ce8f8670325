//! Attached peers: simulated network participants bound to one node.
//!
//! The peer protocol proper (handshake, TLS, message schema) belongs to the
//! node implementation; the runner's contract is only to establish a
//! connection, keep it addressable under a generated peer ID, and push raw
//! frames down it on request.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::RngCore;
use slog::Logger;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::{NetworkError, Result};

/// One established peer connection. Send reports local acceptance only;
/// delivery and any response are never awaited.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Hand a raw message to the connection for transmission.
    async fn send(&self, op: u32, payload: &[u8]) -> Result<()>;

    /// Tear the connection down. Idempotent.
    async fn close(&self);
}

/// TCP-backed peer connection framing messages as
/// `[u32 len][u32 op][payload]` (big endian, len covers op + payload).
pub struct TcpPeerConnection {
    stream: Mutex<Option<TcpStream>>,
}

impl TcpPeerConnection {
    /// Dial the node's staking port.
    pub async fn connect(ip: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((ip, port))
            .await
            .map_err(|e| NetworkError::Connection(format!("dialing {ip}:{port}: {e}")))?;
        Ok(Self {
            stream: Mutex::new(Some(stream)),
        })
    }
}

#[async_trait]
impl PeerConnection for TcpPeerConnection {
    async fn send(&self, op: u32, payload: &[u8]) -> Result<()> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| NetworkError::Connection("peer connection closed".into()))?;

        let len = 4 + payload.len() as u32;
        let mut frame = Vec::with_capacity(8 + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&op.to_be_bytes());
        frame.extend_from_slice(payload);

        stream
            .write_all(&frame)
            .await
            .map_err(|e| NetworkError::Connection(format!("writing frame: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| NetworkError::Connection(format!("flushing frame: {e}")))
    }

    async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }
}

/// Registry of attached peers, grouped per node name.
///
/// Peer IDs are generated (16 random bytes, hex) and only meaningful in the
/// namespace of the node they were attached to. Attaching under an ID that
/// already exists replaces the previous connection with a warning.
pub struct AttachedPeers {
    logger: Logger,
    // node name -> peer ID -> connection
    peers: Mutex<HashMap<String, HashMap<String, Box<dyn PeerConnection>>>>,
}

impl AttachedPeers {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Record a connection under a fresh generated peer ID and return it.
    pub async fn attach(&self, node_name: &str, conn: Box<dyn PeerConnection>) -> String {
        let peer_id = generate_peer_id();
        self.attach_with_id(node_name, &peer_id, conn).await;
        peer_id
    }

    /// Record a connection under a caller-chosen peer ID. An existing
    /// connection under the same ID is closed and replaced.
    pub async fn attach_with_id(
        &self,
        node_name: &str,
        peer_id: &str,
        conn: Box<dyn PeerConnection>,
    ) {
        let previous = self
            .peers
            .lock()
            .await
            .entry(node_name.to_string())
            .or_default()
            .insert(peer_id.to_string(), conn);
        if let Some(previous) = previous {
            slog::warn!(
                self.logger,
                "Replacing attached peer";
                "node" => node_name,
                "peer_id" => peer_id,
            );
            previous.close().await;
        }
    }

    /// Send a raw message through an attached peer's connection.
    pub async fn send_outbound(
        &self,
        node_name: &str,
        peer_id: &str,
        op: u32,
        payload: &[u8],
    ) -> Result<()> {
        let guard = self.peers.lock().await;
        let node_peers = guard
            .get(node_name)
            .ok_or_else(|| NetworkError::NotFound(node_name.to_string()))?;
        let conn = node_peers
            .get(peer_id)
            .ok_or_else(|| NetworkError::PeerNotFound {
                node: node_name.to_string(),
                peer_id: peer_id.to_string(),
            })?;
        conn.send(op, payload).await
    }

    /// Peer IDs currently attached to a node.
    pub async fn peer_ids(&self, node_name: &str) -> Vec<String> {
        self.peers
            .lock()
            .await
            .get(node_name)
            .map(|peers| peers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Close and forget every peer attached to a node. Returns the number
    /// of connections closed.
    pub async fn detach_node(&self, node_name: &str) -> usize {
        let removed = self.peers.lock().await.remove(node_name);
        match removed {
            Some(peers) => {
                let count = peers.len();
                for (_, conn) in peers {
                    conn.close().await;
                }
                count
            }
            None => 0,
        }
    }
}

fn generate_peer_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    struct RecordingConnection {
        sent: AtomicUsize,
        closed: AtomicBool,
    }

    impl RecordingConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            })
        }
    }

    struct SharedConnection(Arc<RecordingConnection>);

    #[async_trait]
    impl PeerConnection for SharedConnection {
        async fn send(&self, _op: u32, _payload: &[u8]) -> Result<()> {
            self.0.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {
            self.0.closed.store(true, Ordering::SeqCst);
        }
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn attach_and_send() {
        let peers = AttachedPeers::new(test_logger());
        let conn = RecordingConnection::new();
        let peer_id = peers
            .attach("node1", Box::new(SharedConnection(Arc::clone(&conn))))
            .await;

        peers
            .send_outbound("node1", &peer_id, 7, b"payload")
            .await
            .unwrap();
        assert_eq!(conn.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_to_unknown_node_or_peer_fails() {
        let peers = AttachedPeers::new(test_logger());
        let err = peers.send_outbound("ghost", "peer", 0, b"").await.unwrap_err();
        assert!(matches!(err, NetworkError::NotFound(_)));

        let conn = RecordingConnection::new();
        peers
            .attach("node1", Box::new(SharedConnection(Arc::clone(&conn))))
            .await;
        let err = peers
            .send_outbound("node1", "wrong-id", 0, b"")
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::PeerNotFound { .. }));
    }

    #[tokio::test]
    async fn reattaching_same_id_replaces_and_closes_previous() {
        let peers = AttachedPeers::new(test_logger());
        let first = RecordingConnection::new();
        let second = RecordingConnection::new();

        peers
            .attach_with_id("node1", "fixed", Box::new(SharedConnection(Arc::clone(&first))))
            .await;
        peers
            .attach_with_id(
                "node1",
                "fixed",
                Box::new(SharedConnection(Arc::clone(&second))),
            )
            .await;

        assert!(first.closed.load(Ordering::SeqCst));
        peers.send_outbound("node1", "fixed", 1, b"x").await.unwrap();
        assert_eq!(first.sent.load(Ordering::SeqCst), 0);
        assert_eq!(second.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detach_node_closes_every_connection() {
        let peers = AttachedPeers::new(test_logger());
        let a = RecordingConnection::new();
        let b = RecordingConnection::new();
        peers
            .attach("node1", Box::new(SharedConnection(Arc::clone(&a))))
            .await;
        peers
            .attach("node1", Box::new(SharedConnection(Arc::clone(&b))))
            .await;

        assert_eq!(peers.detach_node("node1").await, 2);
        assert!(a.closed.load(Ordering::SeqCst));
        assert!(b.closed.load(Ordering::SeqCst));
        assert_eq!(peers.detach_node("node1").await, 0);
    }

    #[tokio::test]
    async fn tcp_connection_frames_messages() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut frame = [0u8; 13];
            socket.read_exact(&mut frame).await.unwrap();
            frame
        });

        let conn = TcpPeerConnection::connect("127.0.0.1", addr.port())
            .await
            .unwrap();
        conn.send(0x2a, b"hello").await.unwrap();

        let frame = server.await.unwrap();
        assert_eq!(&frame[..4], &9u32.to_be_bytes()); // 4 (op) + 5 (payload)
        assert_eq!(&frame[4..8], &0x2au32.to_be_bytes());
        assert_eq!(&frame[8..], b"hello");

        conn.close().await;
        assert!(conn.send(1, b"after close").await.is_err());
    }
}
