//! Runner control client.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::types::{
    AttachPeerRequest, AttachPeerResponse, ClusterInfo, ErrorBody, PeerDescriptor,
    RemoveNodeRequest, RestartNodeRequest, SendOutboundMessageRequest,
    SendOutboundMessageResponse, StartRequest, StopResponse, UrisResponse,
};

/// Configuration for connecting to a runner server.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server endpoint (e.g., "http://localhost:8080").
    pub endpoint: String,
    /// Per-request timeout. Readiness-gated calls (health, status, uris)
    /// block server-side until the cluster is ready, so this doubles as the
    /// client's readiness deadline.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".into(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    /// Create config with endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for a `meridian-runner` control server.
pub struct RunnerClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl RunnerClient {
    pub fn new(config: ClientConfig) -> Self {
        // No global client timeout: the status stream stays open
        // indefinitely. Unary calls apply the configured timeout
        // per-request instead.
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client");
        Self { client, config }
    }

    pub fn connect(endpoint: &str) -> Self {
        Self::new(ClientConfig::new(endpoint))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.endpoint.trim_end_matches('/'))
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| Error::InvalidResponse(e.to_string()));
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(Error::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .timeout(self.config.timeout)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .client
            .post(self.url(path))
            .timeout(self.config.timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Start the cluster. One start per server lifetime; a second call is a
    /// usage error.
    pub async fn start(
        &self,
        exec_path: &str,
        num_nodes: Option<u32>,
        whitelisted_subnets: Option<String>,
    ) -> Result<ClusterInfo> {
        self.post(
            "start",
            &StartRequest {
                exec_path: exec_path.to_string(),
                num_nodes,
                whitelisted_subnets,
            },
        )
        .await
    }

    /// Block until the cluster is ready (or startup failed), then return
    /// the cluster info.
    pub async fn health(&self) -> Result<ClusterInfo> {
        self.get("health").await
    }

    /// URIs of every node, once ready.
    pub async fn uris(&self) -> Result<Vec<String>> {
        let resp: UrisResponse = self.get("uris").await?;
        Ok(resp.uris)
    }

    /// Full cluster snapshot, once ready.
    pub async fn status(&self) -> Result<ClusterInfo> {
        self.get("status").await
    }

    pub async fn remove_node(&self, node_name: &str) -> Result<ClusterInfo> {
        self.post(
            "remove-node",
            &RemoveNodeRequest {
                node_name: node_name.to_string(),
            },
        )
        .await
    }

    pub async fn restart_node(
        &self,
        node_name: &str,
        exec_path: Option<String>,
        whitelisted_subnets: Option<String>,
    ) -> Result<ClusterInfo> {
        self.post(
            "restart-node",
            &RestartNodeRequest {
                node_name: node_name.to_string(),
                exec_path,
                whitelisted_subnets,
            },
        )
        .await
    }

    pub async fn attach_peer(&self, node_name: &str) -> Result<PeerDescriptor> {
        let resp: AttachPeerResponse = self
            .post(
                "attach-peer",
                &AttachPeerRequest {
                    node_name: node_name.to_string(),
                },
            )
            .await?;
        Ok(resp.peer)
    }

    /// Inject a raw message through an attached peer. Reports local
    /// acceptance only.
    pub async fn send_outbound_message(
        &self,
        node_name: &str,
        peer_id: &str,
        op: u32,
        payload: &[u8],
    ) -> Result<bool> {
        let resp: SendOutboundMessageResponse = self
            .post(
                "send-outbound-message",
                &SendOutboundMessageRequest {
                    node_name: node_name.to_string(),
                    peer_id: peer_id.to_string(),
                    op,
                    payload_hex: hex::encode(payload),
                },
            )
            .await?;
        Ok(resp.sent)
    }

    /// Stop the cluster. Idempotent: every call observes the same terminal
    /// outcome, with any teardown error carried in the response body.
    pub async fn stop(&self) -> Result<StopResponse> {
        self.post("stop", &serde_json::json!({})).await
    }

    /// Open a status stream pushing one cluster snapshot per
    /// `push_interval`. Dropping the returned stream closes the connection
    /// and stops the server-side ticker.
    pub async fn stream_status(&self, push_interval: Duration) -> Result<StatusStream> {
        let url = format!(
            "{}?push_interval_ms={}",
            self.url("stream-status"),
            push_interval.as_millis()
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            return Err(Error::Server {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                // SSE events are separated by a blank line; payload lines
                // carry a "data: " prefix.
                while let Some(pos) = buffer.find("\n\n") {
                    let event: String = buffer.drain(..pos + 2).collect();
                    for line in event.lines() {
                        if let Some(data) = line.strip_prefix("data: ") {
                            if let Ok(info) = serde_json::from_str::<ClusterInfo>(data) {
                                if tx.send(info).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(StatusStream { rx, task })
    }
}

/// A live status stream. Snapshots arrive once per push interval until the
/// stream is dropped or the server stops.
pub struct StatusStream {
    rx: mpsc::Receiver<ClusterInfo>,
    task: JoinHandle<()>,
}

impl StatusStream {
    /// Next snapshot; `None` once the server side has ended the stream.
    pub async fn next(&mut self) -> Option<ClusterInfo> {
        self.rx.recv().await
    }
}

impl Drop for StatusStream {
    fn drop(&mut self) {
        // Tear down the reader task (and with it the HTTP connection) so
        // the server sees the disconnect and stops ticking.
        self.task.abort();
    }
}
