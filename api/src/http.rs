//! HTTP JSON-RPC transport for the node API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::client::ApiClient;
use crate::error::{ApiError, Result};

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IsBootstrappedReply {
    is_bootstrapped: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetNodeIdReply {
    node_id: String,
}

#[derive(Debug, Deserialize)]
struct GetNodeVersionReply {
    version: String,
}

#[derive(Debug, Deserialize)]
struct HealthReply {
    healthy: bool,
}

/// API client for a node at `ip:port`, speaking JSON-RPC 2.0 over HTTP.
///
/// Endpoints follow the node's API layout: info calls on `/ext/info`,
/// health calls on `/ext/health`.
pub struct HttpApiClient {
    ip: String,
    port: u16,
    client: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(ip: impl Into<String>, port: u16, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            ip: ip.into(),
            port,
            client,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let url = format!("http://{}:{}{}", self.ip, self.port, endpoint);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        let envelope: RpcResponse<T> = resp.json().await?;
        if let Some(err) = envelope.error {
            return Err(ApiError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| ApiError::InvalidResponse(format!("{method}: missing result")))
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn is_bootstrapped(&self, chain: &str) -> Result<bool> {
        let reply: IsBootstrappedReply = self
            .call("/ext/info", "info.isBootstrapped", json!({ "chain": chain }))
            .await?;
        Ok(reply.is_bootstrapped)
    }

    async fn node_id(&self) -> Result<String> {
        let reply: GetNodeIdReply = self
            .call("/ext/info", "info.getNodeID", json!({}))
            .await?;
        Ok(reply.node_id)
    }

    async fn node_version(&self) -> Result<String> {
        let reply: GetNodeVersionReply = self
            .call("/ext/info", "info.getNodeVersion", json!({}))
            .await?;
        Ok(reply.version)
    }

    async fn health(&self) -> Result<bool> {
        let reply: HealthReply = self.call("/ext/health", "health.health", json!({})).await?;
        Ok(reply.healthy)
    }

    fn uri(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    async fn close(&self) {
        // The HTTP transport keeps no persistent connection beyond reqwest's
        // internal pool, which is released on drop.
    }
}
