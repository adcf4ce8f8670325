//! The capability interface the runner needs from a node.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::http::HttpApiClient;

/// Issues API calls to a single node.
///
/// Only the operations the orchestration core actually consumes are exposed:
/// bootstrap status per sub-chain, identity, version, and liveness. The
/// concrete transport (HTTP, mock, in-process) is an implementation detail
/// selected through an [`ApiClientFactory`].
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Whether the given sub-chain (`"P"`, `"C"`, `"X"`) has finished
    /// bootstrapping.
    async fn is_bootstrapped(&self, chain: &str) -> Result<bool>;

    /// The node's self-reported identity (`NodeID-...`).
    async fn node_id(&self) -> Result<String>;

    /// The node's self-reported version string.
    async fn node_version(&self) -> Result<String>;

    /// Liveness probe against the node's health endpoint.
    async fn health(&self) -> Result<bool>;

    /// Base URI of the node's API (`host:port`).
    fn uri(&self) -> String;

    /// Close any persistent (non-HTTP) connection held by this client.
    ///
    /// Must be called before the node's process is signalled, so the child
    /// does not log spurious connection resets. Plain HTTP transports hold
    /// no persistent connection and treat this as a no-op.
    async fn close(&self);
}

/// Returns a new API client for a node at `ip:port`.
///
/// The factory is the seam through which tests substitute mock clients for
/// the HTTP transport.
pub type ApiClientFactory = Arc<dyn Fn(&str, u16) -> Arc<dyn ApiClient> + Send + Sync>;

/// The default factory: HTTP clients with a 20 second request timeout.
pub fn http_client_factory() -> ApiClientFactory {
    Arc::new(|ip: &str, port: u16| {
        Arc::new(HttpApiClient::new(ip, port, Duration::from_secs(20))) as Arc<dyn ApiClient>
    })
}
