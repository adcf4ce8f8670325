//! Control-plane wire types, shared between server and client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Read-only view of one node, derived live from the manager's mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub exec_path: String,
    /// `http://host:port` once known.
    pub uri: String,
    /// `NodeID-...`; empty until resolved for ephemeral-credential nodes.
    pub id: String,
    pub log_dir: String,
    pub db_dir: String,
    pub whitelisted_subnets: String,
    /// The node's config flags as written to its config file (JSON).
    pub config: String,
}

/// Aggregate read-only view of the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Live node names, insertion order.
    pub node_names: Vec<String>,
    pub node_infos: HashMap<String, NodeInfo>,
    pub healthy: bool,
    /// Unix seconds at which the cluster first reported healthy. Recorded
    /// once; node additions/removals afterwards do not reset it.
    pub ready_at_unix: Option<u64>,
}

/// An attached simulated peer, addressed by node name + peer ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub node_name: String,
    pub peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub exec_path: String,
    #[serde(default)]
    pub num_nodes: Option<u32>,
    #[serde(default)]
    pub whitelisted_subnets: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveNodeRequest {
    pub node_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartNodeRequest {
    pub node_name: String,
    #[serde(default)]
    pub exec_path: Option<String>,
    #[serde(default)]
    pub whitelisted_subnets: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachPeerRequest {
    pub node_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachPeerResponse {
    pub peer: PeerDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutboundMessageRequest {
    pub node_name: String,
    pub peer_id: String,
    pub op: u32,
    /// Raw message bytes, hex-encoded.
    pub payload_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutboundMessageResponse {
    /// Whether the send was accepted locally; delivery is never awaited.
    pub sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrisResponse {
    pub uris: Vec<String>,
}

/// Terminal stop outcome. Teardown errors are surfaced here rather than as
/// a failure status: stop itself is idempotent and always answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub cluster_info: ClusterInfo,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body returned by every failing control operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
