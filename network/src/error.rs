//! Orchestration error types.

use thiserror::Error;

/// Errors that can occur in the orchestration core.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Malformed or incomplete node/network configuration.
    #[error("Invalid config: {0}")]
    Validation(String),

    /// A node with the requested name already exists.
    #[error("Repeated node name: {0}")]
    NameConflict(String),

    /// Operation on a node name that is not in the network.
    #[error("Node {0} not found in network")]
    NotFound(String),

    /// Operation on a peer ID that is not attached to the node.
    #[error("Peer {peer_id} not found on node {node}")]
    PeerNotFound { node: String, peer_id: String },

    /// A health wait exceeded its deadline.
    #[error("Timed out waiting for node {0} to become healthy")]
    Timeout(String),

    /// A health wait was interrupted by a shutdown request.
    #[error("Aborted")]
    Aborted,

    /// Process spawn or signal delivery failed.
    #[error("{context}: {source}")]
    Process {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Genesis content could not be loaded or patched.
    #[error("Genesis error: {0}")]
    Genesis(String),

    /// Peer connection establishment or transmission failed.
    #[error("Connection error: {0}")]
    Connection(String),
}

impl NetworkError {
    pub(crate) fn process(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Process {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
