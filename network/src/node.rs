//! Node handles and identity derivation.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use api::ApiClient;
use tokio::process::Child;

use crate::config::NodeConfig;
use crate::error::{NetworkError, Result};

/// Domain separation tag for node identity derivation.
const NODE_ID_DOMAIN: &[u8] = b"meridian-node-id-v1";

/// Rendered prefix of every node identity.
const NODE_ID_PREFIX: &str = "NodeID-";

/// A node's cryptographic identity, derived from its staking certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Derive an identity from staking certificate bytes.
    ///
    /// `BLAKE3(domain || cert)[..20]`, hex-encoded under the `NodeID-`
    /// prefix. The certificate is treated as opaque bytes; the same
    /// material always yields the same identity.
    pub fn from_staking_cert(cert: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(NODE_ID_DOMAIN);
        hasher.update(cert);
        let hash = hasher.finalize();
        Self(format!(
            "{NODE_ID_PREFIX}{}",
            hex::encode(&hash.as_bytes()[..20])
        ))
    }

    /// Parse an identity string as reported by a node's info API.
    pub fn parse(s: &str) -> Result<Self> {
        if !s.starts_with(NODE_ID_PREFIX) {
            return Err(NetworkError::Validation(format!(
                "node ID missing {NODE_ID_PREFIX} prefix: {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cheap cloneable view of a running node, handed out by the manager.
///
/// The backing [`LocalNode`] (process handle, retained config) stays owned
/// by the manager; callers get this snapshot plus a shared API client.
#[derive(Clone)]
pub struct NodeHandle {
    pub name: String,
    /// Derived identity; `None` until resolved from the node's info API
    /// when the node self-generates ephemeral credentials.
    pub node_id: Option<NodeId>,
    /// `host:port` of the node's HTTP API.
    pub uri: String,
    pub http_port: u16,
    pub staking_port: u16,
    pub log_dir: Option<PathBuf>,
    pub db_dir: Option<PathBuf>,
    pub client: Arc<dyn ApiClient>,
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", &self.name)
            .field("node_id", &self.node_id)
            .field("uri", &self.uri)
            .finish()
    }
}

/// A node owned by the local network manager: one spawned process plus its
/// API client and identity. Mutated only by the manager, under its lock.
pub struct LocalNode {
    pub(crate) handle: NodeHandle,
    pub(crate) child: Child,
    /// The originating config, kept so restarts can re-add the node under
    /// the same name with the same flag set.
    pub(crate) config: NodeConfig,
}

impl LocalNode {
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Send SIGTERM to the node process. Requests graceful termination;
    /// does not wait for exit. Signalling a process that already exited
    /// succeeds trivially.
    pub fn signal_term(&self) -> Result<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped; nothing left to signal.
            return Ok(());
        };
        match nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        ) {
            Ok(()) => Ok(()),
            // The process exited between spawn and signal.
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(NetworkError::process(
                format!("sending SIGTERM to {}", self.handle.name),
                std::io::Error::from_raw_os_error(errno as i32),
            )),
        }
    }
}
