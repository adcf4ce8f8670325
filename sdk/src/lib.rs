//! Meridian network-runner SDK.
//!
//! Thin remote-control client for a running `meridian-runner` server, plus
//! the control-plane wire types shared between client and server.
//!
//! # Example
//! ```ignore
//! use sdk::{ClientConfig, RunnerClient};
//!
//! let client = RunnerClient::new(ClientConfig::new("http://127.0.0.1:8080"));
//! client.start("/usr/local/bin/meridian", Some(5), None).await?;
//! let info = client.health().await?;
//! println!("cluster ready: {:?}", info.node_names);
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientConfig, RunnerClient, StatusStream};
pub use error::{Error, Result};
pub use types::{
    AttachPeerRequest, AttachPeerResponse, ClusterInfo, NodeInfo, PeerDescriptor,
    RemoveNodeRequest, RestartNodeRequest, SendOutboundMessageRequest,
    SendOutboundMessageResponse, StartRequest, StopResponse, UrisResponse,
};
