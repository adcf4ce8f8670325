//! Network crate - local cluster orchestration core.
//!
//! This crate owns the node-lifecycle machinery of the runner:
//!
//! - **Config**: declarative node/network descriptions and the canonical
//!   local cluster layout ([`config`])
//! - **Genesis**: embedded default genesis state and chain-config patching
//!   ([`genesis`])
//! - **Manager**: the [`LocalNetwork`] owning every spawned node process,
//!   config-file materialization, and add/remove/restart/stop ([`local`])
//! - **Health**: bootstrap polling for single nodes and whole networks
//!   ([`health`])
//! - **Peers**: simulated peer attachment and raw message injection
//!   ([`peer`])
//!
//! Nodes are opaque child processes exposing an HTTP API; everything the
//! manager learns about a running node goes through the `api` crate's
//! [`api::ApiClient`] interface, so tests can swap in mocks through
//! [`api::ApiClientFactory`].

pub mod config;
pub mod error;
pub mod genesis;
pub mod health;
pub mod local;
pub mod node;
pub mod peer;
pub mod signal;

pub use config::{NetworkConfig, NodeConfig};
pub use error::{NetworkError, Result};
pub use local::LocalNetwork;
pub use node::{NodeHandle, NodeId};
pub use peer::{AttachedPeers, PeerConnection, TcpPeerConnection};
pub use signal::StopSignal;
