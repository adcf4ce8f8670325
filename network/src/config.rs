//! Node and network configuration types.
//!
//! A [`NodeConfig`] is the declarative description of one node to create;
//! a [`NetworkConfig`] bundles the shared genesis/chain-config bytes, the
//! config flags common to every node, and the initial node set.
//! [`NetworkConfig::default_n_nodes`] produces the canonical local cluster
//! layout with sequential ports and deterministic staking credentials.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{NetworkError, Result};
use crate::genesis;
use crate::node::NodeId;

/// Config flag keys the orchestrator reads. The node binary owns the full
/// flag namespace; these are the ones the runner materializes files for or
/// needs to address the process.
pub mod flags {
    /// The single flag passed on the command line: path to the generated
    /// config file.
    pub const CONFIG_FILE: &str = "config-file";
    pub const CHAIN_CONFIG_DIR: &str = "chain-config-dir";
    pub const GENESIS_FILE: &str = "genesis-file";
    pub const STAKING_CERT_PATH: &str = "staking-tls-cert-file";
    pub const STAKING_KEY_PATH: &str = "staking-tls-key-file";
    pub const STAKING_EPHEMERAL_CERT_ENABLED: &str = "staking-ephemeral-cert-enabled";
    pub const PUBLIC_IP: &str = "public-ip";
    pub const HTTP_PORT: &str = "http-port";
    pub const STAKING_PORT: &str = "staking-port";
    pub const LOG_DIR: &str = "log-dir";
    pub const DB_DIR: &str = "db-dir";
    pub const WHITELISTED_SUBNETS: &str = "whitelisted-subnets";
    pub const BOOTSTRAP_IPS: &str = "bootstrap-ips";
    pub const BOOTSTRAP_IDS: &str = "bootstrap-ids";
}

/// Default number of nodes in a local cluster.
pub const DEFAULT_NUM_NODES: u32 = 5;

/// Base ports for local clusters. Node `i` (zero-based) listens on
/// `BASE_HTTP_PORT + i * PORT_GAP` / `BASE_STAKING_PORT + i * PORT_GAP`.
pub const BASE_HTTP_PORT: u16 = 9650;
pub const BASE_STAKING_PORT: u16 = 9651;
pub const PORT_GAP: u16 = 2;

/// Fixed seed for deterministic local-cluster staking credentials.
const LOCAL_NETWORK_SEED: u64 = 42;

/// Declarative description of a node to create. Immutable once submitted;
/// consumed by the manager to produce a running node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name; generated (`node<N>`) when empty. Must be unique if given.
    #[serde(default)]
    pub name: Option<String>,

    /// Path to the node binary to execute.
    pub binary_path: String,

    /// Staking certificate (PEM). Required unless the node is configured to
    /// self-generate ephemeral credentials.
    #[serde(default)]
    pub staking_cert: String,

    /// Staking private key (PEM). Required unless ephemeral.
    #[serde(default)]
    pub staking_key: String,

    /// Node-specific config flags, merged over the network's core flags.
    pub config_flags: Value,

    /// Opaque implementation-specific launch options, passed through to the
    /// generated config file untouched.
    #[serde(default)]
    pub impl_specific_config: Value,
}

/// Configuration for a whole local network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Genesis file contents, shared by all nodes.
    pub genesis: String,

    /// Chain-specific config file contents, shared by all nodes.
    pub chain_config: String,

    /// Config flags common to all nodes; node flags override these.
    pub core_config_flags: Value,

    /// Nodes created at network construction.
    pub node_configs: Vec<NodeConfig>,
}

impl NetworkConfig {
    /// Validate the pieces every network needs before any node can start.
    pub fn validate(&self) -> Result<()> {
        if self.genesis.is_empty() {
            return Err(NetworkError::Validation("genesis is empty".into()));
        }
        if !self.core_config_flags.is_object() {
            return Err(NetworkError::Validation(
                "core config flags must be a JSON object".into(),
            ));
        }
        Ok(())
    }

    /// The canonical local cluster: `n` nodes named `node1..node<n>` with
    /// sequential ports, per-node directories under `root_data_dir`, shared
    /// default genesis, and deterministic staking credentials. All nodes
    /// after the first bootstrap from `node1`.
    pub fn default_n_nodes(
        binary_path: &str,
        n: u32,
        root_data_dir: &Path,
        whitelisted_subnets: &str,
    ) -> Result<Self> {
        if n == 0 {
            return Err(NetworkError::Validation(
                "network needs at least one node".into(),
            ));
        }

        let genesis_map = genesis::load_local_genesis()?;
        let genesis = serde_json::to_string_pretty(&genesis_map)
            .map_err(|e| NetworkError::Genesis(e.to_string()))?;

        let credentials: Vec<StakingCredentials> =
            (0..n).map(|i| StakingCredentials::deterministic(i)).collect();
        let bootstrap_id = NodeId::from_staking_cert(credentials[0].cert.as_bytes());
        let bootstrap_ip = format!("127.0.0.1:{BASE_STAKING_PORT}");

        let node_configs = (0..n)
            .map(|i| {
                let name = format!("node{}", i + 1);
                let node_dir = root_data_dir.join(&name);
                let config_dir = node_dir.join("configs");
                let http_port = BASE_HTTP_PORT + i as u16 * PORT_GAP;
                let staking_port = BASE_STAKING_PORT + i as u16 * PORT_GAP;

                let mut node_flags = Map::new();
                node_flags.insert(flags::HTTP_PORT.into(), json!(http_port));
                node_flags.insert(flags::STAKING_PORT.into(), json!(staking_port));
                node_flags.insert(
                    flags::CHAIN_CONFIG_DIR.into(),
                    json!(config_dir.to_string_lossy()),
                );
                node_flags.insert(
                    flags::GENESIS_FILE.into(),
                    json!(config_dir.join("genesis.json").to_string_lossy()),
                );
                node_flags.insert(
                    flags::STAKING_CERT_PATH.into(),
                    json!(config_dir.join("staking.crt").to_string_lossy()),
                );
                node_flags.insert(
                    flags::STAKING_KEY_PATH.into(),
                    json!(config_dir.join("staking.key").to_string_lossy()),
                );
                node_flags.insert(
                    flags::LOG_DIR.into(),
                    json!(node_dir.join("log").to_string_lossy()),
                );
                node_flags.insert(
                    flags::DB_DIR.into(),
                    json!(node_dir.join("db-dir").to_string_lossy()),
                );
                node_flags.insert(
                    flags::WHITELISTED_SUBNETS.into(),
                    json!(whitelisted_subnets),
                );
                // Everyone after node1 bootstraps from node1.
                if i > 0 {
                    node_flags.insert(flags::BOOTSTRAP_IPS.into(), json!(bootstrap_ip.clone()));
                    node_flags.insert(
                        flags::BOOTSTRAP_IDS.into(),
                        json!(bootstrap_id.to_string()),
                    );
                }

                NodeConfig {
                    name: Some(name),
                    binary_path: binary_path.to_string(),
                    staking_cert: credentials[i as usize].cert.clone(),
                    staking_key: credentials[i as usize].key.clone(),
                    config_flags: Value::Object(node_flags),
                    impl_specific_config: json!({
                        "redirect-stdout": true,
                        "redirect-stderr": true,
                    }),
                }
            })
            .collect();

        Ok(Self {
            genesis,
            chain_config: genesis::default_chain_config(),
            core_config_flags: default_core_flags(),
            node_configs,
        })
    }
}

/// Config flags shared by every node of a default local cluster.
fn default_core_flags() -> Value {
    json!({
        "network-peer-list-gossip-frequency": "250ms",
        "network-max-reconnect-delay": "1s",
        "health-check-frequency": "2s",
        "api-admin-enabled": true,
        "index-enabled": true,
        "log-display-level": "INFO",
        "log-level": "INFO",
        (flags::PUBLIC_IP): "127.0.0.1",
    })
}

/// Deterministic per-node staking material for local clusters.
///
/// The runner treats credentials as opaque bytes: it writes them to the
/// paths the config flags declare and derives the node ID from the
/// certificate contents. Local dev clusters use seeded material so node
/// IDs are stable across runs.
struct StakingCredentials {
    cert: String,
    key: String,
}

impl StakingCredentials {
    fn deterministic(index: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(LOCAL_NETWORK_SEED + u64::from(index));
        let mut key_bytes = [0u8; 32];
        rng.fill_bytes(&mut key_bytes);
        let mut cert_bytes = [0u8; 48];
        rng.fill_bytes(&mut cert_bytes);

        Self {
            cert: pem_block("MERIDIAN STAKING CERT", &cert_bytes),
            key: pem_block("MERIDIAN STAKING KEY", &key_bytes),
        }
    }
}

fn pem_block(label: &str, bytes: &[u8]) -> String {
    format!(
        "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
        hex::encode(bytes)
    )
}
