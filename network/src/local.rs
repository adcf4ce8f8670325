//! Local network manager: authoritative owner of every spawned node.
//!
//! `LocalNetwork` holds the node-name -> handle mapping behind one coarse
//! mutex. Additions materialize the node's config/genesis/credential files
//! before the process is spawned, so the child reads a consistent config at
//! boot; removals request termination and drop addressability immediately
//! without waiting for exit. Expected scale is tens of nodes, so the single
//! critical section is deliberate.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api::{ApiClient, ApiClientFactory};
use serde_json::{Map, Value};
use slog::Logger;
use tokio::process::Command;

use crate::config::{DEFAULT_NUM_NODES, NetworkConfig, NodeConfig, flags};
use crate::error::{NetworkError, Result};
use crate::health::await_node_healthy;
use crate::node::{LocalNode, NodeHandle, NodeId};

pub struct LocalNetwork {
    logger: Logger,
    client_factory: ApiClientFactory,
    state: Mutex<NetworkState>,
}

struct NetworkState {
    /// Source of generated `node<N>` names. Monotonic; a number handed out
    /// once is never reused within this manager's lifetime, even after the
    /// node is removed.
    next_node_index: u64,
    nodes: HashMap<String, LocalNode>,
    /// Insertion order of live node names, for deterministic listing.
    node_order: Vec<String>,
    genesis: Vec<u8>,
    chain_config: Vec<u8>,
    core_config_flags: Map<String, Value>,
}

impl LocalNetwork {
    /// Create a network from a configuration, adding its initial node set.
    ///
    /// Any failure while adding the initial nodes aborts construction;
    /// nodes added before the failing one keep running and the caller must
    /// not assume cleanup of their files.
    pub fn new(
        logger: Logger,
        config: NetworkConfig,
        client_factory: ApiClientFactory,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let core_config_flags = match config.core_config_flags {
            Value::Object(map) => map,
            _ => {
                return Err(NetworkError::Validation(
                    "core config flags must be a JSON object".into(),
                ));
            }
        };

        let network = Arc::new(Self {
            logger,
            client_factory,
            state: Mutex::new(NetworkState {
                next_node_index: 1,
                nodes: HashMap::new(),
                node_order: Vec::new(),
                genesis: config.genesis.into_bytes(),
                chain_config: config.chain_config.into_bytes(),
                core_config_flags,
            }),
        });

        for node_config in config.node_configs {
            network.add_node(node_config)?;
        }
        Ok(network)
    }

    /// Create a network from the default `n`-node layout with HTTP clients.
    pub fn default_network(
        logger: Logger,
        binary_path: &str,
        root_data_dir: &Path,
    ) -> Result<Arc<Self>> {
        let config = NetworkConfig::default_n_nodes(
            binary_path,
            DEFAULT_NUM_NODES,
            root_data_dir,
            "",
        )?;
        Self::new(logger, config, api::http_client_factory())
    }

    /// Create a network from the default layout after letting the caller
    /// adjust the configuration.
    pub fn custom(
        logger: Logger,
        binary_path: &str,
        root_data_dir: &Path,
        client_factory: ApiClientFactory,
        post_process: impl FnOnce(&mut NetworkConfig),
    ) -> Result<Arc<Self>> {
        let mut config = NetworkConfig::default_n_nodes(
            binary_path,
            DEFAULT_NUM_NODES,
            root_data_dir,
            "",
        )?;
        post_process(&mut config);
        Self::new(logger, config, client_factory)
    }

    /// Prepare the files the node binary needs on disk, then execute it.
    ///
    /// On any failure after partial file writes no process is spawned;
    /// already-written files are left in place for inspection rather than
    /// reconciled.
    pub fn add_node(&self, config: NodeConfig) -> Result<NodeHandle> {
        let mut state = self.state.lock().unwrap();

        let name = match config.name.as_deref() {
            Some(name) if !name.is_empty() => {
                if state.nodes.contains_key(name) {
                    return Err(NetworkError::NameConflict(name.to_string()));
                }
                name.to_string()
            }
            _ => {
                // Skip over numbers taken by explicitly-named nodes; the
                // counter itself never goes backwards.
                loop {
                    let candidate = format!("node{}", state.next_node_index);
                    state.next_node_index += 1;
                    if !state.nodes.contains_key(&candidate) {
                        break candidate;
                    }
                }
            }
        };

        if config.binary_path.is_empty() {
            return Err(NetworkError::Validation(format!(
                "incomplete config for node {name}: binary_path is empty"
            )));
        }
        let node_flags = config.config_flags.as_object().ok_or_else(|| {
            NetworkError::Validation(format!(
                "incomplete config for node {name}: config_flags must be a JSON object"
            ))
        })?;

        // Common flags first, node-specific flags override.
        let mut merged = state.core_config_flags.clone();
        for (key, value) in node_flags {
            merged.insert(key.clone(), value.clone());
        }
        if !config.impl_specific_config.is_null() {
            merged.insert(
                "impl-specific-config".to_string(),
                config.impl_specific_config.clone(),
            );
        }

        let config_dir = PathBuf::from(require_string_flag(&merged, &name, flags::CHAIN_CONFIG_DIR)?);
        let genesis_path = PathBuf::from(require_string_flag(&merged, &name, flags::GENESIS_FILE)?);
        let public_ip = require_string_flag(&merged, &name, flags::PUBLIC_IP)?.to_string();
        let http_port = require_port_flag(&merged, &name, flags::HTTP_PORT)?;
        let staking_port = require_port_flag(&merged, &name, flags::STAKING_PORT)?;

        // Main config file, marshalled from the merged flag set.
        let config_file_path = config_dir.join("config.json");
        let config_bytes = serde_json::to_vec_pretty(&Value::Object(merged.clone()))
            .map_err(|e| NetworkError::Validation(format!("marshalling flags for {name}: {e}")))?;
        create_file(&config_file_path, &config_bytes)?;

        // Chain config and genesis, shared across the network.
        create_file(&config_dir.join("C").join("config.json"), &state.chain_config)?;
        create_file(&genesis_path, &state.genesis)?;

        // Staking credentials, unless the node generates its own at boot.
        let ephemeral = merged
            .get(flags::STAKING_EPHEMERAL_CERT_ENABLED)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let node_id = if ephemeral {
            // Identity becomes known once the node reports it over the API.
            None
        } else {
            if config.staking_cert.is_empty() {
                return Err(NetworkError::Validation(format!(
                    "incomplete config for node {name}: staking_cert is empty"
                )));
            }
            if config.staking_key.is_empty() {
                return Err(NetworkError::Validation(format!(
                    "incomplete config for node {name}: staking_key is empty"
                )));
            }
            let cert_path = require_string_flag(&merged, &name, flags::STAKING_CERT_PATH)?.to_string();
            let key_path = require_string_flag(&merged, &name, flags::STAKING_KEY_PATH)?.to_string();
            create_file(Path::new(&cert_path), config.staking_cert.as_bytes())?;
            create_file(Path::new(&key_path), config.staking_key.as_bytes())?;
            Some(NodeId::from_staking_cert(config.staking_cert.as_bytes()))
        };

        let log_dir = merged
            .get(flags::LOG_DIR)
            .and_then(Value::as_str)
            .map(PathBuf::from);
        let db_dir = merged
            .get(flags::DB_DIR)
            .and_then(Value::as_str)
            .map(PathBuf::from);

        let client = (self.client_factory)(&public_ip, http_port);

        let child = spawn_node_process(
            &config,
            &name,
            &config_file_path,
            log_dir.as_deref(),
        )?;

        let handle = NodeHandle {
            name: name.clone(),
            node_id,
            uri: format!("{public_ip}:{http_port}"),
            http_port,
            staking_port,
            log_dir,
            db_dir,
            client,
        };

        slog::info!(
            self.logger,
            "Added node";
            "name" => &name,
            "uri" => &handle.uri,
            "binary" => &config.binary_path,
        );

        let mut stored_config = config;
        stored_config.name = Some(name.clone());
        state.nodes.insert(
            name.clone(),
            LocalNode {
                handle: handle.clone(),
                child,
                config: stored_config,
            },
        );
        state.node_order.push(name);

        Ok(handle)
    }

    /// Remove a node: close its persistent client surface, request process
    /// termination, and drop it from the mapping.
    ///
    /// Returns as soon as termination was requested; the process may still
    /// be exiting. The node's files stay on disk for post-mortem
    /// inspection.
    pub async fn remove_node(&self, name: &str) -> Result<()> {
        let node = {
            let mut state = self.state.lock().unwrap();
            let node = state
                .nodes
                .remove(name)
                .ok_or_else(|| NetworkError::NotFound(name.to_string()))?;
            state.node_order.retain(|n| n != name);
            node
        };

        // The persistent client connection must be closed before the
        // process is signalled, or the child logs connection resets while
        // shutting down.
        node.handle.client.close().await;
        let result = node.signal_term();

        slog::info!(self.logger, "Removed node"; "name" => name);
        result
    }

    /// Stop a node and start it again under the same name with its prior
    /// flag set, optionally substituting the binary.
    ///
    /// The node's identity may change if its credentials are regenerated;
    /// callers must re-fetch identity from the returned handle.
    pub async fn restart_node(
        &self,
        name: &str,
        new_binary_path: Option<String>,
    ) -> Result<NodeHandle> {
        let mut config = {
            let state = self.state.lock().unwrap();
            state
                .nodes
                .get(name)
                .ok_or_else(|| NetworkError::NotFound(name.to_string()))?
                .config
                .clone()
        };
        config.name = Some(name.to_string());
        if let Some(binary_path) = new_binary_path {
            config.binary_path = binary_path;
        }

        self.remove_node(name).await?;
        let handle = self.add_node(config)?;
        slog::info!(self.logger, "Restarted node"; "name" => name);
        Ok(handle)
    }

    /// Tear down every node, best effort: all nodes are attempted even if
    /// one fails; the first error encountered is returned.
    pub async fn stop(&self) -> Result<()> {
        let names = self.node_names();
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.remove_node(&name).await {
                slog::warn!(self.logger, "Error removing node during stop";
                    "name" => &name, "error" => %e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn get_node(&self, name: &str) -> Result<NodeHandle> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .get(name)
            .map(LocalNode::handle)
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))
    }

    /// Live node names in insertion order.
    pub fn node_names(&self) -> Vec<String> {
        self.state.lock().unwrap().node_order.clone()
    }

    /// Handles of every live node, in insertion order.
    pub fn all_nodes(&self) -> Vec<NodeHandle> {
        let state = self.state.lock().unwrap();
        state
            .node_order
            .iter()
            .filter_map(|name| state.nodes.get(name).map(LocalNode::handle))
            .collect()
    }

    /// The originating config of a live node (restarts and catalog views
    /// read it back).
    pub fn get_node_config(&self, name: &str) -> Result<NodeConfig> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .get(name)
            .map(|n| n.config.clone())
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))
    }

    /// Record the identity a node reported over its API (ephemeral
    /// credentials make it unknowable at spawn time).
    pub fn set_node_id(&self, name: &str, node_id: NodeId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(name)
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))?;
        node.handle.node_id = Some(node_id);
        Ok(())
    }

    /// Wait for every current node to report all sub-chains bootstrapped.
    ///
    /// Fans out one poll loop per node; the whole network is healthy only
    /// when every node is. The first node to exceed `timeout` decides the
    /// error. Dropping the returned future stops all polling, which is how
    /// callers compose deadline and abort signals via `select!`.
    pub async fn healthy(&self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let clients: Vec<(String, Arc<dyn ApiClient>)> = {
            let state = self.state.lock().unwrap();
            state
                .node_order
                .iter()
                .filter_map(|name| {
                    state
                        .nodes
                        .get(name)
                        .map(|n| (name.clone(), Arc::clone(&n.handle.client)))
                })
                .collect()
        };

        let checks = clients.into_iter().map(|(name, client)| async move {
            if await_node_healthy(client.as_ref(), timeout, poll_interval).await {
                slog::info!(self.logger, "Node is up"; "name" => &name);
                Ok(())
            } else {
                Err(NetworkError::Timeout(name))
            }
        });

        futures::future::join_all(checks)
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;
        Ok(())
    }
}

fn require_string_flag<'a>(
    merged: &'a Map<String, Value>,
    node: &str,
    key: &str,
) -> Result<&'a str> {
    merged
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| NetworkError::Validation(format!("node {node} lacks config flag {key}")))
}

fn require_port_flag(merged: &Map<String, Value>, node: &str, key: &str) -> Result<u16> {
    merged
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| {
            NetworkError::Validation(format!("node {node} lacks valid config flag {key}"))
        })
}

/// Create a file with its intermediate directories and fill it.
fn create_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NetworkError::process(format!("creating {}", parent.display()), e))?;
    }
    fs::write(path, contents)
        .map_err(|e| NetworkError::process(format!("writing {}", path.display()), e))
}

/// Execute the node binary with the single config-file argument.
fn spawn_node_process(
    config: &NodeConfig,
    name: &str,
    config_file_path: &Path,
    log_dir: Option<&Path>,
) -> Result<tokio::process::Child> {
    let mut command = Command::new(&config.binary_path);
    command.arg(format!(
        "--{}={}",
        flags::CONFIG_FILE,
        config_file_path.display()
    ));
    command.kill_on_drop(false);

    // Nodes write their own logs under log-dir; the child's std streams
    // are only captured when the impl-specific config asks for it.
    let redirect = |key: &str| {
        config
            .impl_specific_config
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    if let Some(log_dir) = log_dir {
        if redirect("redirect-stdout") {
            let file = open_log_file(log_dir, "stdout.log")?;
            command.stdout(Stdio::from(file));
        }
        if redirect("redirect-stderr") {
            let file = open_log_file(log_dir, "stderr.log")?;
            command.stderr(Stdio::from(file));
        }
    }

    command.spawn().map_err(|e| {
        NetworkError::process(
            format!("executing {} for node {name}", config.binary_path),
            e,
        )
    })
}

fn open_log_file(log_dir: &Path, file_name: &str) -> Result<fs::File> {
    fs::create_dir_all(log_dir)
        .map_err(|e| NetworkError::process(format!("creating {}", log_dir.display()), e))?;
    let path = log_dir.join(file_name);
    fs::File::create(&path)
        .map_err(|e| NetworkError::process(format!("creating {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::MockApiClient;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    /// Factory that records every mock client it hands out.
    fn recording_factory(
        store: Arc<StdMutex<Vec<Arc<MockApiClient>>>>,
    ) -> ApiClientFactory {
        Arc::new(move |ip: &str, port: u16| {
            let client = Arc::new(MockApiClient::healthy(
                format!("{ip}:{port}"),
                format!("NodeID-{port}"),
            ));
            store.lock().unwrap().push(Arc::clone(&client));
            client as Arc<dyn ApiClient>
        })
    }

    /// A stub "node binary": shell script that idles until signalled.
    fn stub_binary(dir: &TempDir) -> String {
        let path = dir.path().join("meridian-stub.sh");
        fs::write(&path, "#!/bin/sh\nexec sleep 300\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    fn node_config(dir: &TempDir, binary: &str, name: Option<&str>, port: u16) -> NodeConfig {
        let node_root = dir
            .path()
            .join(name.map(str::to_string).unwrap_or_else(|| format!("p{port}")));
        NodeConfig {
            name: name.map(str::to_string),
            binary_path: binary.to_string(),
            staking_cert: "-----BEGIN CERT-----\ncert\n-----END CERT-----\n".into(),
            staking_key: "-----BEGIN KEY-----\nkey\n-----END KEY-----\n".into(),
            config_flags: json!({
                (flags::CHAIN_CONFIG_DIR): node_root.join("configs").to_string_lossy(),
                (flags::GENESIS_FILE): node_root.join("configs/genesis.json").to_string_lossy(),
                (flags::STAKING_CERT_PATH): node_root.join("configs/staking.crt").to_string_lossy(),
                (flags::STAKING_KEY_PATH): node_root.join("configs/staking.key").to_string_lossy(),
                (flags::HTTP_PORT): port,
                (flags::STAKING_PORT): port + 1,
            }),
            impl_specific_config: Value::Null,
        }
    }

    fn empty_network(factory: ApiClientFactory) -> Arc<LocalNetwork> {
        let config = NetworkConfig {
            genesis: "{}".into(),
            chain_config: "{}".into(),
            core_config_flags: json!({ (flags::PUBLIC_IP): "127.0.0.1" }),
            node_configs: vec![],
        };
        LocalNetwork::new(test_logger(), config, factory).unwrap()
    }

    #[tokio::test]
    async fn generated_names_are_consecutive() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let store = Arc::new(StdMutex::new(Vec::new()));
        let network = empty_network(recording_factory(Arc::clone(&store)));

        for i in 0..3u16 {
            let handle = network
                .add_node(node_config(&dir, &binary, None, 20000 + i * 10))
                .unwrap();
            assert_eq!(handle.name, format!("node{}", i + 1));
        }
        assert_eq!(network.node_names(), vec!["node1", "node2", "node3"]);

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected_and_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        network
            .add_node(node_config(&dir, &binary, Some("alpha"), 20100))
            .unwrap();
        let err = network
            .add_node(node_config(&dir, &binary, Some("alpha"), 20200))
            .unwrap_err();
        assert!(matches!(err, NetworkError::NameConflict(_)));
        assert_eq!(network.node_names(), vec!["alpha"]);
        // The surviving handle still points at the first node's port.
        assert_eq!(network.get_node("alpha").unwrap().http_port, 20100);

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn remove_twice_fails_the_second_time() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        network
            .add_node(node_config(&dir, &binary, Some("solo"), 20300))
            .unwrap();
        network.remove_node("solo").await.unwrap();
        assert!(network.node_names().is_empty());

        let err = network.remove_node("solo").await.unwrap_err();
        assert!(matches!(err, NetworkError::NotFound(_)));

        let err = network.remove_node("never-added").await.unwrap_err();
        assert!(matches!(err, NetworkError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_closes_client_connection() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let store = Arc::new(StdMutex::new(Vec::new()));
        let network = empty_network(recording_factory(Arc::clone(&store)));

        network
            .add_node(node_config(&dir, &binary, Some("watched"), 20400))
            .unwrap();
        let client = Arc::clone(&store.lock().unwrap()[0]);
        assert!(!client.is_closed());

        network.remove_node("watched").await.unwrap();
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn restart_preserves_name_and_identity() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        let before = network
            .add_node(node_config(&dir, &binary, Some("phoenix"), 20500))
            .unwrap();
        let after = network.restart_node("phoenix", None).await.unwrap();

        assert_eq!(after.name, "phoenix");
        // Same staking cert on disk, so the derived identity is unchanged.
        assert_eq!(before.node_id, after.node_id);
        assert_eq!(network.node_names(), vec!["phoenix"]);

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn restart_unknown_node_fails() {
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));
        let err = network.restart_node("ghost", None).await.unwrap_err();
        assert!(matches!(err, NetworkError::NotFound(_)));
    }

    #[tokio::test]
    async fn stop_removes_all_nodes_and_closes_clients() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let store = Arc::new(StdMutex::new(Vec::new()));
        let network = empty_network(recording_factory(Arc::clone(&store)));

        for i in 0..4u16 {
            network
                .add_node(node_config(&dir, &binary, None, 20600 + i * 10))
                .unwrap();
        }
        network.stop().await.unwrap();

        assert!(network.node_names().is_empty());
        for client in store.lock().unwrap().iter() {
            assert!(client.is_closed());
        }
    }

    #[tokio::test]
    async fn files_are_materialized_with_merged_flags() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        let handle = network
            .add_node(node_config(&dir, &binary, Some("files"), 20700))
            .unwrap();
        assert_eq!(handle.uri, "127.0.0.1:20700");

        let config_dir = dir.path().join("files/configs");
        let written: Value =
            serde_json::from_slice(&fs::read(config_dir.join("config.json")).unwrap()).unwrap();
        // Node flags merged over core flags.
        assert_eq!(written[flags::PUBLIC_IP], "127.0.0.1");
        assert_eq!(written[flags::HTTP_PORT], 20700);

        assert!(config_dir.join("C/config.json").exists());
        assert!(config_dir.join("genesis.json").exists());
        assert!(config_dir.join("staking.crt").exists());
        assert!(config_dir.join("staking.key").exists());

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_required_flag_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        let mut config = node_config(&dir, &binary, Some("incomplete"), 20800);
        config
            .config_flags
            .as_object_mut()
            .unwrap()
            .remove(flags::GENESIS_FILE);

        let err = network.add_node(config).unwrap_err();
        assert!(matches!(err, NetworkError::Validation(_)));
        assert!(network.node_names().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_rejected_unless_ephemeral() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        let mut config = node_config(&dir, &binary, Some("no-creds"), 20900);
        config.staking_cert.clear();
        config.staking_key.clear();
        let err = network.add_node(config).unwrap_err();
        assert!(matches!(err, NetworkError::Validation(_)));

        // Same config with ephemeral credentials enabled is accepted, and
        // the identity is unknown until the node reports it.
        let mut config = node_config(&dir, &binary, Some("ephemeral"), 21000);
        config.staking_cert.clear();
        config.staking_key.clear();
        config
            .config_flags
            .as_object_mut()
            .unwrap()
            .insert(flags::STAKING_EPHEMERAL_CERT_ENABLED.into(), json!(true));
        let handle = network.add_node(config).unwrap();
        assert!(handle.node_id.is_none());

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_spawn_leaves_files_but_no_node() {
        let dir = TempDir::new().unwrap();
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        let config = node_config(&dir, "/nonexistent/meridian-binary", Some("broken"), 21100);
        let err = network.add_node(config).unwrap_err();
        assert!(matches!(err, NetworkError::Process { .. }));

        // Files written before the spawn attempt are left for inspection.
        assert!(dir.path().join("broken/configs/config.json").exists());
        assert!(network.node_names().is_empty());
    }

    #[tokio::test]
    async fn network_healthy_fans_out_and_times_out_on_one_bad_node() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let store = Arc::new(StdMutex::new(Vec::new()));
        let network = empty_network(recording_factory(Arc::clone(&store)));

        for i in 0..3u16 {
            network
                .add_node(node_config(&dir, &binary, None, 21200 + i * 10))
                .unwrap();
        }

        network
            .healthy(Duration::from_millis(200), Duration::from_millis(10))
            .await
            .unwrap();

        // Flip one node's last chain: the aggregate result flips to timeout.
        store.lock().unwrap()[1].set_bootstrapped("X", false);
        let err = network
            .healthy(Duration::from_millis(100), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Timeout(name) if name == "node2"));

        network.stop().await.unwrap();
    }

    #[tokio::test]
    async fn custom_network_applies_post_process() {
        let dir = TempDir::new().unwrap();
        let network = LocalNetwork::custom(
            test_logger(),
            "/usr/local/bin/meridian",
            dir.path(),
            recording_factory(Arc::new(StdMutex::new(Vec::new()))),
            |config| {
                // Keep the default layout but start with no nodes.
                config.node_configs.clear();
            },
        )
        .unwrap();
        assert!(network.node_names().is_empty());
    }

    #[tokio::test]
    async fn set_node_id_updates_handle() {
        let dir = TempDir::new().unwrap();
        let binary = stub_binary(&dir);
        let network = empty_network(recording_factory(Arc::new(StdMutex::new(Vec::new()))));

        let mut config = node_config(&dir, &binary, Some("late-id"), 21300);
        config.staking_cert.clear();
        config.staking_key.clear();
        config
            .config_flags
            .as_object_mut()
            .unwrap()
            .insert(flags::STAKING_EPHEMERAL_CERT_ENABLED.into(), json!(true));
        network.add_node(config).unwrap();

        let reported = NodeId::parse("NodeID-deadbeef").unwrap();
        network.set_node_id("late-id", reported.clone()).unwrap();
        assert_eq!(network.get_node("late-id").unwrap().node_id, Some(reported));

        network.stop().await.unwrap();
    }
}
