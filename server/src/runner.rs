//! Cluster runner: one local network plus its startup/teardown lifecycle.
//!
//! The runner enters `Starting` asynchronously at construction: node
//! processes are spawned and the health wait runs in a background task
//! while client requests are already being accepted. Readiness is a watch
//! channel that leaves `Pending` exactly once; shutdown is guarded so only
//! the first `stop` performs teardown and every later call observes the
//! same terminal outcome.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use api::ApiClientFactory;
use network::health::{DEFAULT_HEALTHY_TIMEOUT, DEFAULT_POLL_INTERVAL};
use network::{
    AttachedPeers, LocalNetwork, NetworkConfig, NetworkError, NodeId, StopSignal,
    TcpPeerConnection,
};
use sdk::types::{ClusterInfo, NodeInfo, PeerDescriptor};
use slog::Logger;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ControlError;

/// Parameters of one cluster start.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub exec_path: String,
    pub num_nodes: u32,
    pub whitelisted_subnets: String,
    pub root_data_dir: PathBuf,
    pub healthy_timeout: Duration,
    pub poll_interval: Duration,
}

impl RunnerConfig {
    pub fn new(exec_path: impl Into<String>, root_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            exec_path: exec_path.into(),
            num_nodes: network::config::DEFAULT_NUM_NODES,
            whitelisted_subnets: String::new(),
            root_data_dir: root_data_dir.into(),
            healthy_timeout: DEFAULT_HEALTHY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Cluster readiness. Leaves `Pending` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

pub struct ClusterRunner {
    logger: Logger,
    config: RunnerConfig,
    client_factory: ApiClientFactory,
    network: OnceLock<Arc<LocalNetwork>>,
    peers: AttachedPeers,
    ready_tx: watch::Sender<Readiness>,
    ready_rx: watch::Receiver<Readiness>,
    /// Unix seconds of the one-time readiness transition.
    ready_at: OnceLock<u64>,
    stop: StopSignal,
    startup_task: Mutex<Option<JoinHandle<()>>>,
    /// Terminal stop outcome; `None` inside means clean teardown. Set by
    /// the single caller that performs teardown, awaited by the rest.
    stop_result: tokio::sync::OnceCell<Option<String>>,
}

impl ClusterRunner {
    /// Construct the runner and immediately begin starting the cluster in
    /// the background.
    pub fn start(
        logger: Logger,
        config: RunnerConfig,
        client_factory: ApiClientFactory,
    ) -> Arc<Self> {
        let (ready_tx, ready_rx) = watch::channel(Readiness::Pending);
        let runner = Arc::new(Self {
            peers: AttachedPeers::new(logger.clone()),
            logger,
            config,
            client_factory,
            network: OnceLock::new(),
            ready_tx,
            ready_rx,
            ready_at: OnceLock::new(),
            stop: StopSignal::new(),
            startup_task: Mutex::new(None),
            stop_result: tokio::sync::OnceCell::new(),
        });

        let task = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.run_startup().await }
        });
        *runner.startup_task.lock().unwrap() = Some(task);
        runner
    }

    /// Background startup: build the network (spawning node processes),
    /// then wait for cluster health, racing the stop signal.
    async fn run_startup(self: Arc<Self>) {
        slog::info!(self.logger, "Creating local network";
            "exec_path" => &self.config.exec_path,
            "num_nodes" => self.config.num_nodes,
        );

        let network_config = match NetworkConfig::default_n_nodes(
            &self.config.exec_path,
            self.config.num_nodes,
            &self.config.root_data_dir,
            &self.config.whitelisted_subnets,
        ) {
            Ok(config) => config,
            Err(e) => return self.fail_startup(e.to_string()),
        };

        let network = match LocalNetwork::new(
            self.logger.clone(),
            network_config,
            Arc::clone(&self.client_factory),
        ) {
            Ok(network) => network,
            Err(e) => return self.fail_startup(e.to_string()),
        };
        let _ = self.network.set(Arc::clone(&network));

        // A stop that raced construction wins; teardown of whatever was
        // spawned happens in stop(), which joins this task first.
        if self.stop.is_triggered() {
            return self.fail_startup(NetworkError::Aborted.to_string());
        }

        slog::info!(self.logger, "Waiting for all nodes to report healthy...");
        let health = tokio::select! {
            _ = self.stop.wait() => Err(NetworkError::Aborted),
            res = network.healthy(self.config.healthy_timeout, self.config.poll_interval) => res,
        };

        match health {
            Ok(()) => {
                self.resolve_identities(&network).await;
                let _ = self.ready_at.set(unix_now());
                let _ = self.ready_tx.send(Readiness::Ready);
                slog::info!(self.logger, "Cluster is ready");
            }
            Err(e) => self.fail_startup(e.to_string()),
        }
    }

    fn fail_startup(&self, reason: String) {
        slog::warn!(self.logger, "Cluster startup failed"; "reason" => &reason);
        let _ = self.ready_tx.send(Readiness::Failed(reason));
    }

    /// Fill in identities the runner could not derive locally (nodes with
    /// ephemeral credentials report theirs over the API once up).
    async fn resolve_identities(&self, network: &LocalNetwork) {
        for handle in network.all_nodes() {
            if handle.node_id.is_some() {
                continue;
            }
            match handle.client.node_id().await {
                Ok(reported) => match NodeId::parse(&reported) {
                    Ok(id) => {
                        let _ = network.set_node_id(&handle.name, id);
                    }
                    Err(e) => slog::warn!(self.logger, "Node reported malformed ID";
                        "name" => &handle.name, "error" => %e),
                },
                Err(e) => slog::warn!(self.logger, "Could not fetch node ID";
                    "name" => &handle.name, "error" => %e),
            }
        }
    }

    /// Current readiness without waiting.
    pub fn readiness(&self) -> Readiness {
        self.ready_rx.borrow().clone()
    }

    /// Block until readiness leaves `Pending`.
    pub async fn wait_ready(&self) -> Readiness {
        let mut rx = self.ready_rx.clone();
        let result = match rx.wait_for(|state| !matches!(state, Readiness::Pending)).await {
            Ok(state) => state.clone(),
            // The sender lives inside self; this only fires if the runner
            // is being dropped out from under the waiter.
            Err(_) => Readiness::Failed("runner terminated".to_string()),
        };
        result
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Live cluster view, re-derived from the manager's current mapping.
    /// Only the readiness timestamp is frozen.
    pub fn cluster_info(&self) -> ClusterInfo {
        let healthy = matches!(self.readiness(), Readiness::Ready);
        let ready_at_unix = self.ready_at.get().copied();

        let Some(network) = self.network.get() else {
            return ClusterInfo {
                healthy,
                ready_at_unix,
                ..Default::default()
            };
        };

        let node_names = network.node_names();
        let mut node_infos = HashMap::new();
        for handle in network.all_nodes() {
            let node_config = network.get_node_config(&handle.name).ok();
            node_infos.insert(
                handle.name.clone(),
                NodeInfo {
                    name: handle.name.clone(),
                    exec_path: node_config
                        .as_ref()
                        .map(|c| c.binary_path.clone())
                        .unwrap_or_default(),
                    uri: format!("http://{}", handle.uri),
                    id: handle
                        .node_id
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    log_dir: handle
                        .log_dir
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    db_dir: handle
                        .db_dir
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    whitelisted_subnets: self.config.whitelisted_subnets.clone(),
                    config: node_config
                        .map(|c| c.config_flags.to_string())
                        .unwrap_or_default(),
                },
            );
        }

        ClusterInfo {
            node_names,
            node_infos,
            healthy,
            ready_at_unix,
        }
    }

    /// URIs of every live node, insertion order.
    pub fn uris(&self) -> Vec<String> {
        self.network
            .get()
            .map(|network| {
                network
                    .all_nodes()
                    .iter()
                    .map(|h| format!("http://{}", h.uri))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn network(&self) -> Result<&Arc<LocalNetwork>, ControlError> {
        self.network.get().ok_or(ControlError::NotStarted)
    }

    pub async fn remove_node(&self, name: &str) -> Result<ClusterInfo, ControlError> {
        let network = self.network()?;
        // Peer connections dangle once the process goes away; drop them
        // with the node.
        self.peers.detach_node(name).await;
        network.remove_node(name).await?;
        Ok(self.cluster_info())
    }

    pub async fn restart_node(
        &self,
        name: &str,
        exec_path: Option<String>,
        whitelisted_subnets: Option<String>,
    ) -> Result<ClusterInfo, ControlError> {
        let network = self.network()?;
        self.peers.detach_node(name).await;
        match whitelisted_subnets {
            // A subnet change rewrites the node's flag set before the
            // re-add; otherwise the manager's plain restart reuses it.
            Some(subnets) => {
                let mut config = network.get_node_config(name)?;
                config.name = Some(name.to_string());
                if let Some(exec_path) = exec_path {
                    config.binary_path = exec_path;
                }
                if let Some(node_flags) = config.config_flags.as_object_mut() {
                    node_flags.insert(
                        network::config::flags::WHITELISTED_SUBNETS.to_string(),
                        serde_json::Value::String(subnets),
                    );
                }
                network.remove_node(name).await?;
                network.add_node(config)?;
            }
            None => {
                network.restart_node(name, exec_path).await?;
            }
        }
        Ok(self.cluster_info())
    }

    /// Attach a simulated peer to a node's staking port.
    pub async fn attach_peer(&self, name: &str) -> Result<PeerDescriptor, ControlError> {
        let network = self.network()?;
        let handle = network.get_node(name)?;
        let ip = handle
            .uri
            .rsplit_once(':')
            .map(|(ip, _)| ip.to_string())
            .unwrap_or_else(|| handle.uri.clone());

        let conn = TcpPeerConnection::connect(&ip, handle.staking_port).await?;
        let peer_id = self.peers.attach(name, Box::new(conn)).await;
        slog::info!(self.logger, "Attached peer"; "node" => name, "peer_id" => &peer_id);
        Ok(PeerDescriptor {
            node_name: name.to_string(),
            peer_id,
        })
    }

    /// Inject a raw message through an attached peer.
    pub async fn send_outbound_message(
        &self,
        name: &str,
        peer_id: &str,
        op: u32,
        payload: &[u8],
    ) -> Result<(), ControlError> {
        // Peer lookup covers the node namespace too, but an unknown node
        // should report as such even before any peer was ever attached.
        let network = self.network()?;
        network.get_node(name)?;
        match self.peers.send_outbound(name, peer_id, op, payload).await {
            // The node is known to the network; a missing entry in the
            // peer registry means the peer ID is what is unknown.
            Err(NetworkError::NotFound(_)) => Err(NetworkError::PeerNotFound {
                node: name.to_string(),
                peer_id: peer_id.to_string(),
            }
            .into()),
            other => other.map_err(Into::into),
        }
    }

    /// Tear the cluster down. Only the first caller executes teardown;
    /// every caller observes the same terminal outcome (`None` = clean).
    pub async fn stop(&self) -> Option<String> {
        self.stop_result
            .get_or_init(|| async {
                self.stop.trigger();

                // Wait for the startup task to observe the signal before
                // touching the network, so teardown never races node
                // spawning or the health wait.
                let task = self.startup_task.lock().unwrap().take();
                if let Some(task) = task {
                    let _ = task.await;
                }

                let result = match self.network.get() {
                    Some(network) => network.stop().await.err().map(|e| e.to_string()),
                    None => None,
                };
                slog::info!(self.logger, "Terminated network";
                    "error" => result.as_deref().unwrap_or("none"));
                result
            })
            .await
            .clone()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
