//! Creates a local five-node meridian network and waits for all nodes to
//! become healthy. The network runs until SIGINT.
//!
//! ```bash
//! cargo run --package network --example five_node_network -- /path/to/meridian
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use network::LocalNetwork;
use network::health::{DEFAULT_HEALTHY_TIMEOUT, DEFAULT_POLL_INTERVAL};
use slog::{Drain, Logger, o};

#[tokio::main]
async fn main() -> Result<()> {
    let logger = create_logger();

    let binary_path = std::env::args()
        .nth(1)
        .context("usage: five_node_network <node-binary-path>")?;
    let root_data_dir = std::env::temp_dir().join("meridian-five-node-network");

    let network = LocalNetwork::default_network(logger.clone(), &binary_path, &root_data_dir)?;

    slog::info!(logger, "Waiting for all nodes to report healthy...");
    tokio::select! {
        res = network.healthy(DEFAULT_HEALTHY_TIMEOUT, DEFAULT_POLL_INTERVAL) => res?,
        _ = tokio::signal::ctrl_c() => {
            slog::info!(logger, "Interrupted during startup, stopping network");
            network.stop().await?;
            return Ok(());
        }
    }

    for handle in network.all_nodes() {
        slog::info!(logger, "Node is up"; "name" => &handle.name, "uri" => &handle.uri);
    }
    slog::info!(logger, "All nodes healthy. Network runs until CTRL+C...");

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Got shutdown signal, stopping network");
    network.stop().await?;

    // Give the async log drain a moment to flush.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

fn create_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}
