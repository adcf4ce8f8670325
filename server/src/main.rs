//! Meridian network runner binary.
//!
//! Runs the control-plane server, and doubles as the remote-control CLI:
//!
//! ```bash
//! # Start the control server
//! meridian-runner serve --listen-addr 127.0.0.1:8080
//!
//! # Drive it from another terminal
//! meridian-runner start --exec-path /usr/local/bin/meridian --num-nodes 5
//! meridian-runner health
//! meridian-runner remove-node --node-name node3
//! meridian-runner stop
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sdk::{ClientConfig, RunnerClient};
use serde::Serialize;
use server::{ControlContext, ServerConfig};
use slog::{Drain, Logger, o};

#[derive(Parser, Debug)]
#[command(name = "meridian-runner")]
#[command(about = "Local cluster runner for meridian nodes")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Control server endpoint (client commands)
    #[arg(long, default_value = "http://127.0.0.1:8080", global = true)]
    endpoint: String,

    /// Client request timeout in seconds
    #[arg(long, default_value_t = 120, global = true)]
    request_timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control-plane server
    Serve {
        /// Address to listen on (overrides config file)
        #[arg(long)]
        listen_addr: Option<String>,

        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root directory for per-node data (overrides config file)
        #[arg(long)]
        root_data_dir: Option<PathBuf>,
    },

    /// Start the cluster
    Start {
        /// Node binary path
        #[arg(long)]
        exec_path: String,

        /// Number of nodes
        #[arg(long)]
        num_nodes: Option<u32>,

        /// Whitelisted subnets (comma-separated)
        #[arg(long)]
        whitelisted_subnets: Option<String>,
    },

    /// Wait for the cluster to report healthy
    Health,

    /// List node URIs
    Uris,

    /// Full cluster status snapshot
    Status,

    /// Stream cluster status snapshots
    StreamStatus {
        /// Interval between pushed snapshots, in seconds
        #[arg(long, default_value_t = 5)]
        push_interval_secs: u64,
    },

    /// Remove a node
    RemoveNode {
        #[arg(long)]
        node_name: String,
    },

    /// Restart a node, optionally with a different binary
    RestartNode {
        #[arg(long)]
        node_name: String,

        #[arg(long)]
        exec_path: Option<String>,

        /// Whitelisted subnets (comma-separated)
        #[arg(long)]
        whitelisted_subnets: Option<String>,
    },

    /// Attach a simulated peer to a node
    AttachPeer {
        #[arg(long)]
        node_name: String,
    },

    /// Send a raw message through an attached peer
    SendOutboundMessage {
        #[arg(long)]
        node_name: String,

        #[arg(long)]
        peer_id: String,

        #[arg(long, default_value_t = 0)]
        message_op: u32,

        /// Message bytes, hex-encoded
        #[arg(long)]
        message_bytes_hex: String,
    },

    /// Stop the cluster
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let logger = create_logger(&args.log_level);

    let endpoint = args.endpoint.clone();
    let request_timeout = Duration::from_secs(args.request_timeout_secs);
    let client =
        move || RunnerClient::new(ClientConfig::new(endpoint.as_str()).with_timeout(request_timeout));

    match args.command {
        Command::Serve {
            listen_addr,
            config,
            root_data_dir,
        } => {
            let mut config = ServerConfig::load(config.as_deref())?;
            if let Some(addr) = listen_addr {
                config.listen_addr = addr;
            }
            if let Some(dir) = root_data_dir {
                config.root_data_dir = dir;
            }
            serve(logger, config).await
        }
        Command::Start {
            exec_path,
            num_nodes,
            whitelisted_subnets,
        } => {
            let info = client()
                .start(&exec_path, num_nodes, whitelisted_subnets)
                .await?;
            print_json(&info)
        }
        Command::Health => print_json(&client().health().await?),
        Command::Uris => print_json(&client().uris().await?),
        Command::Status => print_json(&client().status().await?),
        Command::StreamStatus { push_interval_secs } => {
            stream_status(client(), push_interval_secs).await
        }
        Command::RemoveNode { node_name } => {
            print_json(&client().remove_node(&node_name).await?)
        }
        Command::RestartNode {
            node_name,
            exec_path,
            whitelisted_subnets,
        } => print_json(
            &client()
                .restart_node(&node_name, exec_path, whitelisted_subnets)
                .await?,
        ),
        Command::AttachPeer { node_name } => {
            print_json(&client().attach_peer(&node_name).await?)
        }
        Command::SendOutboundMessage {
            node_name,
            peer_id,
            message_op,
            message_bytes_hex,
        } => {
            let payload = hex::decode(&message_bytes_hex)
                .context("--message-bytes-hex is not valid hex")?;
            let sent = client()
                .send_outbound_message(&node_name, &peer_id, message_op, &payload)
                .await?;
            print_json(&serde_json::json!({ "sent": sent }))
        }
        Command::Stop => print_json(&client().stop().await?),
    }
}

/// Run the control server until SIGINT, then tear down any running cluster.
async fn serve(logger: Logger, config: ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.root_data_dir).with_context(|| {
        format!(
            "Failed to create root data dir {}",
            config.root_data_dir.display()
        )
    })?;

    let addr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr))?;

    let mut context = ControlContext::new(
        logger.clone(),
        config.root_data_dir.clone(),
        api::http_client_factory(),
    );
    context.healthy_timeout = Duration::from_secs(config.healthy_timeout_secs);
    context.poll_interval = Duration::from_secs(config.poll_interval_secs);
    let context = Arc::new(context);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
    };
    server::serve(addr, Arc::clone(&context), shutdown).await?;

    // The server loop ended on a signal; take any running cluster down
    // with it.
    if let Some(runner) = context.current_runner() {
        slog::info!(logger, "Shutting down cluster...");
        if let Some(error) = runner.stop().await {
            slog::error!(logger, "Teardown error"; "error" => error);
        }
    }
    slog::info!(logger, "Server stopped");
    Ok(())
}

/// Print pushed snapshots until the stream ends or SIGINT.
async fn stream_status(client: RunnerClient, push_interval_secs: u64) -> Result<()> {
    let mut stream = client
        .stream_status(Duration::from_secs(push_interval_secs.max(1)))
        .await?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            info = stream.next() => match info {
                Some(info) => print_json(&info)?,
                None => break,
            },
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn create_logger(level: &str) -> Logger {
    use slog::Level;
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}
