//! Server daemon configuration.
//!
//! Loaded from an optional TOML file with environment overrides under the
//! `RUNNER_` prefix; every field has a default so the daemon starts with
//! no config at all.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

/// Complete control-server configuration.
///
/// # Example TOML
///
/// ```toml
/// listen_addr = "127.0.0.1:8080"
/// log_level = "info"
/// root_data_dir = "/tmp/meridian-network-runner"
/// healthy_timeout_secs = 120
/// poll_interval_secs = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the control API listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Root directory for per-node data (configs, logs, databases).
    #[serde(default = "default_root_data_dir")]
    pub root_data_dir: PathBuf,

    /// Deadline for the whole cluster to report healthy.
    #[serde(default = "default_healthy_timeout_secs")]
    pub healthy_timeout_secs: u64,

    /// Per-node health poll cadence.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_root_data_dir() -> PathBuf {
    std::env::temp_dir().join("meridian-network-runner")
}

fn default_healthy_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_secs() -> u64 {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            root_data_dir: default_root_data_dir(),
            healthy_timeout_secs: default_healthy_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl ServerConfig {
    /// Load configuration, merging (lowest to highest precedence):
    /// defaults, the TOML file if given, `RUNNER_*` environment variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("RUNNER_"))
            .extract()
            .context("Failed to load server configuration")
    }
}
