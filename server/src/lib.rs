//! Control plane server for the meridian network runner.
//!
//! One [`runner::ClusterRunner`] instance wraps one local network: it
//! starts the cluster asynchronously at construction, gates readiness-
//! dependent requests on a watch channel, and guarantees idempotent
//! shutdown. The [`http`] module exposes the runner over an HTTP/JSON API
//! with one SSE streaming endpoint; requests and responses are the `sdk`
//! crate's wire types.

pub mod config;
pub mod error;
pub mod http;
pub mod runner;

pub use config::ServerConfig;
pub use error::ControlError;
pub use http::{ControlContext, router, serve};
pub use runner::{ClusterRunner, Readiness, RunnerConfig};
