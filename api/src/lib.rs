//! API clients for meridian nodes.
//!
//! The orchestration core treats each node as an opaque process exposing an
//! HTTP JSON-RPC API. This crate defines the capability interface the runner
//! needs from that API ([`ApiClient`]), the concrete HTTP transport
//! ([`HttpApiClient`]), and an in-process mock ([`MockApiClient`]) so the
//! lifecycle machinery can be tested without spawning real node binaries.
//!
//! Concrete transports are interchangeable: the runner receives clients
//! through an [`ApiClientFactory`] selected by the caller.

pub mod client;
pub mod error;
pub mod http;
pub mod mock;

pub use client::{ApiClient, ApiClientFactory, http_client_factory};
pub use error::{ApiError, Result};
pub use http::HttpApiClient;
pub use mock::MockApiClient;
