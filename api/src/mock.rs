//! In-process mock of the node API for deterministic tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use crate::client::ApiClient;
use crate::error::{ApiError, Result};

/// A scriptable [`ApiClient`] backed by in-memory state.
///
/// Per-chain bootstrap flags can be flipped at any point; queries count
/// themselves so tests can assert that polling actually happened, and
/// `close` is recorded so teardown ordering is observable.
pub struct MockApiClient {
    uri: String,
    node_id: String,
    bootstrapped: Mutex<HashMap<String, bool>>,
    /// When set, every query fails as if the node were unreachable.
    unreachable: AtomicBool,
    closed: AtomicBool,
    query_count: AtomicU64,
}

impl MockApiClient {
    /// A mock node that reports every chain bootstrapped.
    pub fn healthy(uri: impl Into<String>, node_id: impl Into<String>) -> Self {
        let mut bootstrapped = HashMap::new();
        for chain in ["P", "C", "X"] {
            bootstrapped.insert(chain.to_string(), true);
        }
        Self {
            uri: uri.into(),
            node_id: node_id.into(),
            bootstrapped: Mutex::new(bootstrapped),
            unreachable: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            query_count: AtomicU64::new(0),
        }
    }

    /// A mock node with no chain bootstrapped yet.
    pub fn booting(uri: impl Into<String>, node_id: impl Into<String>) -> Self {
        let mock = Self::healthy(uri, node_id);
        for chain in ["P", "C", "X"] {
            mock.set_bootstrapped(chain, false);
        }
        mock
    }

    pub fn set_bootstrapped(&self, chain: &str, value: bool) {
        self.bootstrapped
            .lock()
            .unwrap()
            .insert(chain.to_string(), value);
    }

    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ApiError::InvalidResponse("node unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ApiClient for MockApiClient {
    async fn is_bootstrapped(&self, chain: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self
            .bootstrapped
            .lock()
            .unwrap()
            .get(chain)
            .copied()
            .unwrap_or(false))
    }

    async fn node_id(&self) -> Result<String> {
        self.check_reachable()?;
        Ok(self.node_id.clone())
    }

    async fn node_version(&self) -> Result<String> {
        self.check_reachable()?;
        Ok("meridian/0.0.0-mock".to_string())
    }

    async fn health(&self) -> Result<bool> {
        self.check_reachable()?;
        let chains = self.bootstrapped.lock().unwrap();
        Ok(chains.values().all(|b| *b))
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
