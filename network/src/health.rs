//! Bootstrap health polling.

use std::time::Duration;

use api::ApiClient;
use tokio::time::Instant;

/// Sub-chains that must all report bootstrapped for a node to be healthy.
pub const BOOTSTRAP_CHAINS: [&str; 3] = ["P", "C", "X"];

/// Default deadline for a whole network to become healthy.
pub const DEFAULT_HEALTHY_TIMEOUT: Duration = Duration::from_secs(120);

/// Default per-node poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll a node until every sub-chain reports bootstrapped, or `timeout`
/// elapses.
///
/// A node counts as healthy only when all three chains answer bootstrapped
/// within the same poll round. Query errors are expected while the node is
/// still coming up and are treated as "not yet healthy", never surfaced:
/// the next tick retries. Returns `true` on success, `false` on timeout.
pub async fn await_node_healthy(
    client: &dyn ApiClient,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let mut node_is_up = true;
        for chain in BOOTSTRAP_CHAINS {
            match client.is_bootstrapped(chain).await {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    node_is_up = false;
                    break;
                }
            }
        }
        if node_is_up {
            return true;
        }
        if Instant::now() + poll_interval > deadline {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}
