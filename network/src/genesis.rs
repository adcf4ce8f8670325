//! Default genesis state for local networks.

use serde_json::{Value, json};

use crate::error::{NetworkError, Result};

/// Default local-network genesis, embedded at compile time.
const GENESIS_JSON: &str = include_str!("default/genesis.json");

/// Chain config applied to every local network's C-chain.
fn local_chain_config() -> Value {
    json!({
        "chainId": 43112,
        "feeRecipient": "",
        "allowUnprotectedTxs": true,
        "localTxsEnabled": true,
        "pruningEnabled": false,
    })
}

/// Load the local network genesis and return it as a JSON map.
///
/// The embedded genesis carries `cChainGenesis` as a JSON object for
/// editability, but the node expects the whole of `cChainGenesis` to be a
/// properly escaped *string*. This patches the object's `config` section
/// with the local chain config, then re-serializes it into place.
pub fn load_local_genesis() -> Result<Value> {
    let mut genesis: Value = serde_json::from_str(GENESIS_JSON)
        .map_err(|e| NetworkError::Genesis(format!("embedded genesis is invalid: {e}")))?;

    let chain_genesis = genesis
        .get_mut("cChainGenesis")
        .ok_or_else(|| NetworkError::Genesis("genesis lacks cChainGenesis".into()))?;
    let chain_map = chain_genesis
        .as_object_mut()
        .ok_or_else(|| NetworkError::Genesis("cChainGenesis is not an object".into()))?;
    chain_map.insert("config".to_string(), local_chain_config());

    let escaped = serde_json::to_string(chain_genesis)
        .map_err(|e| NetworkError::Genesis(e.to_string()))?;
    genesis["cChainGenesis"] = Value::String(escaped);
    Ok(genesis)
}

/// Default chain config file contents written next to each node's config.
pub fn default_chain_config() -> String {
    serde_json::to_string_pretty(&local_chain_config()).expect("static chain config serializes")
}
