//! API Key Provisioning
//!
//! Cryptographic identity issuance and on-chain registration are out of
//! scope for this runtime (see the chain registry behind
//! [`crate::types::ChainClient`]); this module only persists whatever API
//! key the operator supplies via config or environment so the rest of the
//! runtime has a single place to read it from.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::wallet::get_automaton_dir;
use crate::types::ProvisionResult;

/// Minimal config.json structure stored in `~/.automaton/config.json`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionConfig {
    api_key: String,
    address: String,
    provisioned_at: String,
}

/// Load a previously-saved API key from `~/.automaton/config.json`.
///
/// Returns `None` if the file does not exist or the key field is absent.
pub fn load_api_key_from_config() -> Option<String> {
    let config_path = get_automaton_dir().join("config.json");
    if !config_path.exists() {
        return None;
    }

    let contents = fs::read_to_string(&config_path).ok()?;
    let config: ProvisionConfig = serde_json::from_str(&contents).ok()?;

    if config.api_key.is_empty() {
        None
    } else {
        Some(config.api_key)
    }
}

/// Persist a caller-supplied API key and local address.
///
/// This is a bookkeeping step, not a provisioning flow: the key itself
/// must already have been issued out-of-band by the chain registry.
pub fn save_provision(api_key: &str, address: &str) -> Result<ProvisionResult> {
    let dir = get_automaton_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create automaton directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }

    let config_path = dir.join("config.json");
    let config = ProvisionConfig {
        api_key: api_key.to_string(),
        address: address.to_string(),
        provisioned_at: Utc::now().to_rfc3339(),
    };

    let json = serde_json::to_string_pretty(&config)?;
    fs::write(&config_path, &json).context("Failed to write config.json")?;
    fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

    let key_prefix = api_key.chars().take(8).collect::<String>();
    Ok(ProvisionResult {
        api_key: api_key.to_string(),
        wallet_address: address.to_string(),
        key_prefix,
    })
}
