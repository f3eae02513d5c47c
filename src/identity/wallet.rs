//! Local Identity
//!
//! Generates and persists the automaton's local identity handle. Actual
//! cryptographic identity issuance (wallet generation, on-chain signing)
//! is the chain registry's concern and lives behind [`crate::types::ChainClient`];
//! this module only manages the opaque local address string used to key
//! state on disk when no registry-issued address is configured yet.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory name under the user's home for all automaton data.
const AUTOMATON_DIR_NAME: &str = ".automaton";

/// Identity file name within the automaton directory.
const IDENTITY_FILENAME: &str = "identity.json";

/// On-disk local identity representation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIdentity {
    /// Opaque local address handle, e.g. `local:<uuid>`. A registry-issued
    /// address (from the chain client) takes precedence once configured.
    pub address: String,
    pub created_at: String,
}

/// Returns the automaton base directory: `~/.automaton`.
pub fn get_automaton_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
    home.join(AUTOMATON_DIR_NAME)
}

/// Returns the full path to the identity file: `~/.automaton/identity.json`.
pub fn get_identity_path() -> PathBuf {
    get_automaton_dir().join(IDENTITY_FILENAME)
}

/// Get or create the automaton's local identity.
///
/// If an identity file already exists, loads it. Otherwise generates a
/// fresh opaque handle and persists it with restrictive permissions.
pub fn get_local_identity() -> Result<LocalIdentity> {
    let dir = get_automaton_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create automaton directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
            .context("Failed to set directory permissions")?;
    }

    let identity_path = get_identity_path();

    if identity_path.exists() {
        let contents =
            fs::read_to_string(&identity_path).context("Failed to read identity file")?;
        let identity: LocalIdentity =
            serde_json::from_str(&contents).context("Failed to parse identity JSON")?;
        Ok(identity)
    } else {
        let identity = LocalIdentity {
            address: format!("local:{}", Uuid::new_v4()),
            created_at: Utc::now().to_rfc3339(),
        };

        let json = serde_json::to_string_pretty(&identity)
            .context("Failed to serialize identity")?;

        fs::write(&identity_path, &json).context("Failed to write identity file")?;
        fs::set_permissions(&identity_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set identity file permissions")?;

        Ok(identity)
    }
}

/// Check whether a local identity file exists on disk.
pub fn identity_exists() -> bool {
    get_identity_path().exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_automaton_dir_is_under_home() {
        let dir = get_automaton_dir();
        assert!(dir.ends_with(".automaton"));
    }

    #[test]
    fn test_get_identity_path_is_under_automaton_dir() {
        let path = get_identity_path();
        assert!(path.ends_with("identity.json"));
        assert!(path.starts_with(get_automaton_dir()));
    }
}
