// Copyright (c) 2024 Omerta Mesh Contributors

//! The two small on-disk JSON formats the core reads and writes directly
//! (§6): the identity file and the networks file. The peer-cache file's
//! format and load/save live on `PeerCache` itself (§2b); this module only
//! adds the two formats that weren't already implemented.
//!
//! Saving and restricting permissions follows the wallet collaborator's
//! `Wallet::save`/`Wallet::load` (write to a 0600 file on unix, parse with
//! a descriptive error otherwise).

use chrono::Utc;
use mesh_identity::Identity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{MeshError, Result};

/// `{private_key_hex32, created_at_iso8601, bip39_entropy_hex16?}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityFile {
    pub private_key_hex32: String,
    pub created_at_iso8601: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bip39_entropy_hex16: Option<String>,
}

impl IdentityFile {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            private_key_hex32: hex::encode(identity.signing_seed()),
            created_at_iso8601: Utc::now().to_rfc3339(),
            bip39_entropy_hex16: None,
        }
    }

    pub fn to_identity(&self) -> Result<Identity> {
        let seed = hex::decode(&self.private_key_hex32)
            .ok()
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .ok_or_else(|| {
                MeshError::Persistence(
                    "identity".to_string(),
                    "private_key_hex32 is not 32 bytes of hex".to_string(),
                )
            })?;
        Ok(Identity::from_signing_seed(seed))
    }
}

/// Write an identity file, restricting permissions to the owner on unix
/// (the file carries a raw private key).
pub fn save_identity(path: impl AsRef<Path>, identity: &Identity) -> Result<()> {
    let path = path.as_ref();
    let file = IdentityFile::from_identity(identity);
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut handle = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
        handle
            .write_all(json.as_bytes())
            .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
    }
    #[cfg(not(unix))]
    {
        fs::write(path, json)
            .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
    }
    Ok(())
}

/// Read and parse an identity file.
pub fn load_identity(path: impl AsRef<Path>) -> Result<Identity> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
    let file: IdentityFile = serde_json::from_str(&json)
        .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
    file.to_identity()
}

/// One row of the networks file (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    pub network_key_hex32: String,
    pub bootstrap_peers: Vec<String>,
    pub joined_at_iso8601: String,
    pub last_seen_iso8601: String,
    pub enabled: bool,
    pub auto_reconnect: bool,
}

impl NetworkRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, network_key: &mesh_crypto::NetworkKey) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            name: name.into(),
            network_key_hex32: hex::encode(network_key.as_bytes()),
            bootstrap_peers: Vec::new(),
            joined_at_iso8601: now.clone(),
            last_seen_iso8601: now,
            enabled: true,
            auto_reconnect: true,
        }
    }

    pub fn network_key(&self) -> Result<mesh_crypto::NetworkKey> {
        let bytes = hex::decode(&self.network_key_hex32)
            .map_err(|_| MeshError::InvalidNetworkKey(self.network_key_hex32.len() / 2))?;
        mesh_crypto::NetworkKey::from_slice(&bytes).map_err(|_| MeshError::InvalidNetworkKey(bytes.len()))
    }

    pub fn touch_last_seen(&mut self) {
        self.last_seen_iso8601 = Utc::now().to_rfc3339();
    }
}

/// Write the full set of configured networks.
pub fn save_networks(path: impl AsRef<Path>, networks: &[NetworkRecord]) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(networks)
        .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    fs::write(path, json).map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))
}

/// Read the full set of configured networks.
pub fn load_networks(path: impl AsRef<Path>) -> Result<Vec<NetworkRecord>> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| MeshError::Persistence(path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_file_round_trips() {
        let (identity, _) = Identity::generate();
        let dir = std::env::temp_dir().join(format!("mesh-node-test-{}", identity.peer_id()));
        let path = dir.join("identity.json");
        save_identity(&path, &identity).unwrap();
        let restored = load_identity(&path).unwrap();
        assert_eq!(identity.peer_id(), restored.peer_id());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn networks_file_round_trips() {
        let key = mesh_crypto::NetworkKey::from_bytes([0x42; 32]);
        let record = NetworkRecord::new("net-1", "home", &key);
        let dir = std::env::temp_dir().join("mesh-node-test-networks");
        let path = dir.join("networks.json");
        save_networks(&path, &[record.clone()]).unwrap();
        let restored = load_networks(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].name, "home");
        assert_eq!(restored[0].network_key().unwrap().as_bytes(), key.as_bytes());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_identity_file_is_a_persistence_error() {
        let dir = std::env::temp_dir().join("mesh-node-test-malformed-identity");
        let path = dir.join("identity.json");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "not valid json").unwrap();
        let err = load_identity(&path).unwrap_err();
        assert!(matches!(err, MeshError::Persistence(_, _)));
        let _ = fs::remove_dir_all(&dir);
    }
}
