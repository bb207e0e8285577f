use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Name of the manifest document colocated with the keystore files.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Lifecycle state of a key. A pruned key is simply absent from the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    /// Currently used to sign/encrypt newly issued tokens
    Active,
    /// Retired, still accepted for verifying previously issued tokens
    Grace,
}

/// One cryptographic key instance tracked by the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyManifestEntry {
    /// Hex-encoded thumbprint of the certificate, published as the
    /// verification key id
    pub kid: String,
    /// Location of the exported keystore file
    pub path: String,
    pub created_at: DateTime<Utc>,
    /// When this key should stop being used to sign
    pub rotate_after: DateTime<Utc>,
    /// When a demoted key becomes eligible for deletion; only set in Grace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_until: Option<DateTime<Utc>>,
    pub status: KeyStatus,
}

impl KeyManifestEntry {
    pub fn keystore_exists(&self) -> bool {
        Path::new(&self.path).exists()
    }
}

/// Load the manifest for a key folder. Returns an empty list on first run.
///
/// A malformed manifest is an error: the caller's pass aborts and is retried
/// on the next tick rather than silently regenerating key material.
pub fn load(folder: &Path) -> Result<Vec<KeyManifestEntry>, Box<dyn std::error::Error + Send + Sync>> {
    let path = folder.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(&path)?;
    let manifest = serde_json::from_str(&contents)?;
    Ok(manifest)
}

/// Persist the full manifest, overwriting the file. There is no partial
/// update; the file is owned by a single scheduler loop in one process.
pub fn save(
    folder: &Path,
    entries: &[KeyManifestEntry],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = folder.join(MANIFEST_FILE);
    let contents = serde_json::to_string_pretty(entries)?;
    fs::write(&path, contents)?;
    Ok(())
}

/// Load the entries a key consumer should register at boot.
///
/// Entries whose keystore file is missing are treated as already pruned and
/// excluded. Grace entries come first and Active entries last, so a consumer
/// that treats "last registered" as "preferred for new signatures" picks the
/// active key while still verifying tokens signed by grace-period keys.
pub fn registration_entries(
    folder: &Path,
) -> Result<Vec<KeyManifestEntry>, Box<dyn std::error::Error + Send + Sync>> {
    let mut entries = load(folder)?;
    entries.retain(KeyManifestEntry::keystore_exists);
    entries.sort_by_key(|entry| entry.status == KeyStatus::Active);
    Ok(entries)
}
