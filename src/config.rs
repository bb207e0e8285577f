use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Key folders and grace policy for the rotation scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateStoreConfig {
    /// Folder holding the token-signing keys and their manifest
    pub signing_folder: String,
    /// Folder holding the token-encryption keys and their manifest
    pub encryption_folder: String,
    /// Days a demoted key stays loadable for verification before pruning
    #[serde(default = "default_grace_days")]
    pub grace_days: u32,
}

fn default_grace_days() -> u32 {
    7
}

/// Directory watched for an externally renewed serving certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub certificate_store: CertificateStoreConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        let store = &self.certificate_store;
        if store.signing_folder.trim().is_empty() {
            return Err("certificate_store.signing_folder must not be empty".to_string());
        }
        if store.encryption_folder.trim().is_empty() {
            return Err("certificate_store.encryption_folder must not be empty".to_string());
        }
        if store.grace_days > 365 {
            return Err(format!(
                "certificate_store.grace_days must be between 0 and 365, got {}",
                store.grace_days
            ));
        }
        if let Some(tls) = &self.tls {
            if tls.cert_path.trim().is_empty() {
                return Err("tls.cert_path must not be empty when tls is configured".to_string());
            }
        }
        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<AppConfig>, String> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let config: AppConfig = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse YAML config: {}", e))?;

    config.validate()?;

    info!(
        "Configuration loaded: signing folder '{}', encryption folder '{}', grace {} day(s)",
        config.certificate_store.signing_folder,
        config.certificate_store.encryption_folder,
        config.certificate_store.grace_days
    );
    if let Some(tls) = &config.tls {
        info!("TLS hot-reload enabled for '{}'", tls.cert_path);
    }

    Ok(Arc::new(config))
}

/// Load configuration with fallback options
pub fn load_config_with_fallback() -> Result<Arc<AppConfig>, String> {
    // Try loading from environment variable first
    if let Ok(config_path) = std::env::var("CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    // Try common config file locations
    let paths = vec!["config.yaml", "config.yml", "./config.yaml", "./config.yml"];

    for path in paths {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    Err(
        "No configuration file found. Please create a config.yaml file or set CONFIG_PATH \
         environment variable."
            .to_string(),
    )
}
