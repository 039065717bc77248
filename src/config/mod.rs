use once_cell::sync::OnceCell;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

use crate::types::error::{MaskboxError, Result};

/// Global configuration instance
static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// The mailbox account this engine manages aliases for
    #[serde(default)]
    pub account: AccountConfig,

    /// Upstream mail-relay API
    #[serde(default)]
    pub relay: RelayConfig,

    /// Local storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Mailbox id assigned by the relay
    #[serde(default)]
    pub mailbox_id: i64,

    /// Mail domain the engine administers aliases under
    pub mail_domain: String,

    /// Root secret all namespace keypairs are derived from. Generated on
    /// first run if absent; losing it means losing the namespace keys.
    pub secret_box_priv_key: Option<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            mailbox_id: 0,
            mail_domain: String::new(),
            secret_box_priv_key: None,
        }
    }
}

/// Mail-relay API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Base URL of the relay registration API
    pub base_url: String,

    /// Upper bound on every relay call, in seconds. A timed-out call is a
    /// failed call; retry policy belongs to the relay, not this engine.
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mailer.telios.io".to_string(),
            timeout_secs: default_relay_timeout_secs(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path; defaults under the platform data dir
    pub db_path: Option<PathBuf>,
}

fn default_relay_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("maskbox.db"))
    }

    /// The account root secret, minting one if the config has none yet.
    pub fn account_secret(&mut self) -> String {
        if let Some(secret) = &self.account.secret_box_priv_key {
            return secret.clone();
        }
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let secret = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, seed);
        self.account.secret_box_priv_key = Some(secret.clone());
        secret
    }
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maskbox")
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("maskbox").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config").join("maskbox").join("config.toml"));
    }

    paths
}

/// Initialize configuration from default paths.
///
/// Returns the config path in use: the first discovered file, or the
/// default location a fresh config should be written to.
pub fn init_config() -> Result<PathBuf> {
    info!("Initializing configuration from default paths");

    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            init_config_from_path(&path)?;
            return Ok(path);
        }
    }

    info!("No config file found, using empty config");
    set_config(AppConfig::default())?;
    default_config_paths()
        .into_iter()
        .next()
        .ok_or_else(|| MaskboxError::Config("no config directory available".to_string()))
}

/// Write the configuration to `path`, creating parent directories.
///
/// Must be called after the first-run account secret is minted: the
/// secret has to survive restarts or namespaces registered in an earlier
/// run can no longer be re-derived.
pub fn persist_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| MaskboxError::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MaskboxError::Config(format!("Failed to create config dir: {}", e)))?;
    }
    fs::write(path, content)
        .map_err(|e| MaskboxError::Config(format!("Failed to write config: {}", e)))?;

    info!("Saved configuration to: {:?}", path);
    Ok(())
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &PathBuf) -> Result<()> {
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .map_err(|e| MaskboxError::Config(format!("Failed to read config: {}", e)))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| MaskboxError::Config(format!("Failed to parse config: {}", e)))?;

    set_config(config)
}

/// Set the global configuration
pub fn set_config(config: AppConfig) -> Result<()> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock
                .write()
                .map_err(|e| MaskboxError::Config(format!("Failed to lock config: {}", e)))?;
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}

/// Get a snapshot of the current configuration
pub fn get_config() -> Result<AppConfig> {
    let lock = CONFIG
        .get()
        .ok_or_else(|| MaskboxError::Config("Configuration not initialized".to_string()))?;
    let guard = lock
        .read()
        .map_err(|e| MaskboxError::Config(format!("Failed to lock config: {}", e)))?;
    Ok(guard.clone())
}

/// Check if configuration is initialized
pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [account]
            mailbox_id = 7
            mail_domain = "telios.io"

            [relay]
            base_url = "https://relay.example"
            timeout_secs = 5
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.account.mailbox_id, 7);
        assert_eq!(config.account.mail_domain, "telios.io");
        assert_eq!(config.relay.timeout_secs, 5);
        assert!(config.storage.db_path.is_none());
    }

    #[test]
    fn test_account_secret_is_sticky() {
        let mut config = AppConfig::default();
        let first = config.account_secret();
        let second = config.account_secret();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_minted_secret_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maskbox").join("config.toml");

        let mut config = AppConfig::default();
        config.account.mail_domain = "telios.io".to_string();
        let secret = config.account_secret();
        persist_config(&config, &path).unwrap();

        // A fresh process reading the same file sees the same secret
        let reloaded: AppConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            reloaded.account.secret_box_priv_key.as_deref(),
            Some(secret.as_str())
        );
        assert_eq!(reloaded.account.mail_domain, "telios.io");
    }
}
