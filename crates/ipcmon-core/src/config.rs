//! Configuration resolution for ipcmon.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/ipcmon/settings.json`)
//! 3. Explicit config file (`--config <path>`)
//! 4. Environment variables (`IPCMON_*`)
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete ipcmon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cookie: CookieConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub password_reset: PasswordResetConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Externally visible base URL, used to build avatar links.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
            public_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    /// Session lifetime in days.
    pub age_days: u32,
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "session_id".to_string(),
            age_days: 30,
            secure: false,
        }
    }
}

impl CookieConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.age_days).saturating_mul(24 * 60 * 60))
    }
}

/// One-time confirmation code configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub code_length: usize,
    pub attempts: u32,
    pub ttl_minutes: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            attempts: 3,
            ttl_minutes: 10,
        }
    }
}

impl VerificationConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

/// Password reset token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordResetConfig {
    pub jwt_secret: String,
    pub ttl_minutes: u64,
}

impl Default for PasswordResetConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me".to_string(),
            ttl_minutes: 15,
        }
    }
}

impl PasswordResetConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

/// Device claiming and streaming session timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Lifetime of an unredeemed claim token (seconds).
    pub claim_ttl_secs: u64,
    /// Delay between reconnect notices while waiting for approval (seconds).
    pub reconnect_interval_secs: u64,
    /// Give up waiting for approval after this long (seconds).
    pub reconnect_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            claim_ttl_secs: 3600,
            reconnect_interval_secs: 5,
            reconnect_timeout_secs: 120,
        }
    }
}

impl ProvisioningConfig {
    pub const fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }

    pub const fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub const fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }
}

/// Object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store.
    pub root: Option<PathBuf>,
    pub max_size_mb: u64,
    pub uploads_folder: String,
    pub presets_folder: String,
    pub default_avatar: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_size_mb: 10,
            uploads_folder: "uploads".to_string(),
            presets_folder: "presets".to_string(),
            default_avatar: "default.webp".to_string(),
        }
    }
}

impl StorageConfig {
    pub const fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub sender: String,
    pub queue_capacity: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender: "noreply@ipcmon.local".to_string(),
            queue_capacity: 256,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    if let Some(path) = explicit {
        let file = load_config_file(path)?;
        merge_config(&mut config, file);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ipcmon").join("settings.json"))
}

/// Default location of the server database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ipcmon").join("ipcmon.db"))
}

/// Default root of the filesystem object store.
pub fn default_storage_root() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ipcmon").join("objects"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.server = overlay.server;
    if overlay.database.path.is_some() {
        base.database.path = overlay.database.path;
    }
    base.cookie = overlay.cookie;
    base.verification = overlay.verification;
    base.password_reset = overlay.password_reset;
    base.provisioning = overlay.provisioning;
    if overlay.storage.root.is_some() {
        base.storage.root = overlay.storage.root;
    }
    base.storage.max_size_mb = overlay.storage.max_size_mb;
    base.storage.uploads_folder = overlay.storage.uploads_folder;
    base.storage.presets_folder = overlay.storage.presets_folder;
    base.storage.default_avatar = overlay.storage.default_avatar;
    base.mail = overlay.mail;
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("IPCMON_ADDR") {
        config.server.addr = val;
    }
    if let Some(val) = var("IPCMON_PUBLIC_URL") {
        config.server.public_url = val;
    }
    if let Some(val) = var("IPCMON_DB_PATH") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("IPCMON_JWT_SECRET") {
        config.password_reset.jwt_secret = val;
    }
    if let Some(n) = var("IPCMON_COOKIE_AGE_DAYS").and_then(|v| v.parse().ok()) {
        config.cookie.age_days = n;
    }
    if let Some(n) = var("IPCMON_VERIFICATION_ATTEMPTS").and_then(|v| v.parse().ok()) {
        config.verification.attempts = n;
    }
    if let Some(val) = var("IPCMON_STORAGE_ROOT") {
        config.storage.root = Some(PathBuf::from(val));
    }
    if let Some(n) = var("IPCMON_MAX_UPLOAD_MB").and_then(|v| v.parse().ok()) {
        config.storage.max_size_mb = n;
    }
}
