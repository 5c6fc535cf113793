//! Application configuration management.
//!
//! Handles loading, saving, and accessing configuration for the engine:
//! server connection, account identity, storage, queue tuning, enforcement
//! tuning, and logging. Configuration is persisted as TOML on disk.
//!
//! Every behavioral constant the engine relies on (backoff bases and caps,
//! debounce windows, native-call timeouts) lives here as a field with a
//! serde default rather than a hard-coded literal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants;
use crate::error::{PlError, PlResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Account identity settings.
    #[serde(default)]
    pub account: AccountConfig,

    /// Durable storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-queue retry tuning.
    #[serde(default)]
    pub queues: QueuesConfig,

    /// PRAYLOCK enforcement tuning.
    #[serde(default)]
    pub enforcement: EnforcementConfig,

    /// Realtime subscription tuning.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API base address (e.g. "https://api.praylock.app").
    #[serde(default)]
    pub address: String,

    /// Bearer token used for every request.
    #[serde(default)]
    pub auth_token: String,

    /// Custom HTTP headers as key-value pairs.
    #[serde(default)]
    pub custom_headers: std::collections::HashMap<String, String>,

    /// API request timeout in milliseconds.
    #[serde(default = "default_api_timeout")]
    pub api_timeout_ms: u64,

    /// Whether to accept self-signed SSL certificates from the server.
    #[serde(default)]
    pub accept_self_signed_certs: bool,
}

/// Account identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// The signed-in user id all queues and subscriptions are keyed by.
    #[serde(default)]
    pub user_id: String,

    /// IANA timezone used for window arithmetic until a server anchor
    /// supplies one (e.g. "America/Chicago").
    #[serde(default)]
    pub timezone: String,
}

/// Durable storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Keyring service name under which secure entries are filed.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,

    /// Directory for the plaintext fallback store. If empty, uses the
    /// platform data directory.
    #[serde(default)]
    pub fallback_dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Retry tuning for a single queue kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTuning {
    /// Maximum retry attempts before an operation is abandoned.
    pub max_retries: u32,

    /// Maximum age in seconds before an operation is abandoned.
    pub max_age_secs: u64,

    /// Base backoff delay in seconds (doubles per retry).
    pub backoff_base_secs: u64,

    /// Backoff ceiling in seconds.
    pub backoff_cap_secs: u64,

    /// Cooldown between automatically triggered passes, in seconds.
    #[serde(default = "default_queue_cooldown")]
    pub trigger_cooldown_secs: u64,
}

impl QueueTuning {
    /// Backoff delay before retry attempt `n`: `min(cap, base * 2^n)`.
    ///
    /// Monotonically non-decreasing in `n`; later retries never wait
    /// less than earlier ones.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let base = self.backoff_base_secs.saturating_mul(1u64 << retry_count.min(32));
        Duration::from_secs(base.min(self.backoff_cap_secs))
    }

    /// Maximum age as a Duration.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Trigger cooldown as a Duration.
    pub fn trigger_cooldown(&self) -> Duration {
        Duration::from_secs(self.trigger_cooldown_secs)
    }
}

/// Per-queue retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// Prayer-completion queue tuning.
    #[serde(default = "default_completion_tuning")]
    pub completion: QueueTuning,

    /// Prayer-generation queue tuning.
    #[serde(default = "default_generation_tuning")]
    pub generation: QueueTuning,

    /// Engagement-marking queue tuning.
    #[serde(default = "default_engagement_tuning")]
    pub engagement: QueueTuning,

    /// Interval of the scheduler tick that drives waiting retries, in seconds.
    #[serde(default = "default_queue_tick")]
    pub tick_secs: u64,
}

/// PRAYLOCK enforcement tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// Debounce window for repeated foreground checks, in seconds.
    #[serde(default = "default_enforce_debounce")]
    pub debounce_secs: u64,

    /// Timeout raced against each native blocking call, in seconds.
    #[serde(default = "default_native_timeout")]
    pub native_call_timeout_secs: u64,

    /// Prefix for native monitoring activity names.
    #[serde(default = "default_activity_prefix")]
    pub activity_prefix: String,
}

impl EnforcementConfig {
    /// Debounce window as a Duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// Native call timeout as a Duration.
    pub fn native_call_timeout(&self) -> Duration {
        Duration::from_secs(self.native_call_timeout_secs)
    }
}

/// Realtime subscription tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base delay between reconnection attempts, in seconds.
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_secs: u64,

    /// Maximum delay cap for reconnection backoff, in seconds.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,

    /// Jitter factor (0.0 to 1.0) applied to each reconnect delay.
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

// Default value functions for serde

fn default_api_timeout() -> u64 {
    constants::DEFAULT_API_TIMEOUT_MS
}

fn default_keyring_service() -> String {
    "app.praylock.storage".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_cooldown() -> u64 {
    constants::DEFAULT_QUEUE_COOLDOWN_SECS
}

fn default_queue_tick() -> u64 {
    constants::DEFAULT_QUEUE_TICK_SECS
}

fn default_completion_tuning() -> QueueTuning {
    QueueTuning {
        max_retries: 5,
        max_age_secs: 7 * 24 * 3600,
        backoff_base_secs: 60,
        backoff_cap_secs: 3600,
        trigger_cooldown_secs: default_queue_cooldown(),
    }
}

fn default_generation_tuning() -> QueueTuning {
    QueueTuning {
        max_retries: 4,
        max_age_secs: 3600,
        backoff_base_secs: 30,
        backoff_cap_secs: 600,
        trigger_cooldown_secs: default_queue_cooldown(),
    }
}

fn default_engagement_tuning() -> QueueTuning {
    QueueTuning {
        max_retries: 5,
        max_age_secs: 7 * 24 * 3600,
        backoff_base_secs: 60,
        backoff_cap_secs: 1800,
        trigger_cooldown_secs: default_queue_cooldown(),
    }
}

fn default_enforce_debounce() -> u64 {
    constants::DEFAULT_ENFORCE_DEBOUNCE_SECS
}

fn default_native_timeout() -> u64 {
    constants::DEFAULT_NATIVE_CALL_TIMEOUT_SECS
}

fn default_activity_prefix() -> String {
    "praylock".to_string()
}

fn default_reconnect_base() -> u64 {
    1
}

fn default_reconnect_max() -> u64 {
    30
}

fn default_jitter() -> f64 {
    0.3
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            account: AccountConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            queues: QueuesConfig::default(),
            enforcement: EnforcementConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            auth_token: String::new(),
            custom_headers: std::collections::HashMap::new(),
            api_timeout_ms: default_api_timeout(),
            accept_self_signed_certs: false,
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            timezone: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            keyring_service: default_keyring_service(),
            fallback_dir: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            completion: default_completion_tuning(),
            generation: default_generation_tuning(),
            engagement: default_engagement_tuning(),
            tick_secs: default_queue_tick(),
        }
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_enforce_debounce(),
            native_call_timeout_secs: default_native_timeout(),
            activity_prefix: default_activity_prefix(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_base_secs: default_reconnect_base(),
            reconnect_max_secs: default_reconnect_max(),
            jitter_factor: default_jitter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> PlResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> PlResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> PlResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> PlResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PlError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PlResult<PathBuf> {
        let config_dir = Platform::config_dir()?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get the effective fallback-store directory, using the configured
    /// path or the platform default.
    pub fn effective_fallback_dir(&self) -> PlResult<PathBuf> {
        if self.storage.fallback_dir.is_empty() {
            let data_dir = Platform::data_dir()?;
            Ok(data_dir.join("store"))
        } else {
            Ok(PathBuf::from(&self.storage.fallback_dir))
        }
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> PlResult<PathBuf> {
        if self.logging.directory.is_empty() {
            let data_dir = Platform::data_dir()?;
            Ok(data_dir.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether the server connection is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.address.is_empty() && !self.server.auth_token.is_empty()
    }

    /// Sanitize and normalize a server address.
    ///
    /// Ensures the address has a scheme and strips trailing slashes.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
            format!("http://{trimmed}")
        } else {
            format!("https://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Thread-safe configuration holder for shared access across services.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Save the current configuration to disk.
    pub async fn save(&self) -> PlResult<()> {
        let config = self.inner.read().await;
        config.save_default()
    }
}
