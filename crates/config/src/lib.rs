//! Configuration loading, validation, and management for convmem.
//!
//! Loads configuration from `~/.convmem/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.convmem/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Window sizes and escalation triggers
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Volatile tier
    #[serde(default)]
    pub hot_store: HotStoreConfig,

    /// Persistent tier
    #[serde(default)]
    pub durable_store: DurableStoreConfig,

    /// LLM used for replies, summaries and point extraction
    #[serde(default)]
    pub provider: ProviderConfig,

    /// HTTP API
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// How many turns the recent buffer keeps.
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// How many of the newest turns form the short-term window.
    #[serde(default = "default_short_term_size")]
    pub short_term_size: usize,

    /// Regenerate the slider summary every N messages.
    #[serde(default = "default_summary_every")]
    pub summary_every: u64,

    /// Extract long-term points every N messages.
    #[serde(default = "default_long_term_every")]
    pub long_term_every: u64,

    /// Points per long-term batch.
    #[serde(default = "default_long_term_points")]
    pub long_term_points: usize,

    /// Upper bound for a single summarizer/extractor call.
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,

    /// Namespace for every hot-store key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_recent_capacity() -> usize {
    8
}
fn default_short_term_size() -> usize {
    4
}
fn default_summary_every() -> u64 {
    4
}
fn default_long_term_every() -> u64 {
    8
}
fn default_long_term_points() -> usize {
    5
}
fn default_collaborator_timeout() -> u64 {
    30
}
fn default_key_prefix() -> String {
    "convmem".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_capacity: default_recent_capacity(),
            short_term_size: default_short_term_size(),
            summary_every: default_summary_every(),
            long_term_every: default_long_term_every(),
            long_term_points: default_long_term_points(),
            collaborator_timeout_secs: default_collaborator_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotStoreConfig {
    /// "redis", "memory" or "none"
    #[serde(default = "default_hot_backend")]
    pub backend: String,

    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Use the in-process store when Redis cannot be reached at startup.
    #[serde(default = "default_true")]
    pub fallback_to_memory: bool,
}

fn default_hot_backend() -> String {
    "redis".into()
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".into()
}
fn default_true() -> bool {
    true
}

impl Default for HotStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_hot_backend(),
            url: default_redis_url(),
            fallback_to_memory: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableStoreConfig {
    /// "sqlite", "postgres" or "memory"
    #[serde(default = "default_durable_backend")]
    pub backend: String,

    /// SQLite path or PostgreSQL URL. Empty means `~/.convmem/memory.sqlite`.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_durable_backend() -> String {
    "sqlite".into()
}
fn default_max_connections() -> u32 {
    4
}

impl Default for DurableStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_durable_backend(),
            url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl DurableStoreConfig {
    /// The effective connection target.
    pub fn resolved_url(&self) -> String {
        if self.url.is_empty() {
            AppConfig::config_dir()
                .join("memory.sqlite")
                .to_string_lossy()
                .into_owned()
        } else {
            self.url.clone()
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_provider_timeout() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.convmem/config.toml).
    ///
    /// Environment variables override the file:
    /// - `CONVMEM_REDIS_URL`
    /// - `CONVMEM_DATABASE_URL`
    /// - `CONVMEM_API_KEY` (then `OPENAI_API_KEY`)
    /// - `CONVMEM_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("CONVMEM_REDIS_URL") {
            self.hot_store.url = url;
        }
        if let Some(url) = var("CONVMEM_DATABASE_URL") {
            if url.starts_with("postgres://") || url.starts_with("postgresql://") {
                self.durable_store.backend = "postgres".into();
            }
            self.durable_store.url = url;
        }
        if self.provider.api_key.is_none() {
            self.provider.api_key = var("CONVMEM_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(model) = var("CONVMEM_MODEL") {
            self.provider.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".convmem")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.memory;
        if m.recent_capacity == 0 || m.short_term_size == 0 || m.long_term_points == 0 {
            return Err(ConfigError::ValidationError(
                "memory window sizes and long_term_points must be > 0".into(),
            ));
        }
        if m.short_term_size > m.recent_capacity {
            return Err(ConfigError::ValidationError(
                "short_term_size must not exceed recent_capacity".into(),
            ));
        }
        if m.summary_every == 0 || m.long_term_every == 0 {
            return Err(ConfigError::ValidationError(
                "summary_every and long_term_every must be > 0".into(),
            ));
        }
        if m.collaborator_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "collaborator_timeout_secs must be > 0".into(),
            ));
        }

        if !matches!(self.hot_store.backend.as_str(), "redis" | "memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "unknown hot_store backend '{}'",
                self.hot_store.backend
            )));
        }
        if !matches!(
            self.durable_store.backend.as_str(),
            "sqlite" | "postgres" | "memory"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "unknown durable_store backend '{}'",
                self.durable_store.backend
            )));
        }

        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "unknown logging format '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.recent_capacity, 8);
        assert_eq!(config.memory.short_term_size, 4);
        assert_eq!(config.memory.summary_every, 4);
        assert_eq!(config.memory.long_term_every, 8);
        assert_eq!(config.memory.long_term_points, 5);
        assert_eq!(config.gateway.port, 8000);
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AppConfig::default_toml();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.hot_store.url, "redis://127.0.0.1:6379/0");
        assert_eq!(parsed.memory.key_prefix, "convmem");
    }

    #[test]
    fn window_larger_than_buffer_rejected() {
        let config = AppConfig {
            memory: MemoryConfig {
                short_term_size: 9,
                ..MemoryConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.hot_store.backend = "memcached".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.durable_store.backend, "sqlite");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[memory]
summary_every = 6

[hot_store]
backend = "memory"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.memory.summary_every, 6);
        assert_eq!(config.memory.long_term_every, 8);
        assert_eq!(config.hot_store.backend, "memory");
        assert!(config.hot_store.fallback_to_memory);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "memory = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CONVMEM_REDIS_URL", "redis://cache:6379/2"),
            ("CONVMEM_DATABASE_URL", "postgres://db/convmem"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CONVMEM_MODEL", "gpt-4o"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.hot_store.url, "redis://cache:6379/2");
        assert_eq!(config.durable_store.backend, "postgres");
        assert_eq!(config.durable_store.url, "postgres://db/convmem");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.provider.model, "gpt-4o");
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn empty_durable_url_resolves_under_config_dir() {
        let cfg = DurableStoreConfig::default();
        assert!(cfg.resolved_url().ends_with("memory.sqlite"));
    }
}
