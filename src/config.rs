use hotppl_core::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// The `sync:` section with each endpoint value's source tracked
#[derive(Debug, Clone, Serialize)]
pub struct SyncSettings {
    pub server_url: ConfigValue<Option<String>>,
    pub hostname: ConfigValue<String>,
    pub secure: ConfigValue<bool>,
    pub port: ConfigValue<u16>,
    pub production_host: ConfigValue<String>,
    pub reconnect_base_ms: ConfigValue<u64>,
    pub max_reconnect_attempts: ConfigValue<u32>,
    pub heartbeat_interval_secs: ConfigValue<u64>,
    pub connect_timeout_secs: ConfigValue<u64>,
}

impl SyncSettings {
    fn new(defaults: SyncConfig, source: ConfigSource) -> Self {
        Self {
            server_url: ConfigValue::new(defaults.server_url, source.clone()),
            hostname: ConfigValue::new(defaults.hostname, source.clone()),
            secure: ConfigValue::new(defaults.secure, source.clone()),
            port: ConfigValue::new(defaults.port, source.clone()),
            production_host: ConfigValue::new(defaults.production_host, source.clone()),
            reconnect_base_ms: ConfigValue::new(defaults.reconnect_base_ms, source.clone()),
            max_reconnect_attempts: ConfigValue::new(
                defaults.max_reconnect_attempts,
                source.clone(),
            ),
            heartbeat_interval_secs: ConfigValue::new(
                defaults.heartbeat_interval_secs,
                source.clone(),
            ),
            connect_timeout_secs: ConfigValue::new(defaults.connect_timeout_secs, source),
        }
    }

    /// Plain client configuration with the sources dropped.
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            server_url: self.server_url.value.clone(),
            hostname: self.hostname.value.clone(),
            secure: self.secure.value,
            port: self.port.value,
            production_host: self.production_host.value.clone(),
            reconnect_base_ms: self.reconnect_base_ms.value,
            max_reconnect_attempts: self.max_reconnect_attempts.value,
            heartbeat_interval_secs: self.heartbeat_interval_secs.value,
            connect_timeout_secs: self.connect_timeout_secs.value,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncSettings,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    sync: Option<SyncFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncFile {
    server_url: Option<String>,
    hostname: Option<String>,
    secure: Option<bool>,
    port: Option<u16>,
    production_host: Option<String>,
    reconnect_base_ms: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    heartbeat_interval_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

fn from_file<T>(slot: &mut ConfigValue<T>, value: Option<T>) {
    if let Some(value) = value {
        *slot = ConfigValue::new(value, ConfigSource::File);
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut sync = SyncSettings::new(SyncConfig::default(), ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(file) = file_config.sync {
                if let Some(url) = file.server_url {
                    sync.server_url = ConfigValue::new(Some(url), ConfigSource::File);
                }
                from_file(&mut sync.hostname, file.hostname);
                from_file(&mut sync.secure, file.secure);
                from_file(&mut sync.port, file.port);
                from_file(&mut sync.production_host, file.production_host);
                from_file(&mut sync.reconnect_base_ms, file.reconnect_base_ms);
                from_file(&mut sync.max_reconnect_attempts, file.max_reconnect_attempts);
                from_file(&mut sync.heartbeat_interval_secs, file.heartbeat_interval_secs);
                from_file(&mut sync.connect_timeout_secs, file.connect_timeout_secs);
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("HOTPPL_SYNC_URL") {
            sync.server_url = ConfigValue::new(Some(url), ConfigSource::Environment);
        }
        if let Ok(hostname) = std::env::var("HOTPPL_HOSTNAME") {
            sync.hostname = ConfigValue::new(hostname, ConfigSource::Environment);
        }
        if let Ok(secure) = std::env::var("HOTPPL_SECURE") {
            sync.secure = ConfigValue::new(parse_flag(&secure), ConfigSource::Environment);
        }

        Ok(Self { config_file, sync })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/hotppl/
    /// - macOS: ~/Library/Application Support/hotppl/
    /// - Windows: %APPDATA%/hotppl/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hotppl")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
