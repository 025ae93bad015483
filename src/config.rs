//! # Configuration Management
//!
//! Centralized configuration for the realm protocol library.
//!
//! Structured configuration for servers, clients, the credential cache, and
//! logging, including addresses, timeouts, and capacity limits.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Credential cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REALM_PROTOCOL_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("REALM_PROTOCOL_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(limit) = std::env::var("REALM_PROTOCOL_MAX_CONNECTIONS") {
            if let Ok(val) = limit.parse::<usize>() {
                config.server.max_connections = val;
            }
        }

        if let Ok(path) = std::env::var("REALM_PROTOCOL_CACHE_SNAPSHOT") {
            config.cache.snapshot_path = path;
        }

        if let Ok(window) = std::env::var("REALM_PROTOCOL_CACHE_EXPIRATION_SECS") {
            if let Ok(val) = window.parse::<u64>() {
                config.cache.sliding_expiration = Duration::from_secs(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.cache.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server listen address (e.g., "127.0.0.1:9000")
    pub address: String,

    /// Grace period announced in the server's goodbye frame
    #[serde(with = "duration_serde")]
    pub goodbye_timeout: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            goodbye_timeout: timeout::SERVER_GOODBYE_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:8080')",
                self.address
            ));
        }

        if self.goodbye_timeout.as_secs() < 1 {
            errors.push("Goodbye timeout too short (minimum: 1s)".to_string());
        } else if self.goodbye_timeout.as_secs() > 600 {
            errors.push("Goodbye timeout too long (maximum: 600s)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target server address
    pub address: String,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Timeout for waiting for handshake responses
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,

    /// Grace period announced in the client's goodbye frame
    #[serde(with = "duration_serde")]
    pub goodbye_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            response_timeout: Duration::from_secs(30),
            goodbye_timeout: timeout::CLIENT_GOODBYE_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid client address format: '{}' (expected format: 'example.com:8080')",
                self.address
            ));
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if self.response_timeout.as_millis() < 100 {
            errors.push("Response timeout too short (minimum: 100ms)".to_string());
        }

        if self.goodbye_timeout.as_secs() < 1 {
            errors.push("Goodbye timeout too short (minimum: 1s)".to_string());
        }

        errors
    }
}

/// Credential cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot file path
    pub snapshot_path: String,

    /// Maximum number of cached credential entries
    pub max_entries: usize,

    /// Sliding inactivity window after which an entry expires
    #[serde(with = "duration_serde")]
    pub sliding_expiration: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_path: String::from("credentials.snapshot"),
            max_entries: 10_000,
            sliding_expiration: Duration::from_secs(30 * 60),
        }
    }
}

impl CacheConfig {
    /// Validate cache configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_entries == 0 {
            errors.push("Cache max entries must be greater than 0".to_string());
        }

        if self.sliding_expiration.as_secs() < 1 {
            errors.push("Cache sliding expiration too short (minimum: 1s)".to_string());
        }

        if self.snapshot_path.is_empty() {
            errors.push("Cache snapshot path cannot be empty".to_string());
        } else if let Some(parent) = Path::new(&self.snapshot_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                errors.push(format!(
                    "Cache snapshot directory does not exist: {}",
                    parent.display()
                ));
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("realm-protocol"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(NetworkConfig::default().validate().is_empty());
    }

    #[test]
    fn toml_roundtrip() {
        let config = NetworkConfig::default_with_overrides(|c| {
            c.server.address = "0.0.0.0:7777".into();
            c.cache.max_entries = 128;
            c.logging.log_level = Level::DEBUG;
        });
        let toml_text = toml::to_string_pretty(&config).unwrap();
        let parsed = NetworkConfig::from_toml(&toml_text).unwrap();
        assert_eq!(parsed.server.address, "0.0.0.0:7777");
        assert_eq!(parsed.cache.max_entries, 128);
        assert_eq!(parsed.logging.log_level, Level::DEBUG);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let parsed = NetworkConfig::from_toml("[server]\naddress = \"127.0.0.1:4000\"\n").unwrap();
        assert_eq!(parsed.server.address, "127.0.0.1:4000");
        // Unset fields in a present section fall back to their defaults.
        assert_eq!(
            parsed.server.max_connections,
            ServerConfig::default().max_connections
        );
        assert_eq!(
            parsed.server.goodbye_timeout,
            ServerConfig::default().goodbye_timeout
        );
        // Absent sections are fully defaulted.
        assert_eq!(parsed.cache.max_entries, CacheConfig::default().max_entries);
        assert_eq!(parsed.logging.log_level, LoggingConfig::default().log_level);
    }

    #[test]
    fn bad_address_flagged() {
        let config = NetworkConfig::default_with_overrides(|c| {
            c.server.address = "not-an-address".into();
        });
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn zero_cache_capacity_flagged() {
        let config = NetworkConfig::default_with_overrides(|c| {
            c.cache.max_entries = 0;
        });
        assert!(!config.validate().is_empty());
    }
}
