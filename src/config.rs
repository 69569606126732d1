//! # Configuration Management
//!
//! Centralized configuration for the mailbox server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides (`MAILBOX_*` variables)
//!
//! The listening port has one more source: a one-line port file next to the
//! process (`myport.info` by default). When that file is missing or does not
//! hold a valid port, the configured port (1357 unless overridden) is used.

use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{warn, Level};

/// Current supported protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Port used when no port file is present
pub const DEFAULT_PORT: u16 = 1357;

/// Default port file, relative to the working directory
pub const DEFAULT_PORT_FILE: &str = "myport.info";

/// Max allowed payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default path of the SQLite database
pub const DEFAULT_DB_PATH: &str = "mailbox.db";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ServerError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override fields from `MAILBOX_*` environment variables.
    ///
    /// Unparseable numeric or enum values are rejected rather than ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("MAILBOX_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("MAILBOX_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ServerError::Config(format!("Invalid MAILBOX_PORT: '{port}'")))?;
        }

        if let Ok(port_file) = std::env::var("MAILBOX_PORT_FILE") {
            self.server.port_file = Some(PathBuf::from(port_file));
        }

        if let Ok(path) = std::env::var("MAILBOX_DB_PATH") {
            self.store.path = PathBuf::from(path);
        }

        if let Ok(backend) = std::env::var("MAILBOX_STORE") {
            self.store.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "sqlite" => StoreBackend::Sqlite,
                _ => {
                    return Err(ServerError::Config(format!(
                        "Invalid MAILBOX_STORE: '{backend}' (expected 'memory' or 'sqlite')"
                    )))
                }
            };
        }

        if let Ok(level) = std::env::var("MAILBOX_LOG_LEVEL") {
            self.logging.log_level = level
                .parse()
                .map_err(|_| ServerError::Config(format!("Invalid MAILBOX_LOG_LEVEL: '{level}'")))?;
        }

        Ok(())
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

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.store.validate());
        errors.extend(self.transport.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServerError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g., "0.0.0.0")
    pub host: String,

    /// Port used when the port file is absent or unreadable
    pub port: u16,

    /// File holding the port to listen on; `None` disables the lookup
    pub port_file: Option<PathBuf>,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Close the connection after a domain or store failure
    pub close_on_error: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: DEFAULT_PORT,
            port_file: Some(PathBuf::from(DEFAULT_PORT_FILE)),
            max_connections: 1000,
            shutdown_timeout: Duration::from_secs(5),
            close_on_error: true,
        }
    }
}

impl ServerConfig {
    /// Port from the port file if it holds one, otherwise the configured port.
    pub fn resolve_port(&self) -> u16 {
        let Some(path) = &self.port_file else {
            return self.port;
        };

        match fs::read_to_string(path) {
            Ok(contents) => match contents.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    warn!(path = %path.display(), "Port file does not hold a valid port, using {}", self.port);
                    self.port
                }
            },
            Err(_) => {
                warn!(path = %path.display(), "Port file not found, using {}", self.port);
                self.port
            }
        }
    }

    /// `host:port` with the port resolved through the port file
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.resolve_port())
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Server host cannot be empty".to_string());
        } else if format!("{}:{}", self.host, self.port)
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            errors.push(format!(
                "Invalid server host: '{}' (expected an IP address such as '0.0.0.0')",
                self.host
            ));
        }

        if let Some(path) = &self.port_file {
            if path.as_os_str().is_empty() {
                errors.push("Port file path cannot be empty (omit it to disable)".to_string());
            }
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

/// Which mailbox backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Database file (SQLite backend only)
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            ..Self::default()
        }
    }

    pub fn sqlite<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: path.into(),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.backend == StoreBackend::Sqlite {
            if self.path.as_os_str().is_empty() {
                errors.push("Database path cannot be empty for the sqlite backend".to_string());
            } else if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    errors.push(format!(
                        "Database directory does not exist: {}",
                        parent.display()
                    ));
                }
            }
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum allowed payload size in bytes
    pub max_payload_size: usize,

    /// Initial capacity of each connection's read buffer
    pub read_buffer_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            read_buffer_capacity: 4096,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > u32::MAX as usize {
            errors.push(format!(
                "Max payload size too large: {} bytes (the size field is 32 bits)",
                self.max_payload_size
            ));
        }

        if self.read_buffer_capacity == 0 {
            errors.push("Read buffer capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG` when set
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
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
