//! MongoDB connection configuration.
//!
//! This module provides the `MongoDbConfig` struct, loaded from TOML and
//! validated before a client is ever built from it.

use super::AuthenticationConfig;
use crate::error::NoSqlError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration of the MongoDB service.
///
/// # Security
/// `Display` prints only the address and database. Credentials, when present,
/// live in [`AuthenticationConfig`], whose `Debug` output redacts secrets.
///
/// # Example
/// ```rust
/// use opensilex_nosql::config::MongoDbConfig;
///
/// let config = MongoDbConfig::new("localhost".to_string())
///     .with_port(27017)
///     .with_database("opensilex".to_string());
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDbConfig {
    /// MongoDB host address
    #[serde(default = "default_host")]
    pub host: String,
    /// MongoDB port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database used by the service
    #[serde(default = "default_database")]
    pub database: String,
    /// Maximum time to find a suitable server before failing an operation
    #[serde(default = "default_server_selection_timeout_ms")]
    pub server_selection_timeout_ms: u64,
    /// Socket connect timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound for a single administrative round trip (ping)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Connect directly to the host instead of discovering the topology
    #[serde(default)]
    pub direct_connection: Option<bool>,
    /// Expected replica set name
    #[serde(default)]
    pub replica_set: Option<String>,
    /// Credential strategy; `None` connects without authentication
    #[serde(default)]
    pub authentication: Option<AuthenticationConfig>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_database() -> String {
    "opensilex".to_string()
}

fn default_server_selection_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_read_timeout_ms() -> u64 {
    30_000
}

impl Default for MongoDbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            server_selection_timeout_ms: default_server_selection_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            direct_connection: None,
            replica_set: None,
            authentication: None,
        }
    }
}

impl std::fmt::Display for MongoDbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MongoDbConfig({}:{}/{})",
            self.host, self.port, self.database
        )
        // Intentionally omit the authentication section
    }
}

impl MongoDbConfig {
    /// Creates a new configuration with defaults for everything but the host.
    pub fn new(host: String) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    /// Parses a configuration from TOML text and validates it.
    ///
    /// # Errors
    /// Returns a configuration error if the text is not valid TOML, does not
    /// match the expected structure, or fails [`MongoDbConfig::validate`].
    pub fn from_toml_str(text: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| {
            NoSqlError::configuration(format!("Invalid MongoDB configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if its content is invalid.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            NoSqlError::io(
                format!("Failed to read configuration file {}", path.display()),
                e,
            )
        })?;
        Self::from_toml_str(&text)
    }

    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.trim().is_empty() {
            return Err(NoSqlError::configuration("host cannot be empty"));
        }

        if self.port == 0 {
            return Err(NoSqlError::configuration("port must be greater than 0"));
        }

        if self.database.trim().is_empty() {
            return Err(NoSqlError::configuration("database cannot be empty"));
        }

        if self.server_selection_timeout_ms == 0 {
            return Err(NoSqlError::configuration(
                "server_selection_timeout_ms must be greater than 0",
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(NoSqlError::configuration(
                "connect_timeout_ms must be greater than 0",
            ));
        }

        if self.read_timeout_ms == 0 {
            return Err(NoSqlError::configuration(
                "read_timeout_ms must be greater than 0",
            ));
        }

        if let Some(authentication) = &self.authentication {
            authentication.validate()?;
        }

        Ok(())
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = database;
        self
    }

    /// Builder method to set the server selection timeout.
    pub fn with_server_selection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.server_selection_timeout_ms = timeout_ms;
        self
    }

    /// Builder method to force a direct connection to the configured host.
    pub fn with_direct_connection(mut self, direct: bool) -> Self {
        self.direct_connection = Some(direct);
        self
    }

    /// Builder method to set the authentication strategy.
    pub fn with_authentication(mut self, authentication: AuthenticationConfig) -> Self {
        self.authentication = Some(authentication);
        self
    }

    /// Server selection timeout as a `Duration`.
    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_millis(self.server_selection_timeout_ms)
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
