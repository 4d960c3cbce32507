//! Configuration module for Matrixon
//!
//! Configuration is read from a TOML file (`[global]` table) and
//! `MATRIXON_`-prefixed environment variables, merged with figment.
//! Nested keys use a double underscore in the environment, e.g.
//! `MATRIXON_DATABASE__URL`.

use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{MatrixonError, Result};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server name (e.g., matrixon.local)
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Address to bind the client API to
    #[serde(default = "default_address")]
    pub address: IpAddr,

    /// Port to bind the client API to
    #[serde(default = "default_port")]
    pub port: u16,

    /// `EnvFilter` directive for tracing
    #[serde(default = "default_log")]
    pub log: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server_notices: ServerNoticesConfig,

    /// Statically provisioned devices, keyed by access token
    #[serde(default)]
    pub devices: Vec<StaticDevice>,

    /// Room memberships restored at startup
    #[serde(default)]
    pub memberships: Vec<StaticMembership>,
}

/// Storage backend for the pseudo-identity store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: DatabaseBackend,

    /// Database URL, e.g. `sqlite://matrixon.db` or `postgres://...`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Entries kept in each numeric-id LRU cache
    #[serde(default = "default_short_id_cache_capacity")]
    pub short_id_cache_capacity: usize,
}

/// Rooms users are not allowed to leave
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerNoticesConfig {
    #[serde(default)]
    pub room_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDevice {
    pub access_token: String,
    pub user_id: String,
    pub device_id: String,
}

/// A user joined to a room when the server starts.
///
/// Local users get their pseudo-identity claimed here. A remote user
/// brings the sender id they announced, as unpadded base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticMembership {
    pub room_id: String,
    pub user_id: String,
    #[serde(default)]
    pub sender_id: Option<String>,
}

fn default_server_name() -> String {
    "matrixon.local".to_owned()
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8008
}

fn default_log() -> String {
    "warn,matrixon=info".to_owned()
}

fn default_backend() -> DatabaseBackend {
    DatabaseBackend::Sqlite
}

fn default_database_url() -> String {
    "sqlite://matrixon-pseudoid.db".to_owned()
}

fn default_max_connections() -> u32 {
    16
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_short_id_cache_capacity() -> usize {
    100_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
            short_id_cache_capacity: default_short_id_cache_capacity(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            address: default_address(),
            port: default_port(),
            log: default_log(),
            database: DatabaseConfig::default(),
            server_notices: ServerNoticesConfig::default(),
            devices: Vec::new(),
            memberships: Vec::new(),
        }
    }
}

impl Config {
    /// Build the figment used to load configuration
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path).nested());
        }
        figment.merge(Env::prefixed("MATRIXON_").split("__").global())
    }

    /// Load and validate configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        debug!("🔧 Loading configuration from {:?}", path);
        let config: Config = Self::figment(path).extract()?;
        config.validate()?;
        info!("✅ Configuration loaded for {}", config.server_name);
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server_name.is_empty() {
            return Err(MatrixonError::InvalidConfig("Server name cannot be empty".into()));
        }
        if self.database.backend != DatabaseBackend::Memory && self.database.url.is_empty() {
            return Err(MatrixonError::InvalidConfig("Database URL cannot be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(MatrixonError::InvalidConfig(
                "database.max_connections must be at least 1".into(),
            ));
        }
        if self.database.short_id_cache_capacity == 0 {
            return Err(MatrixonError::InvalidConfig(
                "database.short_id_cache_capacity must be at least 1".into(),
            ));
        }
        for room_id in &self.server_notices.room_ids {
            ruma::RoomId::parse(room_id.as_str()).map_err(|e| {
                MatrixonError::InvalidConfig(format!("Invalid server notice room {room_id}: {e}"))
            })?;
        }
        for membership in &self.memberships {
            ruma::RoomId::parse(membership.room_id.as_str()).map_err(|e| {
                MatrixonError::InvalidConfig(format!("Invalid membership room {}: {e}", membership.room_id))
            })?;
            ruma::UserId::parse(membership.user_id.as_str()).map_err(|e| {
                MatrixonError::InvalidConfig(format!("Invalid membership user {}: {e}", membership.user_id))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_log::test;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_name, "matrixon.local");
        assert_eq!(config.port, 8008);
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert!(config.server_notices.room_ids.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server_name = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.url = String::new();
        assert!(config.validate().is_err());

        config.database.backend = DatabaseBackend::Memory;
        assert!(config.validate().is_ok());

        config.server_notices.room_ids = vec!["notices".to_owned()];
        assert!(matches!(config.validate(), Err(MatrixonError::InvalidConfig(_))));

        let mut config = Config::default();
        config.memberships = vec![StaticMembership {
            room_id: "!room:example.org".to_owned(),
            user_id: "alice".to_owned(),
            sender_id: None,
        }];
        assert!(matches!(config.validate(), Err(MatrixonError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_loads_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[global]
server_name = "example.org"
port = 9000

[global.database]
backend = "memory"

[global.server_notices]
room_ids = ["!notices:example.org"]

[[global.devices]]
access_token = "secret"
user_id = "@alice:example.org"
device_id = "ALICEDEVICE"

[[global.memberships]]
room_id = "!room:example.org"
user_id = "@alice:example.org"
"#
        )
        .unwrap();

        let config: Config = Config::figment(Some(file.path())).extract().unwrap();
        assert_eq!(config.server_name, "example.org");
        assert_eq!(config.port, 9000);
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.database.max_connections, 16);
        assert_eq!(config.server_notices.room_ids, vec!["!notices:example.org"]);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].device_id, "ALICEDEVICE");
        assert_eq!(config.memberships.len(), 1);
        assert!(config.memberships[0].sender_id.is_none());
    }
}
