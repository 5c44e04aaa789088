//! Service configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::filter::Directive;

use crate::model::windows::PanelId;

/// Logging output format
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Logging {
    /// Additional filtering directives
    #[serde(default, deserialize_with = "Logging::deserialize_filters")]
    pub filters: Vec<Directive>,

    /// Logging format
    #[serde(default)]
    pub format: LogFormat,
}

impl Logging {
    fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<Directive>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let dirs: Vec<String> = Deserialize::deserialize(deserializer)?;
        dirs.into_iter()
            .map(|dir| dir.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Database {
    /// In-memory database, lost on restart. Served over a single connection.
    Memory,
    /// SQLite file database
    SqLite {
        path: PathBuf,
        #[serde(default = "Database::default_max_connections")]
        max_connections: u32,
        /// Run migrations on startup
        #[serde(default)]
        migrate: bool,
    },
}

impl Database {
    fn default_max_connections() -> u32 {
        1
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::Memory
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Auth {
    /// How long a session stays valid
    pub session_ttl_hours: u64,

    /// Reports both unknown user and wrong password as `InvalidCredentials`
    pub unify_credential_errors: bool,

    /// Marks the session cookie as `Secure`
    pub secure_cookie: bool,
}

impl Auth {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours.saturating_mul(60 * 60))
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
            unify_credential_errors: false,
            secure_cookie: false,
        }
    }
}

/// Panels configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Panels {
    /// Panels the client can open. Empty list allows any well-formed panel id.
    pub known: Vec<PanelId>,
}

/// Top level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address where to host the service
    #[serde(default = "Config::default_host")]
    pub host: SocketAddr,

    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,

    /// Database configuration
    #[serde(default)]
    pub db: Database,

    /// Authentication configuration
    #[serde(default)]
    pub auth: Auth,

    /// Panels configuration
    #[serde(default)]
    pub panels: Panels,

    /// How often expired sessions are removed
    #[serde(default = "Config::default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Config {
    fn default_host() -> SocketAddr {
        ([127, 0, 0, 1], 3030).into()
    }

    fn default_cleanup_interval_secs() -> u64 {
        300
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
