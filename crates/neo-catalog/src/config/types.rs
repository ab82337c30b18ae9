//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQL Server connection holding the NEO catalog.
    pub connection: ConnectionConfig,

    /// Ingest behavior.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Monitoring and alert polling.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Wrap a connection with default loader and monitor settings.
    pub fn with_connection(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            loader: LoaderConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// SQL Server connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host name or IP.
    pub host: String,

    /// Server port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name (default: "NEOs").
    #[serde(default = "default_database")]
    pub database: String,

    /// SQL authentication user (default: "sa").
    #[serde(default = "default_user")]
    pub user: String,

    /// SQL authentication password.
    #[serde(default)]
    pub password: String,

    /// Require an encrypted connection (default: false).
    #[serde(default)]
    pub encrypt: bool,

    /// Trust the server certificate without validation (default: true).
    #[serde(default = "default_true")]
    pub trust_server_cert: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mssql_port(),
            database: default_database(),
            user: default_user(),
            password: String::new(),
            encrypt: false,
            trust_server_cert: true,
        }
    }
}

/// Ingest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Commit the NEO CSV transaction every N input lines (default: 1000).
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,

    /// Commit the MPCORB transaction every N inserted orbits (default: 20000).
    #[serde(default = "default_mpcorb_commit_every")]
    pub mpcorb_commit_every: usize,

    /// Allow MPCORB rows to be linked to asteroids by designation (default: false).
    #[serde(default)]
    pub link_mpcorb_orbits: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            commit_every: default_commit_every(),
            mpcorb_commit_every: default_mpcorb_commit_every(),
            link_mpcorb_orbits: false,
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between dashboard refreshes in watch mode (default: 30).
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,

    /// Seconds between high-priority alert polls (default: 15).
    #[serde(default = "default_notify_interval_seconds")]
    pub notify_interval_seconds: u64,

    /// Rows shown in the RMS trend and discovery tables (default: 12).
    #[serde(default = "default_trend_rows")]
    pub trend_rows: u32,

    /// Rows shown in the latest-asteroids table (default: 10).
    #[serde(default = "default_latest_rows")]
    pub latest_rows: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: default_refresh_seconds(),
            notify_interval_seconds: default_notify_interval_seconds(),
            trend_rows: default_trend_rows(),
            latest_rows: default_latest_rows(),
        }
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_database() -> String {
    "NEOs".to_string()
}

fn default_user() -> String {
    "sa".to_string()
}

fn default_true() -> bool {
    true
}

fn default_commit_every() -> usize {
    1000
}

fn default_mpcorb_commit_every() -> usize {
    20_000
}

fn default_refresh_seconds() -> u64 {
    30
}

fn default_notify_interval_seconds() -> u64 {
    15
}

fn default_trend_rows() -> u32 {
    12
}

fn default_latest_rows() -> u32 {
    10
}
