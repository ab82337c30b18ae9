//! SQL Server connectivity.

use crate::config::ConnectionConfig;
use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// A single tiberius connection over tokio TCP.
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Translate connection settings into a tiberius config.
pub fn build_config(cfg: &ConnectionConfig) -> Config {
    let mut config = Config::new();
    config.host(&cfg.host);
    config.port(cfg.port);
    config.database(&cfg.database);
    config.authentication(AuthMethod::sql_server(&cfg.user, &cfg.password));

    if cfg.encrypt {
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::NotSupported);
    }
    if cfg.trust_server_cert {
        config.trust_cert();
    }

    config
}

async fn open(config: Config) -> std::result::Result<MssqlClient, tiberius::error::Error> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| tiberius::error::Error::Io {
            kind: e.kind(),
            message: e.to_string(),
        })?;

    tcp.set_nodelay(true).ok();

    Client::connect(config, tcp.compat_write()).await
}

/// Open a dedicated connection (used for transactional loads and restores).
pub async fn connect(cfg: &ConnectionConfig) -> Result<MssqlClient> {
    debug!("Connecting to {}", cfg.display_target());
    let client = open(build_config(cfg)).await?;
    info!("Connected to SQL Server: {}", cfg.display_target());
    Ok(client)
}

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: ConnectionConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = MssqlClient;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        open(build_config(&self.config)).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Result of probing the configured server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub connected: bool,
    pub database: String,
    pub latency_ms: u64,
    pub server_version: Option<String>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy(&self) -> bool {
        self.connected && self.error.is_none()
    }
}

/// Pooled connections for the read-mostly tools (monitor, alerts, verify).
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    config: ConnectionConfig,
}

impl MssqlPool {
    /// Create a pool with a small default size.
    pub async fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_max_connections(config, 4).await
    }

    pub async fn with_max_connections(config: ConnectionConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .await
            .map_err(|e| CatalogError::pool(e, "creating SQL Server pool"))?;

        // Test connection
        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| CatalogError::pool(e, "testing SQL Server connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to SQL Server: {} (pool_size={})",
            config.display_target(),
            max_size
        );

        Ok(Self { pool, config })
    }

    /// Get a pooled connection.
    pub async fn get(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CatalogError::pool(e, "getting SQL Server connection"))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

/// Connect, ask for the server version and report how long it took.
///
/// Never fails: connection problems are reported in the result.
pub async fn health_check(cfg: &ConnectionConfig) -> HealthCheckResult {
    let start = Instant::now();
    let query_version = async {
        let mut client = open(build_config(cfg)).await?;
        let row = client.simple_query("SELECT @@VERSION").await?.into_row().await?;
        let version = row
            .and_then(|r| r.try_get::<&str, _>(0).ok().flatten().map(str::to_string))
            .map(|v| v.lines().next().unwrap_or_default().trim().to_string());
        Ok::<_, tiberius::error::Error>(version)
    };

    let outcome = query_version.await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(server_version) => HealthCheckResult {
            connected: true,
            database: cfg.database.clone(),
            latency_ms,
            server_version,
            error: None,
        },
        Err(e) => HealthCheckResult {
            connected: false,
            database: cfg.database.clone(),
            latency_ms,
            server_version: None,
            error: Some(e.to_string()),
        },
    }
}

/// Quote an identifier with brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Run a parameterized query and collect the first result set.
pub async fn query_rows(
    client: &mut MssqlClient,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Row>> {
    Ok(client.query(sql, params).await?.into_first_result().await?)
}

/// First column of the first row as `i64`. The query must yield BIGINT.
pub async fn query_i64(
    client: &mut MssqlClient,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Option<i64>> {
    let rows = query_rows(client, sql, params).await?;
    match rows.first() {
        Some(row) => Ok(row.try_get::<i64, _>(0)?),
        None => Ok(None),
    }
}

/// Whether a user table exists in the current database.
pub async fn table_exists(client: &mut MssqlClient, name: &str) -> Result<bool> {
    let rows = query_rows(client, "SELECT 1 FROM sys.tables WHERE name = @P1", &[&name]).await?;
    Ok(!rows.is_empty())
}

/// Whether a table, view or sequence of that name exists.
pub async fn object_exists(client: &mut MssqlClient, name: &str) -> Result<bool> {
    let rows = query_rows(
        client,
        "SELECT 1 FROM sys.objects WHERE name = @P1",
        &[&name],
    )
    .await?;
    Ok(!rows.is_empty())
}
