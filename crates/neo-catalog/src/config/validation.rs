//! Configuration validation.

use super::Config;
use crate::error::{CatalogError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;
    if conn.host.trim().is_empty() {
        return Err(CatalogError::Config("connection.host is required".into()));
    }
    if conn.database.trim().is_empty() {
        return Err(CatalogError::Config("connection.database is required".into()));
    }
    if conn.user.trim().is_empty() {
        return Err(CatalogError::Config("connection.user is required".into()));
    }
    if conn.port == 0 {
        return Err(CatalogError::Config("connection.port must be non-zero".into()));
    }

    if config.loader.commit_every == 0 {
        return Err(CatalogError::Config(
            "loader.commit_every must be at least 1".into(),
        ));
    }
    if config.loader.mpcorb_commit_every == 0 {
        return Err(CatalogError::Config(
            "loader.mpcorb_commit_every must be at least 1".into(),
        ));
    }

    if config.monitor.refresh_seconds == 0 {
        return Err(CatalogError::Config(
            "monitor.refresh_seconds must be at least 1".into(),
        ));
    }
    if config.monitor.notify_interval_seconds == 0 {
        return Err(CatalogError::Config(
            "monitor.notify_interval_seconds must be at least 1".into(),
        ));
    }

    Ok(())
}
