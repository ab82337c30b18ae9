//! Reader for connection files written by older desktop tools.
//!
//! Three layouts exist in the wild: one value per line (server, port, user,
//! password, database), a flat JSON object, and `key=value` lines. Keys may
//! use the Portuguese labels shown by those tools.

use super::ConnectionConfig;
use crate::error::{CatalogError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Connection fields in the order used by the line-per-value layout.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RawConnection {
    server: String,
    port: String,
    user: String,
    password: String,
    database: String,
}

/// Map a label from a legacy file to a canonical field name.
fn canonical_key(key: &str) -> Option<&'static str> {
    match key.trim() {
        "Servidor" | "Servidor (IP/Nome)" | "server" | "host" => Some("server"),
        "Porta" | "Porta (opcional)" | "port" => Some("port"),
        "Utilizador" | "username" | "user" => Some("user"),
        "Password" | "password" | "pwd" => Some("password"),
        "Base de Dados" | "database" | "db" => Some("database"),
        _ => None,
    }
}

impl RawConnection {
    fn from_pairs<I, K, V>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut raw = RawConnection::default();
        let mut matched = false;
        for (key, value) in pairs {
            let Some(field) = canonical_key(key.as_ref()) else {
                continue;
            };
            matched = true;
            let value = value.into();
            match field {
                "server" => raw.server = value,
                "port" => raw.port = value,
                "user" => raw.user = value,
                "password" => raw.password = value,
                _ => raw.database = value,
            }
        }
        matched.then_some(raw)
    }

    fn into_config(self) -> Result<ConnectionConfig> {
        let mut port_text = self.port.trim().to_string();

        // "host,port" is the ODBC spelling of an explicit port.
        let host = match self.server.split_once(',') {
            Some((h, p)) => {
                if port_text.is_empty() {
                    port_text = p.trim().to_string();
                }
                h.trim().to_string()
            }
            None => self.server.trim().to_string(),
        };

        let defaults = ConnectionConfig::default();
        let port = if port_text.is_empty() {
            defaults.port
        } else {
            port_text.parse::<u16>().map_err(|_| {
                CatalogError::Config(format!("invalid port in legacy config: '{}'", port_text))
            })?
        };

        let user = self.user.trim();
        let database = self.database.trim();
        Ok(ConnectionConfig {
            host,
            port,
            user: if user.is_empty() { defaults.user } else { user.to_string() },
            password: self.password,
            database: if database.is_empty() {
                defaults.database
            } else {
                database.to_string()
            },
            ..defaults
        })
    }
}

/// Parse the one-value-per-line layout. Blank lines are kept so that an
/// empty port line does not shift the following values.
fn parse_lines(content: &str) -> Option<RawConnection> {
    let mut lines: Vec<&str> = content.lines().map(|l| l.trim_end_matches('\r')).collect();
    while lines.len() < 5 {
        lines.push("");
    }

    let raw = RawConnection {
        server: lines[0].trim().to_string(),
        port: lines[1].trim().to_string(),
        user: lines[2].trim().to_string(),
        password: lines[3].trim().to_string(),
        database: lines[4].trim().to_string(),
    };

    if raw.server.is_empty() || raw.user.is_empty() || raw.database.is_empty() {
        return None;
    }
    // A key=value or JSON file also has a non-empty first line; reject those.
    if raw.server.starts_with('{') || raw.server.contains('=') {
        return None;
    }
    Some(raw)
}

fn parse_json(content: &str) -> Option<RawConnection> {
    let text = content.trim();
    if !(text.starts_with('{') && text.ends_with('}')) {
        return None;
    }
    let map: HashMap<String, serde_json::Value> = serde_json::from_str(text).ok()?;
    RawConnection::from_pairs(map.into_iter().map(|(k, v)| {
        let value = match v {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        (k, value)
    }))
}

fn parse_key_values(content: &str) -> Option<RawConnection> {
    RawConnection::from_pairs(content.lines().filter_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        Some((k.trim().to_string(), v.trim().to_string()))
    }))
}

impl ConnectionConfig {
    /// Read a legacy connection file.
    pub fn from_legacy_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let content = String::from_utf8_lossy(&bytes);
        Self::from_legacy_str(&content).map_err(|e| match e {
            CatalogError::Config(msg) => {
                CatalogError::Config(format!("{} ({})", msg, path.as_ref().display()))
            }
            other => other,
        })
    }

    /// Parse legacy connection content, trying each known layout in turn.
    pub fn from_legacy_str(content: &str) -> Result<Self> {
        let content = content.trim_start_matches('\u{feff}');
        if let Some(raw) = parse_lines(content) {
            debug!("Legacy config read as one value per line");
            return raw.into_config();
        }
        if let Some(raw) = parse_json(content) {
            debug!("Legacy config read as JSON");
            return raw.into_config();
        }
        if let Some(raw) = parse_key_values(content) {
            debug!("Legacy config read as key=value");
            return raw.into_config();
        }
        Err(CatalogError::Config(
            "unrecognized legacy connection file".to_string(),
        ))
    }
}
