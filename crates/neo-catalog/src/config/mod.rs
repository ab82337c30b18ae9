//! Configuration loading and validation.

mod legacy;
mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from a legacy connection file, with default
    /// loader and monitor settings.
    pub fn from_legacy_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::with_connection(ConnectionConfig::from_legacy_file(path)?);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the configuration to a YAML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}

impl ConnectionConfig {
    /// `host:port/database`, safe to log.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let config = Config::from_yaml("connection:\n  host: localhost\n  password: pw\n").unwrap();
        assert_eq!(config.connection.port, 1433);
        assert_eq!(config.connection.database, "NEOs");
        assert_eq!(config.connection.user, "sa");
        assert!(config.connection.trust_server_cert);
        assert_eq!(config.loader.commit_every, 1000);
        assert_eq!(config.loader.mpcorb_commit_every, 20_000);
        assert!(!config.loader.link_mpcorb_orbits);
        assert_eq!(config.monitor.trend_rows, 12);
    }

    #[test]
    fn test_yaml_validation_runs() {
        let err = Config::from_yaml("connection:\n  host: ''\n").unwrap_err();
        assert!(err.to_string().contains("connection.host"));
    }

    #[test]
    fn test_save_and_load() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::with_connection(ConnectionConfig {
            host: "srv".into(),
            ..ConnectionConfig::default()
        });
        config.loader.link_mpcorb_orbits = true;
        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_display_target_hides_password() {
        let conn = ConnectionConfig {
            host: "srv".into(),
            password: "secret".into(),
            ..ConnectionConfig::default()
        };
        assert_eq!(conn.display_target(), "srv:1433/NEOs");
    }
}
