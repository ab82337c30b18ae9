//! Interactive configuration wizard for creating/editing config files.

use dialoguer::{Confirm, Input, Password, Select};
use neo_catalog::{health_check, Config, ConnectionConfig, LoaderConfig, MonitorConfig};
use std::path::Path;
use thiserror::Error;

/// Result type for wizard operations.
pub type WizardResult<T> = Result<T, WizardError>;

/// Ways the wizard can stop before a configuration is saved.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Configuration cancelled")]
    Cancelled,

    /// Writing the configuration file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The terminal prompt could not be read
    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// The answers do not form a valid configuration
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExistingFileAction {
    Edit,
    Overwrite,
    Abort,
}

/// Run the configuration wizard.
pub async fn run_wizard(output: &Path, force: bool) -> WizardResult<()> {
    println!();
    println!("NEO Catalog - Configuration Wizard");
    println!("==================================");
    println!();

    let existing = if output.exists() && !force {
        match prompt_existing_file_action(output)? {
            ExistingFileAction::Edit => {
                println!("Loading existing configuration...");
                match Config::load(output) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        println!("Warning: Could not parse existing file: {}", e);
                        println!("Starting with fresh configuration.\n");
                        None
                    }
                }
            }
            ExistingFileAction::Overwrite => {
                println!("Starting with fresh configuration.\n");
                None
            }
            ExistingFileAction::Abort => return Err(WizardError::Cancelled),
        }
    } else {
        None
    };

    let connection = prompt_connection(existing.as_ref().map(|c| &c.connection))?;
    let loader = prompt_loader(existing.as_ref().map(|c| &c.loader))?;
    let monitor = prompt_monitor(existing.as_ref().map(|c| &c.monitor))?;

    let config = Config {
        connection,
        loader,
        monitor,
    };

    config
        .validate()
        .map_err(|e| WizardError::Validation(e.to_string()))?;

    print_summary(&config);

    if prompt_confirm("Test the database connection?", false)? {
        test_connection(&config.connection).await;
    }

    if !prompt_confirm(&format!("Save to {}?", output.display()), true)? {
        return Err(WizardError::Cancelled);
    }

    write_config(&config, output)?;

    println!("\nConfiguration saved to {}", output.display());
    println!("Run 'neo-catalog health-check' to test it.");

    Ok(())
}

fn prompt_existing_file_action(path: &Path) -> WizardResult<ExistingFileAction> {
    println!("File already exists: {}\n", path.display());

    let options = &["Edit existing configuration", "Overwrite with new", "Abort"];
    let selection = Select::new()
        .with_prompt("What would you like to do?")
        .items(options)
        .default(0)
        .interact()?;

    Ok(match selection {
        0 => ExistingFileAction::Edit,
        1 => ExistingFileAction::Overwrite,
        _ => ExistingFileAction::Abort,
    })
}

fn prompt_connection(existing: Option<&ConnectionConfig>) -> WizardResult<ConnectionConfig> {
    println!("SQL Server Connection");
    println!("---------------------");
    let defaults = existing.cloned().unwrap_or_default();

    let host: String = Input::new()
        .with_prompt("  Host")
        .default(if defaults.host.is_empty() {
            "localhost".to_string()
        } else {
            defaults.host.clone()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("  Port")
        .default(defaults.port)
        .interact_text()?;

    let database: String = Input::new()
        .with_prompt("  Database")
        .default(defaults.database.clone())
        .interact_text()?;

    let user: String = Input::new()
        .with_prompt("  User")
        .default(defaults.user.clone())
        .interact_text()?;

    let password = prompt_password("  Password", existing.is_some())?;
    let password = if password.is_empty() {
        defaults.password.clone()
    } else {
        password
    };

    let encrypt = Confirm::new()
        .with_prompt("  Encrypt connection")
        .default(defaults.encrypt)
        .interact()?;

    let trust_server_cert = Confirm::new()
        .with_prompt("  Trust server certificate")
        .default(defaults.trust_server_cert)
        .interact()?;

    println!();

    Ok(ConnectionConfig {
        host,
        port,
        database,
        user,
        password,
        encrypt,
        trust_server_cert,
    })
}

fn prompt_loader(existing: Option<&LoaderConfig>) -> WizardResult<LoaderConfig> {
    println!("Loading");
    println!("-------");
    let defaults = existing.cloned().unwrap_or_default();

    let commit_every: usize = Input::new()
        .with_prompt("  Commit CSV loads every N lines")
        .default(defaults.commit_every)
        .interact_text()?;

    let mpcorb_commit_every: usize = Input::new()
        .with_prompt("  Commit MPCORB loads every N orbits")
        .default(defaults.mpcorb_commit_every)
        .interact_text()?;

    let link_mpcorb_orbits = Confirm::new()
        .with_prompt("  Link MPCORB orbits to asteroids by designation")
        .default(defaults.link_mpcorb_orbits)
        .interact()?;

    println!();

    Ok(LoaderConfig {
        commit_every,
        mpcorb_commit_every,
        link_mpcorb_orbits,
    })
}

fn prompt_monitor(existing: Option<&MonitorConfig>) -> WizardResult<MonitorConfig> {
    println!("Monitoring");
    println!("----------");
    let defaults = existing.cloned().unwrap_or_default();

    let refresh_seconds: u64 = Input::new()
        .with_prompt("  Dashboard refresh (seconds)")
        .default(defaults.refresh_seconds)
        .interact_text()?;

    let notify_interval_seconds: u64 = Input::new()
        .with_prompt("  High-priority alert poll (seconds)")
        .default(defaults.notify_interval_seconds)
        .interact_text()?;

    println!();

    Ok(MonitorConfig {
        refresh_seconds,
        notify_interval_seconds,
        ..defaults
    })
}

fn prompt_password(prompt: &str, has_existing: bool) -> WizardResult<String> {
    if has_existing {
        let input: String = Password::new()
            .with_prompt(format!("{} (blank to keep existing)", prompt))
            .allow_empty_password(true)
            .interact()?;
        Ok(input)
    } else {
        let input: String = Password::new().with_prompt(prompt).interact()?;
        Ok(input)
    }
}

fn prompt_confirm(prompt: &str, default: bool) -> WizardResult<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(default).interact()?)
}

fn print_summary(config: &Config) {
    println!("Configuration Summary");
    println!("---------------------");
    println!(
        "  Server: {}@{}",
        config.connection.user,
        config.connection.display_target()
    );
    println!(
        "  Commits: every {} lines (CSV), every {} orbits (MPCORB)",
        config.loader.commit_every, config.loader.mpcorb_commit_every
    );
    println!(
        "  MPCORB linking: {}",
        if config.loader.link_mpcorb_orbits { "on" } else { "off" }
    );
    println!(
        "  Monitor: refresh {}s, alert poll {}s",
        config.monitor.refresh_seconds, config.monitor.notify_interval_seconds
    );
    println!();
}

async fn test_connection(connection: &ConnectionConfig) {
    use std::time::Duration;
    use tokio::time::timeout;

    println!("\nTesting connection...");

    match timeout(Duration::from_secs(30), health_check(connection)).await {
        Ok(result) => {
            println!(
                "  SQL Server: {} ({}ms)",
                if result.connected { "OK" } else { "FAILED" },
                result.latency_ms
            );
            if let Some(ref err) = result.error {
                println!("    Error: {}", err);
            }
        }
        Err(_) => println!("  Connection timed out after 30 seconds"),
    }

    println!();
}

fn write_config(config: &Config, path: &Path) -> WizardResult<()> {
    let header = "# NEO catalog configuration\n# Generated by neo-catalog init\n\n";
    let yaml = config
        .to_yaml()
        .map_err(|e| WizardError::Config(e.to_string()))?;

    std::fs::write(path, format!("{}{}", header, yaml))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neo-catalog.yaml");
        let config = Config::with_connection(ConnectionConfig {
            host: "db.example".into(),
            password: "secret".into(),
            ..Default::default()
        });

        write_config(&config, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# NEO catalog configuration\n"));
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_write_config_into_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_connection(ConnectionConfig {
            host: "db.example".into(),
            ..Default::default()
        });
        let err = write_config(&config, &dir.path().join("absent").join("c.yaml")).unwrap_err();
        assert!(matches!(err, WizardError::Io(_)));
        assert!(err.to_string().starts_with("IO error: "));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(WizardError::Cancelled.to_string(), "Configuration cancelled");
        assert_eq!(
            WizardError::Validation("connection.host is required".into()).to_string(),
            "Validation error: connection.host is required"
        );
    }
}
