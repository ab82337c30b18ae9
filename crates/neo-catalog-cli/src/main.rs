//! neo-catalog CLI - NEO catalog ingest, scripting and monitoring for SQL Server.

mod wizard;

use chrono::Local;
use clap::{Parser, Subcommand};
use neo_catalog::alerts::{self, AlertFilter, HighPriorityWatcher, NewAlert};
use neo_catalog::ingest::values::parse_datetime;
use neo_catalog::script::{self, ApplyOptions, ScriptInventory};
use neo_catalog::{
    health_check, read_text, CatalogError, Config, ConnectionConfig, LoadMode, MemoryStore,
    MonitorSnapshot, MpcorbLoader, MssqlPool, MssqlStore, NeoLoader,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "neo-catalog")]
#[command(about = "Near-Earth object catalog tooling for SQL Server")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "neo-catalog.yaml")]
    config: PathBuf,

    /// Read the connection from a legacy `key=value` file instead
    #[arg(long)]
    legacy_config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or edit a configuration file interactively
    Init {
        /// Output path for configuration file [default: neo-catalog.yaml]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite existing file without confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Test the database connection
    HealthCheck,

    /// Load a JPL small-body CSV export (or a merged JPL+MPCORB export)
    LoadNeo {
        /// CSV file to load
        csv: PathBuf,

        /// The file is a merged export: keys are optional and rows only fill gaps
        #[arg(long)]
        merged: bool,

        /// Load into memory only and report what would change
        #[arg(long)]
        dry_run: bool,
    },

    /// Load MPCORB orbits for asteroids already in the catalog
    LoadMpcorb {
        /// CSV file to load
        csv: PathBuf,

        /// Link rows to asteroids by designation (overrides the config)
        #[arg(long)]
        link: bool,

        /// Load into memory only and report what would change
        #[arg(long)]
        dry_run: bool,
    },

    /// Merge a CSV export into an SSMS-generated script
    GenerateSql {
        /// Script generated by SSMS (schema and data)
        #[arg(long)]
        template: PathBuf,

        /// Merged CSV export
        #[arg(long)]
        csv: PathBuf,

        /// Where to write the merged script
        #[arg(long)]
        output: PathBuf,
    },

    /// Run a script batch by batch against the server
    ApplyScript {
        /// Script to run
        script: PathBuf,

        /// Refuse to run when this database already exists
        #[arg(long)]
        fail_if_exists: Option<String>,
    },

    /// Count the catalog's tables, views, triggers and rows
    Verify {
        /// Also report objects this script creates that are missing
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// Show the catalog dashboard
    Monitor {
        /// Refresh every `monitor.refresh_seconds` until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Search asteroids and manage alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// List alerts, newest first
    List {
        /// Only alerts of this priority id
        #[arg(long)]
        priority: Option<i32>,

        /// Only alerts of this level id
        #[arg(long)]
        level: Option<i32>,
    },

    /// Find asteroids by designation, name or id
    Search {
        /// Text to look for
        term: String,
    },

    /// Create an alert for an asteroid
    Create {
        /// Internal id of the asteroid
        #[arg(long)]
        asteroid: i64,

        /// What triggered the alert
        #[arg(long)]
        criteria: String,

        /// Priority id
        #[arg(long)]
        priority: i32,

        /// Level id
        #[arg(long)]
        level: i32,

        /// Generation time, e.g. "2026-03-01 14:30" [default: now]
        #[arg(long)]
        generated_at: Option<String>,
    },

    /// Print new high-priority alerts as they appear
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CatalogError> {
    let cli = Cli::parse();

    // Handle init command separately (doesn't need existing config)
    if let Commands::Init { output, force } = cli.command {
        let output_path = output.unwrap_or_else(|| PathBuf::from("neo-catalog.yaml"));
        wizard::run_wizard(&output_path, force)
            .await
            .map_err(|e| CatalogError::Config(e.to_string()))?;
        return Ok(());
    }

    setup_logging(&cli.verbosity, &cli.log_format);

    // Script generation works on files only
    if let Commands::GenerateSql { template, csv, output } = &cli.command {
        let report = script::generate(template, csv, output, Local::now().date_naive())?;
        if cli.output_json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Script written to {}", report.output);
            println!("  Classes: {}", report.classes);
            println!("  Asteroids: {}", report.asteroids);
            println!("  Orbits: {}", report.orbits);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Init { .. } | Commands::GenerateSql { .. } => unreachable!(), // Handled above

        Commands::HealthCheck => {
            let result = health_check(&config.connection).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  SQL Server ({}): {} ({}ms)",
                    config.connection.display_target(),
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref version) = result.server_version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if !result.healthy() {
                return Err(CatalogError::Config("Health check failed".to_string()));
            }
        }

        Commands::LoadNeo { csv, merged, dry_run } => {
            let mode = if merged { LoadMode::Merged } else { LoadMode::Neo };
            let text = read_text(&csv)?;
            let source = source_name(&csv);
            let loader = NeoLoader::new(mode, config.loader.commit_every).with_cancel(cancel_token);

            let report = if dry_run {
                info!("Dry run: loading {} into memory", source);
                loader.run(&mut MemoryStore::new(), &text, &source).await?
            } else {
                let mut store = MssqlStore::connect(&config.connection).await?;
                loader.run(&mut store, &text, &source).await?
            };

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\n{}", if dry_run { "Dry run completed!" } else { "Load completed!" });
                println!("  Run ID: {}", report.run_id);
                println!("  Status: {:?}", report.status);
                println!("  Rows read: {}", report.rows_read);
                println!(
                    "  Asteroids: {} inserted, {} updated",
                    report.asteroids_inserted, report.asteroids_updated
                );
                println!(
                    "  Orbits: {} inserted, {} updated, {} skipped",
                    report.orbits_inserted, report.orbits_updated, report.orbits_skipped
                );
                if report.missing_keys > 0 {
                    println!("  Rows without id or spkid: {}", report.missing_keys);
                }
                println!("  Errors: {}", report.errors);
                for top in &report.top_errors {
                    println!("    {} x {}", top.count, top.message);
                }
                println!("  Duration: {:.2}s", report.duration_ms as f64 / 1000.0);
            }
        }

        Commands::LoadMpcorb { csv, link, dry_run } => {
            let text = read_text(&csv)?;
            let source = source_name(&csv);
            let loader = MpcorbLoader::new(
                link || config.loader.link_mpcorb_orbits,
                config.loader.mpcorb_commit_every,
            )
            .with_cancel(cancel_token);

            let report = if dry_run {
                info!("Dry run: loading {} into memory", source);
                loader.run(&mut MemoryStore::new(), &text, &source).await?
            } else {
                let mut store = MssqlStore::connect(&config.connection).await?;
                loader.run(&mut store, &text, &source).await?
            };

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else if !report.enabled {
                println!("MPCORB linking is disabled; nothing loaded.");
                println!("Pass --link or set loader.link_mpcorb_orbits to enable it.");
            } else {
                println!("\nMPCORB load completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Status: {:?}", report.status);
                println!("  Processed: {}", report.processed);
                println!("  Inserted: {}", report.inserted);
                println!("  Skipped (orbit exists): {}", report.skipped_exists);
                println!("  Skipped (no asteroid): {}", report.skipped_no_asteroid);
                println!("  Skipped (no designation): {}", report.skipped_bad_row);
                println!("  Errors: {}", report.errors);
                if report.discarded > 0 {
                    println!("  Rolled back inserts: {}", report.discarded);
                }
                println!("  Duration: {:.2}s", report.duration_ms as f64 / 1000.0);
            }
        }

        Commands::ApplyScript { script: path, fail_if_exists } => {
            let sql = script::read_script(&path)?;
            // The script creates the catalog database itself
            let server = ConnectionConfig {
                database: "master".to_string(),
                ..config.connection.clone()
            };
            let mut client = neo_catalog::db::connect(&server).await?;
            let options = ApplyOptions {
                fail_if_exists,
                cancel: Some(cancel_token),
            };
            let report = script::apply_script(&mut client, &sql, &options).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nScript applied!");
                println!("  Run ID: {}", report.run_id);
                println!("  Batches: {}/{}", report.batches_run, report.batches_total);
                println!("  Duration: {:.2}s", report.duration_ms as f64 / 1000.0);
            }
        }

        Commands::Verify { script: path } => {
            let inventory = match path {
                Some(p) => Some(ScriptInventory::from_script(&script::read_script(&p)?)),
                None => None,
            };
            let pool = MssqlPool::new(config.connection.clone()).await?;
            let mut conn = pool.get().await?;
            let report =
                script::verify_objects(&mut *conn, &config.connection.database, inventory.as_ref())
                    .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Database {}", report.database);
                println!("  Tables: {}", report.tables);
                println!("  Views: {}", report.views);
                println!("  Triggers: {}", report.triggers);
                for count in &report.row_counts {
                    println!("  {:<14} {:>10} rows", count.table, count.rows);
                }
                if inventory.is_some() {
                    if report.complete() {
                        println!("  All scripted objects present");
                    } else {
                        for missing in &report.missing {
                            println!("  Missing {:?}: {}", missing.kind, missing.name);
                        }
                    }
                }
            }

            if !report.complete() {
                return Err(CatalogError::Validation(format!(
                    "{} scripted objects are missing",
                    report.missing.len()
                )));
            }
        }

        Commands::Monitor { watch } => {
            let pool = MssqlPool::new(config.connection.clone()).await?;
            let refresh = Duration::from_secs(config.monitor.refresh_seconds);
            loop {
                let snapshot = {
                    let mut conn = pool.get().await?;
                    MonitorSnapshot::collect(&mut *conn, &config.monitor).await?
                };
                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                } else {
                    println!("{}", snapshot.render());
                }

                if !watch || !wait_or_cancel(&cancel_token, refresh).await {
                    break;
                }
            }
        }

        Commands::Alerts { command } => {
            run_alerts(command, &config, cli.output_json, cancel_token).await?;
        }
    }

    Ok(())
}

async fn run_alerts(
    command: AlertCommands,
    config: &Config,
    output_json: bool,
    cancel_token: CancellationToken,
) -> Result<(), CatalogError> {
    let pool = MssqlPool::new(config.connection.clone()).await?;
    let mut conn = pool.get().await?;

    match command {
        AlertCommands::List { priority, level } => {
            let rows = alerts::list_alerts(&mut *conn, &AlertFilter { priority, level }).await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{} alerts", rows.len());
                for row in &rows {
                    let when = row
                        .generated_at
                        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
                    println!(
                        "  #{:<6} {}  [{} / {}]  {}: {}",
                        row.id_alert, when, row.priority, row.level, row.asteroid, row.criteria
                    );
                }
            }
        }

        AlertCommands::Search { term } => {
            let matches = alerts::search_asteroids(&mut *conn, &term).await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else {
                if matches.len() as u32 >= alerts::SEARCH_LIMIT {
                    println!("Showing the first {} matches", alerts::SEARCH_LIMIT);
                }
                for m in &matches {
                    let spkid = m.spkid.map_or_else(|| "-".to_string(), |v| v.to_string());
                    let diameter = m.diameter.map_or_else(|| "-".to_string(), |v| format!("{:.3} km", v));
                    println!(
                        "  {:>8}  spkid {:<10} {:<32} NEO {} PHA {}  {}",
                        m.id_internal, spkid, m.full_name, m.neo_flag, m.pha_flag, diameter
                    );
                }
                if matches.is_empty() {
                    println!("No asteroid matches '{}'", term);
                }
            }
        }

        AlertCommands::Create {
            asteroid,
            criteria,
            priority,
            level,
            generated_at,
        } => {
            let generated_at = match generated_at {
                Some(raw) => Some(parse_datetime(&raw).ok_or_else(|| {
                    CatalogError::Validation(format!("unrecognised date/time '{}'", raw))
                })?),
                None => None,
            };
            let alert = NewAlert {
                id_internal: asteroid,
                criteria,
                priority,
                level,
                generated_at,
            };
            let id_alert = alerts::create_alert(&mut *conn, &alert).await?;
            if output_json {
                println!("{}", serde_json::json!({ "id_alert": id_alert }));
            } else {
                println!("Created alert {}", id_alert);
            }
        }

        AlertCommands::Watch => {
            let interval = Duration::from_secs(config.monitor.notify_interval_seconds);
            let mut watcher = HighPriorityWatcher::new();
            println!("Watching for high-priority alerts (Ctrl-C to stop)");
            loop {
                for notice in watcher.poll(&mut *conn).await? {
                    if output_json {
                        println!("{}", serde_json::to_string(&notice)?);
                    } else {
                        let when = notice
                            .generated_at
                            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
                        println!("HIGH PRIORITY alert #{} at {}: {}", notice.id_alert, when, notice.criteria);
                    }
                }
                if !wait_or_cancel(&cancel_token, interval).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Load the YAML config, or the legacy connection file when one was given.
fn load_config(cli: &Cli) -> Result<Config, CatalogError> {
    if let Some(ref legacy) = cli.legacy_config {
        let config = Config::from_legacy_file(legacy)?;
        info!("Loaded legacy connection file {:?}", legacy);
        return Ok(config);
    }
    if !cli.config.exists() {
        return Err(CatalogError::Config(format!(
            "Configuration file not found: {}. Run 'neo-catalog init' to create one",
            cli.config.display()
        )));
    }
    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    Ok(config)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sleep for `period`; false when cancelled first.
async fn wait_or_cancel(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Could not install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Finishing the current step...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Finishing the current step...");
        token.cancel();
    });

    cancel_token
}
