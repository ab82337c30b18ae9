//! # neo-catalog
//!
//! Tooling for the `NEOs` near-Earth object catalog on SQL Server.
//!
//! The library covers the catalog's whole life cycle:
//!
//! - **Ingest** of JPL small-body exports, merged JPL+MPCORB exports and
//!   MPCORB exports, with per-row error logging to `Load_Error`
//! - **Script generation** that merges a CSV export into an SSMS-generated
//!   `.sql` script so the database can be versioned as text
//! - **Restore** of such a script batch by batch, and verification of the
//!   tables, views and triggers it creates
//! - **Monitoring** counts, alert statistics and trends
//! - **Alerts** search, creation, listing and high-priority notifications
//!
//! ## Example
//!
//! ```rust,no_run
//! use neo_catalog::{read_text, Config, LoadMode, MssqlStore, NeoLoader};
//!
//! #[tokio::main]
//! async fn main() -> neo_catalog::Result<()> {
//!     let config = Config::load("neo-catalog.yaml")?;
//!     let mut store = MssqlStore::connect(&config.connection).await?;
//!     let text = read_text("neo.csv")?;
//!     let report = NeoLoader::new(LoadMode::Neo, config.loader.commit_every)
//!         .run(&mut store, &text, "neo.csv")
//!         .await?;
//!     println!("Inserted {} asteroids", report.asteroids_inserted);
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod astro;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod model;
pub mod monitor;
pub mod script;
pub mod store;

// Re-exports for convenient access
pub use alerts::{AlertFilter, AlertRow, HighPriorityWatcher, NewAlert, ReferenceData};
pub use config::{Config, ConnectionConfig, LoaderConfig, MonitorConfig};
pub use db::{health_check, HealthCheckResult, MssqlClient, MssqlPool};
pub use error::{CatalogError, Result};
pub use ingest::read_text;
pub use loader::{LoadMode, LoadReport, LoadStatus, MpcorbLoader, MpcorbReport, NeoLoader};
pub use monitor::MonitorSnapshot;
pub use script::{ApplyOptions, ApplyReport, GenerateReport, ScriptInventory, VerifyReport};
pub use store::{CatalogStore, MemoryStore, MssqlStore};
