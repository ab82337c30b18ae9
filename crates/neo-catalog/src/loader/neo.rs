//! JPL small-body and merged JPL+MPCORB CSV loads.

use super::report::{ErrorCount, ErrorSample, ErrorTally, LoadStatus, TOP_ERRORS};
use crate::catalog::{AsteroidFields, ClassFields, IdentityResolver, OrbitElements};
use crate::error::Result;
use crate::ingest::{DelimitedReader, Record};
use crate::model::{LoadErrorRecord, MergePolicy, UpsertAction};
use crate::store::{CatalogStore, MPC_SEQUENCE_PREFIX};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Column layout of a JPL small-body export, used when a file has no header.
pub const DEFAULT_NEO_HEADER: [&str; 46] = [
    "id", "spkid", "full_name", "pdes", "name", "prefix", "neo", "pha", "h",
    "diameter", "albedo", "diameter_sigma", "orbit_id", "epoch", "epoch_mjd",
    "epoch_cal", "equinox", "e", "a", "q", "i", "om", "w", "ma", "ad", "n",
    "tp", "tp_cal", "per", "per_y", "moid", "moid_ld", "sigma_e", "sigma_a",
    "sigma_q", "sigma_i", "sigma_om", "sigma_w", "sigma_ma", "sigma_ad",
    "sigma_n", "sigma_tp", "sigma_per", "class", "rms", "class_description",
];

/// Column layout of a merged JPL+MPCORB export.
pub const DEFAULT_MERGED_HEADER: [&str; 72] = [
    "id", "spkid", "full_name", "pdes", "name", "prefix", "neo", "pha", "h",
    "diameter", "albedo", "diameter_sigma", "orbit_id", "epoch", "epoch_mjd",
    "epoch_cal", "equinox", "e", "a", "q", "i", "om", "w", "ma", "ad", "n",
    "tp", "tp_cal", "per", "per_y", "moid", "moid_ld", "sigma_e", "sigma_a",
    "sigma_q", "sigma_i", "sigma_om", "sigma_w", "sigma_ma", "sigma_ad",
    "sigma_n", "sigma_tp", "sigma_per", "class", "rms", "class_description",
    "abs_mag", "slope_param", "epoch_mpc", "mean_anomaly", "arg_perihelion",
    "long_asc_node", "inclination", "eccentricity", "mean_motion",
    "semi_major_axis", "uncertainty", "reference", "num_observations",
    "num_oppositions", "first_obs", "separator", "last_obs", "rms_residual",
    "coarse_perturbers", "precise_perturbers", "computer", "hex_flags",
    "designation_full", "last_obs_date", "orbit_type", "is_neo",
];

/// Columns whose presence makes a strict-mode row carry an orbit.
const ORBIT_EPOCH_COLUMNS: [&str; 3] = ["epoch_mjd", "epoch_cal", "tp_cal"];

/// Which export layout is being loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// JPL export: every row must carry `id` and `spkid`; rows overwrite.
    #[default]
    Neo,
    /// Merged JPL+MPCORB export: keys are optional; rows only fill gaps.
    Merged,
}

impl LoadMode {
    pub fn policy(self) -> MergePolicy {
        match self {
            LoadMode::Neo => MergePolicy::Overwrite,
            LoadMode::Merged => MergePolicy::FillMissing,
        }
    }

    pub fn fallback_header(self) -> &'static [&'static str] {
        match self {
            LoadMode::Neo => &DEFAULT_NEO_HEADER,
            LoadMode::Merged => &DEFAULT_MERGED_HEADER,
        }
    }
}

/// Summary of a CSV load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub run_id: String,
    pub source: String,
    pub mode: LoadMode,
    pub status: LoadStatus,
    pub rows_read: usize,
    pub asteroids_inserted: usize,
    pub asteroids_updated: usize,
    pub orbits_inserted: usize,
    pub orbits_updated: usize,
    pub orbits_skipped: usize,
    pub errors: usize,
    /// Merged mode: rows carrying neither `id` nor `spkid`.
    pub missing_keys: usize,
    pub error_samples: Vec<ErrorSample>,
    pub top_errors: Vec<ErrorCount>,
    pub duration_ms: u64,
}

impl LoadReport {
    fn new(source: &str, mode: LoadMode) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            mode,
            status: LoadStatus::Completed,
            rows_read: 0,
            asteroids_inserted: 0,
            asteroids_updated: 0,
            orbits_inserted: 0,
            orbits_updated: 0,
            orbits_skipped: 0,
            errors: 0,
            missing_keys: 0,
            error_samples: Vec::new(),
            top_errors: Vec::new(),
            duration_ms: 0,
        }
    }

    fn count_asteroid(&mut self, action: UpsertAction) {
        match action {
            UpsertAction::Inserted => self.asteroids_inserted += 1,
            UpsertAction::Updated => self.asteroids_updated += 1,
            UpsertAction::Skipped => {}
        }
    }

    fn count_orbit(&mut self, action: UpsertAction) {
        match action {
            UpsertAction::Inserted => self.orbits_inserted += 1,
            UpsertAction::Updated => self.orbits_updated += 1,
            UpsertAction::Skipped => self.orbits_skipped += 1,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

enum RowOutcome {
    Loaded,
    MissingKeys,
}

/// Per-run mutable state.
struct LoadContext {
    resolver: IdentityResolver,
    next_mpc: i64,
    report: LoadReport,
}

/// Loads a JPL (or merged) CSV export into the catalog.
#[derive(Debug, Clone)]
pub struct NeoLoader {
    mode: LoadMode,
    commit_every: usize,
    today: NaiveDate,
    cancel: Option<CancellationToken>,
}

impl NeoLoader {
    pub fn new(mode: LoadMode, commit_every: usize) -> Self {
        Self {
            mode,
            commit_every: commit_every.max(1),
            today: Local::now().date_naive(),
            cancel: None,
        }
    }

    /// Date used when a row yields no perihelion date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Load `text` (the decoded file) into `store`.
    ///
    /// Row failures are counted and written to `Load_Error`; only store
    /// failures outside a row (transactions, reference data) abort the load.
    pub async fn run<S>(&self, store: &mut S, text: &str, source_name: &str) -> Result<LoadReport>
    where
        S: CatalogStore + ?Sized,
    {
        let start = Instant::now();
        let reader = DelimitedReader::open(text, self.mode.fallback_header(), self.mode == LoadMode::Merged)?;
        info!(
            "Loading {} ({:?} mode, delimiter {:?}, {} columns{})",
            source_name,
            self.mode,
            reader.delimiter(),
            reader.header().len(),
            if reader.has_header() { "" } else { ", built-in header" }
        );

        store.begin().await?;
        store.ensure_reference_data().await?;
        let resolver = store.load_identities().await?;
        let next_mpc = match self.mode {
            LoadMode::Merged => store.next_mpc_sequence().await?,
            LoadMode::Neo => 0,
        };

        let mut ctx = LoadContext {
            resolver,
            next_mpc,
            report: LoadReport::new(source_name, self.mode),
        };
        let mut tally = ErrorTally::default();

        for record in reader.records() {
            if self.cancelled() {
                warn!("Load cancelled at line {}", record.line);
                ctx.report.status = LoadStatus::Cancelled;
                break;
            }
            ctx.report.rows_read += 1;

            match self.load_row(store, &record, &mut ctx).await {
                Ok(RowOutcome::Loaded) => {}
                Ok(RowOutcome::MissingKeys) => {
                    let message = "Missing id or spkid";
                    debug!("Line {}: {}", record.line, message);
                    tally.record(sample(&record, message));
                    self.log_row_error(store, source_name, &record, "Asteroid", message)
                        .await;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("Line {}: {}", record.line, message);
                    tally.record(sample(&record, &message));
                    let logged = format!("Unhandled error: {}", message);
                    self.log_row_error(store, source_name, &record, "Loader", &logged)
                        .await;
                }
            }

            if record.line % self.commit_every == 0 {
                store.commit().await?;
                store.begin().await?;
                debug!("Committed through line {}", record.line);
            }
        }

        store.commit().await?;

        let mut report = ctx.report;
        report.errors = tally.total();
        report.error_samples = tally.samples().to_vec();
        report.top_errors = tally.top(TOP_ERRORS);
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Load {:?}: {} rows, asteroids +{} ~{}, orbits +{} ~{} (skipped {}), {} errors",
            report.status,
            report.rows_read,
            report.asteroids_inserted,
            report.asteroids_updated,
            report.orbits_inserted,
            report.orbits_updated,
            report.orbits_skipped,
            report.errors
        );
        Ok(report)
    }

    async fn load_row<S>(&self, store: &mut S, record: &Record, ctx: &mut LoadContext) -> Result<RowOutcome>
    where
        S: CatalogStore + ?Sized,
    {
        let fields = AsteroidFields::from_record(record);
        let policy = self.mode.policy();

        if self.mode == LoadMode::Neo && !fields.has_keys() {
            return Ok(RowOutcome::MissingKeys);
        }
        if fields.neo_id.is_none() && fields.spkid.is_none() {
            ctx.report.missing_keys += 1;
        }

        let class = ClassFields::from_record(record);
        if let Some(class) = class.to_class() {
            store.ensure_class(&class).await?;
        }

        let id_internal = ctx
            .resolver
            .resolve(fields.neo_id.as_deref(), fields.spkid);

        if let Some(id) = id_internal {
            let mut asteroid = fields.into_asteroid(id);
            if self.mode == LoadMode::Neo {
                asteroid.absolute_magnitude = asteroid.absolute_magnitude.or(Some(0.0));
            }
            let action = store.upsert_asteroid(&asteroid, policy).await?;
            ctx.report.count_asteroid(action);
        }

        let orbit_id = match (self.mode, record.text("orbit_id")) {
            (LoadMode::Neo, Some(id)) if has_epoch_info(record) => id,
            (LoadMode::Neo, _) => return Ok(RowOutcome::Loaded),
            (LoadMode::Merged, Some(id)) => id,
            (LoadMode::Merged, None) => {
                let id = format!("{}{}", MPC_SEQUENCE_PREFIX, ctx.next_mpc);
                ctx.next_mpc += 1;
                id
            }
        };

        let orbit = OrbitElements::from_record(record, self.today).into_orbit(
            orbit_id,
            id_internal,
            &class.code,
        );
        let action = store.upsert_orbit(&orbit, policy).await?;
        if action == UpsertAction::Skipped {
            warn!(
                "Orbit {} belongs to another asteroid, line {} left it unchanged",
                orbit.orbit_id, record.line
            );
        }
        ctx.report.count_orbit(action);

        Ok(RowOutcome::Loaded)
    }

    async fn log_row_error<S>(
        &self,
        store: &mut S,
        source_name: &str,
        record: &Record,
        entity: &str,
        message: &str,
    ) where
        S: CatalogStore + ?Sized,
    {
        let entry = LoadErrorRecord {
            source_file: source_name.to_string(),
            row_number: record.line,
            entity: entity.to_string(),
            message: message.to_string(),
            raw_data: record.describe(),
        };
        if let Err(e) = store.record_load_error(&entry).await {
            warn!("Could not record load error for line {}: {}", record.line, e);
        }
    }
}

fn has_epoch_info(record: &Record) -> bool {
    ORBIT_EPOCH_COLUMNS
        .iter()
        .any(|col| !record.raw(col).trim().is_empty())
}

fn sample(record: &Record, message: &str) -> ErrorSample {
    ErrorSample {
        line: record.line,
        id: record.text("id"),
        spkid: record.text("spkid"),
        orbit_id: record.text("orbit_id"),
        message: message.to_string(),
    }
}
