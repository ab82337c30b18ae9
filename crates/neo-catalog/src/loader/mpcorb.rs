//! MPCORB export loads.
//!
//! MPCORB rows carry no JPL keys, so an orbit is attached to an asteroid only
//! through its designation. That link is unreliable for provisional
//! designations, which is why the load must be switched on explicitly.

use super::report::LoadStatus;
use crate::catalog::fields::mpcorb_class;
use crate::catalog::OrbitElements;
use crate::error::Result;
use crate::ingest::{Record, WrappedReader, WrappedRow};
use crate::model::{MergePolicy, UpsertAction};
use crate::store::CatalogStore;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prefix of orbit ids minted for MPCORB rows.
pub const MPCORB_ORBIT_PREFIX: &str = "MPC:";

/// Summary of an MPCORB load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpcorbReport {
    pub run_id: String,
    pub source: String,
    pub status: LoadStatus,
    /// False when linking was not enabled and nothing was read.
    pub enabled: bool,
    pub processed: usize,
    pub inserted: usize,
    pub skipped_exists: usize,
    pub skipped_no_asteroid: usize,
    pub skipped_bad_row: usize,
    pub errors: usize,
    /// Inserts lost to a rollback after a failing row.
    pub discarded: usize,
    pub duration_ms: u64,
}

impl MpcorbReport {
    fn new(source: &str, enabled: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            status: LoadStatus::Completed,
            enabled,
            processed: 0,
            inserted: 0,
            skipped_exists: 0,
            skipped_no_asteroid: 0,
            skipped_bad_row: 0,
            errors: 0,
            discarded: 0,
            duration_ms: 0,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

enum RowOutcome {
    Inserted,
    Exists,
    NoAsteroid,
    NoDesignation,
}

/// Designations to try against `Asteroid.pdes`: as written, then without
/// leading zeros (`00001` is stored as `1`).
pub fn pdes_candidates(designation: &str) -> Vec<String> {
    let mut candidates = vec![designation.to_string()];
    if let Ok(number) = designation.parse::<i64>() {
        let plain = number.to_string();
        if plain != designation {
            candidates.push(plain);
        }
    }
    candidates
}

/// Loads MPCORB rows as orbits of already known asteroids.
#[derive(Debug, Clone)]
pub struct MpcorbLoader {
    link_orbits: bool,
    commit_every: usize,
    today: NaiveDate,
    cancel: Option<CancellationToken>,
}

impl MpcorbLoader {
    pub fn new(link_orbits: bool, commit_every: usize) -> Self {
        Self {
            link_orbits,
            commit_every: commit_every.max(1),
            today: Local::now().date_naive(),
            cancel: None,
        }
    }

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

    pub async fn run<S>(&self, store: &mut S, text: &str, source_name: &str) -> Result<MpcorbReport>
    where
        S: CatalogStore + ?Sized,
    {
        let start = Instant::now();
        if !self.link_orbits {
            warn!("MPCORB load disabled: orbits can only be linked to asteroids by designation, enable linking to proceed");
            return Ok(MpcorbReport::new(source_name, false));
        }

        let mut report = MpcorbReport::new(source_name, true);
        let reader = match WrappedReader::open(text) {
            Some(reader) => reader,
            None => {
                warn!("{} has no header, nothing to load", source_name);
                return Ok(report);
            }
        };
        info!("Loading MPCORB export {} ({} columns)", source_name, reader.header().len());

        store.begin().await?;
        let mut pending = 0usize;

        for row in reader.rows() {
            if self.cancelled() {
                warn!("MPCORB load cancelled after {} rows", report.processed);
                report.status = LoadStatus::Cancelled;
                break;
            }
            let record = match row {
                WrappedRow::Record(record) => record,
                WrappedRow::Bad(line) => {
                    debug!("Field count mismatch: {}", line);
                    report.skipped_bad_row += 1;
                    continue;
                }
            };
            report.processed += 1;

            match self.load_row(store, &record).await {
                Ok(RowOutcome::Inserted) => {
                    report.inserted += 1;
                    pending += 1;
                    if report.inserted % self.commit_every == 0 {
                        store.commit().await?;
                        store.begin().await?;
                        pending = 0;
                        debug!("Committed {} MPCORB orbits", report.inserted);
                    }
                }
                Ok(RowOutcome::Exists) => report.skipped_exists += 1,
                Ok(RowOutcome::NoAsteroid) => report.skipped_no_asteroid += 1,
                Ok(RowOutcome::NoDesignation) => report.skipped_bad_row += 1,
                Err(e) => {
                    report.errors += 1;
                    report.discarded += pending;
                    pending = 0;
                    warn!(
                        "MPCORB row {} (designation={}) failed: {}",
                        record.line,
                        record.raw("designation").trim(),
                        e
                    );
                    store.rollback().await?;
                    store.begin().await?;
                }
            }
        }

        store.commit().await?;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "MPCORB {:?}: {} processed, {} inserted ({} discarded), skipped {} existing, {} without asteroid, {} bad rows, {} errors",
            report.status,
            report.processed,
            report.inserted,
            report.discarded,
            report.skipped_exists,
            report.skipped_no_asteroid,
            report.skipped_bad_row,
            report.errors
        );
        Ok(report)
    }

    async fn load_row<S>(&self, store: &mut S, record: &Record) -> Result<RowOutcome>
    where
        S: CatalogStore + ?Sized,
    {
        let designation = record.raw("designation").trim();
        if designation.is_empty() {
            return Ok(RowOutcome::NoDesignation);
        }

        let orbit_id = format!("{}{}", MPCORB_ORBIT_PREFIX, designation);
        if store.orbit_exists(&orbit_id).await? {
            return Ok(RowOutcome::Exists);
        }

        let mut id_internal = None;
        for pdes in pdes_candidates(designation) {
            id_internal = store.find_asteroid_by_pdes(&pdes).await?;
            if id_internal.is_some() {
                break;
            }
        }
        let Some(id_internal) = id_internal else {
            return Ok(RowOutcome::NoAsteroid);
        };

        let class = mpcorb_class(record);
        store.ensure_class(&class).await?;

        let orbit = OrbitElements::from_mpcorb(record, self.today).into_orbit(
            orbit_id,
            Some(id_internal),
            &class.code,
        );
        match store.upsert_orbit(&orbit, MergePolicy::Overwrite).await? {
            UpsertAction::Inserted => Ok(RowOutcome::Inserted),
            _ => Ok(RowOutcome::Exists),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IdentityResolver;
    use crate::error::CatalogError;
    use crate::model::{Asteroid, LoadErrorRecord, Orbit, OrbitalClass};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    fn asteroid(id: i64, pdes: &str) -> Asteroid {
        Asteroid {
            id_internal: id,
            spkid: Some(2_000_000 + id),
            neo_id: Some(format!("a{:07}", id)),
            full_name: format!("({}) Test", pdes),
            pdes: pdes.to_string(),
            name: None,
            prefix: String::new(),
            neo_flag: "Y".into(),
            pha_flag: "N".into(),
            diameter: None,
            absolute_magnitude: Some(15.0),
            albedo: None,
            diameter_sigma: None,
        }
    }

    const MPCORB_CSV: &str = "\
designation,abs_mag,slope_param,epoch,mean_anomaly,arg_perihelion,long_asc_node,inclination,eccentricity,mean_motion,semi_major_axis,uncertainty,orbit_type
00433,10.4,0.46,K25BL,100.0,178.9,304.3,10.83,0.2229,0.5597,1.458,0,Amor
2024 AB,20.1,0.15,K25BL,10.0,1.0,2.0,3.0,0.4,0.9,1.1,5,
99999,18.0,0.15,K25BL,10.0,1.0,2.0,3.0,0.4,0.9,1.1,5,Apollo
broken,row
,1,1,K25BL,1,1,1,1,0.1,1,1,1,Apollo
";

    #[test]
    fn test_pdes_candidates() {
        assert_eq!(pdes_candidates("00001"), vec!["00001", "1"]);
        assert_eq!(pdes_candidates("433"), vec!["433"]);
        assert_eq!(pdes_candidates("2024 AB"), vec!["2024 AB"]);
    }

    #[tokio::test]
    async fn test_disabled_without_linking() {
        let mut store = MemoryStore::new().with_asteroid(asteroid(1, "433"));
        let report = MpcorbLoader::new(false, 100)
            .run(&mut store, MPCORB_CSV, "mpcorb.csv")
            .await
            .unwrap();
        assert!(!report.enabled);
        assert_eq!(report.processed, 0);
        assert_eq!(store.orbits().count(), 0);
    }

    #[tokio::test]
    async fn test_links_by_designation_and_counts_skips() {
        let mut store = MemoryStore::new()
            .with_asteroid(asteroid(1, "433"))
            .with_asteroid(asteroid(2, "2024 AB"));
        let report = MpcorbLoader::new(true, 100)
            .with_today(today())
            .run(&mut store, MPCORB_CSV, "mpcorb.csv")
            .await
            .unwrap();

        assert!(report.enabled);
        assert_eq!(report.processed, 4);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_no_asteroid, 1);
        assert_eq!(report.skipped_bad_row, 2);
        assert_eq!(report.errors, 0);

        let eros = store.orbit("MPC:00433").unwrap();
        assert_eq!(eros.id_internal, Some(1));
        assert_eq!(eros.class, "Amor");
        assert_eq!(eros.epoch_cal, NaiveDate::from_ymd_opt(2025, 11, 21));
        assert_eq!(eros.equinox, "J2000");
        assert_eq!(eros.orbit_uncertainty, Some(0));

        let provisional = store.orbit("MPC:2024 AB").unwrap();
        assert_eq!(provisional.class, "UNK");
        assert!(store.classes().contains_key("UNK"));
    }

    #[tokio::test]
    async fn test_existing_orbits_are_skipped_on_reload() {
        let mut store = MemoryStore::new().with_asteroid(asteroid(1, "433"));
        let loader = MpcorbLoader::new(true, 100).with_today(today());
        loader.run(&mut store, MPCORB_CSV, "mpcorb.csv").await.unwrap();
        let second = loader.run(&mut store, MPCORB_CSV, "mpcorb.csv").await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_exists, 1);
    }

    #[tokio::test]
    async fn test_commits_by_inserted_count() {
        let mut store = MemoryStore::new()
            .with_asteroid(asteroid(1, "433"))
            .with_asteroid(asteroid(2, "2024 AB"));
        MpcorbLoader::new(true, 1)
            .with_today(today())
            .run(&mut store, MPCORB_CSV, "mpcorb.csv")
            .await
            .unwrap();
        // one commit per insert plus the final one
        assert_eq!(store.commits(), 3);
    }

    /// Memory store whose orbit upsert fails for one orbit id.
    struct FailingOrbitStore {
        inner: MemoryStore,
        fail_on: &'static str,
    }

    #[async_trait]
    impl CatalogStore for FailingOrbitStore {
        async fn begin(&mut self) -> Result<()> {
            self.inner.begin().await
        }

        async fn commit(&mut self) -> Result<()> {
            self.inner.commit().await
        }

        async fn rollback(&mut self) -> Result<()> {
            self.inner.rollback().await
        }

        async fn ensure_reference_data(&mut self) -> Result<()> {
            self.inner.ensure_reference_data().await
        }

        async fn load_identities(&mut self) -> Result<IdentityResolver> {
            self.inner.load_identities().await
        }

        async fn next_mpc_sequence(&mut self) -> Result<i64> {
            self.inner.next_mpc_sequence().await
        }

        async fn ensure_class(&mut self, class: &OrbitalClass) -> Result<bool> {
            self.inner.ensure_class(class).await
        }

        async fn upsert_asteroid(
            &mut self,
            asteroid: &Asteroid,
            policy: MergePolicy,
        ) -> Result<UpsertAction> {
            self.inner.upsert_asteroid(asteroid, policy).await
        }

        async fn upsert_orbit(&mut self, orbit: &Orbit, policy: MergePolicy) -> Result<UpsertAction> {
            if orbit.orbit_id == self.fail_on {
                return Err(CatalogError::load("Orbit", "arithmetic overflow converting float"));
            }
            self.inner.upsert_orbit(orbit, policy).await
        }

        async fn orbit_exists(&mut self, orbit_id: &str) -> Result<bool> {
            self.inner.orbit_exists(orbit_id).await
        }

        async fn find_asteroid_by_pdes(&mut self, pdes: &str) -> Result<Option<i64>> {
            self.inner.find_asteroid_by_pdes(pdes).await
        }

        async fn record_load_error(&mut self, record: &LoadErrorRecord) -> Result<()> {
            self.inner.record_load_error(record).await
        }
    }

    #[tokio::test]
    async fn test_failing_row_rolls_back_pending_inserts() {
        let csv = "\
designation,abs_mag,slope_param,epoch,mean_anomaly,arg_perihelion,long_asc_node,inclination,eccentricity,mean_motion,semi_major_axis,uncertainty,orbit_type
00433,10.4,0.46,K25BL,100.0,178.9,304.3,10.83,0.2229,0.5597,1.458,0,Amor
2024 AB,20.1,0.15,K25BL,10.0,1.0,2.0,3.0,0.4,0.9,1.1,5,
99999,18.0,0.15,K25BL,10.0,1.0,2.0,3.0,0.4,0.9,1.1,5,Apollo
00004,3.2,0.32,K25BL,20.0,150.0,103.8,7.1,0.09,0.27,2.36,0,Main Belt
";
        let mut store = FailingOrbitStore {
            inner: MemoryStore::new()
                .with_asteroid(asteroid(1, "433"))
                .with_asteroid(asteroid(2, "2024 AB"))
                .with_asteroid(asteroid(3, "99999"))
                .with_asteroid(asteroid(4, "4")),
            fail_on: "MPC:99999",
        };

        let report = MpcorbLoader::new(true, 100)
            .with_today(today())
            .run(&mut store, csv, "mpcorb.csv")
            .await
            .unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.errors, 1);
        assert_eq!(report.discarded, 2);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.status, LoadStatus::Completed);

        let inner = &store.inner;
        assert!(inner.orbit("MPC:00433").is_none());
        assert!(inner.orbit("MPC:2024 AB").is_none());
        assert!(inner.orbit("MPC:99999").is_none());
        assert_eq!(inner.orbit("MPC:00004").unwrap().id_internal, Some(4));
        assert_eq!(inner.orbits().count(), 1);
        assert!(!inner.in_transaction());
    }

    #[tokio::test]
    async fn test_headerless_file_loads_nothing() {
        let mut store = MemoryStore::new();
        let report = MpcorbLoader::new(true, 100)
            .run(&mut store, "\n  \n", "empty.csv")
            .await
            .unwrap();
        assert!(report.enabled);
        assert_eq!(report.processed, 0);
    }
}
