//! In-memory catalog used for dry runs and tests.

use super::{mpc_sequence_of, CatalogStore};
use crate::catalog::IdentityResolver;
use crate::error::{CatalogError, Result};
use crate::ingest::values::truncate_chars;
use crate::model::{
    default_levels, default_priorities, limits, Asteroid, Level, LoadErrorRecord, MergePolicy,
    Orbit, OrbitalClass, Priority, UpsertAction, DEFAULT_CLASS, DEFAULT_CLASS_DESCRIPTION,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
struct CatalogState {
    classes: BTreeMap<String, String>,
    asteroids: BTreeMap<i64, Asteroid>,
    orbits: BTreeMap<String, Orbit>,
    load_errors: Vec<LoadErrorRecord>,
    priorities: Vec<Priority>,
    levels: Vec<Level>,
    by_spk: HashMap<i64, i64>,
    by_neo: HashMap<String, i64>,
    by_pdes: HashMap<String, i64>,
}

impl CatalogState {
    fn unindex(&mut self, asteroid: &Asteroid) {
        let id = asteroid.id_internal;
        if let Some(spkid) = asteroid.spkid {
            self.by_spk.remove(&spkid);
        }
        if let Some(neo_id) = &asteroid.neo_id {
            self.by_neo.remove(&neo_id.to_lowercase());
        }
        if self.by_pdes.get(&asteroid.pdes) == Some(&id) {
            self.by_pdes.remove(&asteroid.pdes);
        }
    }

    fn index(&mut self, asteroid: &Asteroid) {
        let id = asteroid.id_internal;
        if let Some(spkid) = asteroid.spkid {
            self.by_spk.insert(spkid, id);
        }
        if let Some(neo_id) = &asteroid.neo_id {
            self.by_neo.insert(neo_id.to_lowercase(), id);
        }
        self.by_pdes.entry(asteroid.pdes.clone()).or_insert(id);
    }

    fn put_asteroid(&mut self, asteroid: Asteroid) {
        if let Some(old) = self.asteroids.get(&asteroid.id_internal).cloned() {
            self.unindex(&old);
        }
        self.index(&asteroid);
        self.asteroids.insert(asteroid.id_internal, asteroid);
    }

    fn check_orbit_references(&self, orbit: &Orbit) -> Result<()> {
        if !self.classes.contains_key(&orbit.class) {
            return Err(CatalogError::load(
                "Orbit",
                format!("class '{}' is not in Class_Orbital", orbit.class),
            ));
        }
        if let Some(id) = orbit.id_internal {
            if !self.asteroids.contains_key(&id) {
                return Err(CatalogError::load(
                    "Orbit",
                    format!("id_internal {} is not in Asteroid", id),
                ));
            }
        }
        Ok(())
    }
}

fn merge_asteroid(current: &mut Asteroid, incoming: &Asteroid, policy: MergePolicy) {
    match policy {
        MergePolicy::Overwrite => {
            let neo_id = current.neo_id.clone().or_else(|| incoming.neo_id.clone());
            let spkid = current.spkid.or(incoming.spkid);
            let id_internal = current.id_internal;
            *current = incoming.clone();
            current.id_internal = id_internal;
            current.neo_id = neo_id;
            current.spkid = spkid;
        }
        MergePolicy::FillMissing => current.fill_missing(incoming),
    }
}

fn merge_orbit(current: &mut Orbit, incoming: &Orbit, policy: MergePolicy) {
    match policy {
        MergePolicy::Overwrite => *current = incoming.clone(),
        MergePolicy::FillMissing => current.fill_missing(incoming),
    }
}

/// Catalog kept in process memory with snapshot-based transactions.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: CatalogState,
    snapshot: Option<CatalogState>,
    load_error_table: bool,
    commits: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty catalog with a `Load_Error` table.
    pub fn new() -> Self {
        Self {
            state: CatalogState::default(),
            snapshot: None,
            load_error_table: true,
            commits: 0,
        }
    }

    /// Empty catalog whose schema lacks `Load_Error`.
    pub fn without_load_error_table() -> Self {
        Self {
            load_error_table: false,
            ..Self::new()
        }
    }

    /// Pre-populate an asteroid row.
    pub fn with_asteroid(mut self, asteroid: Asteroid) -> Self {
        self.state.put_asteroid(asteroid);
        self
    }

    /// Pre-populate an orbit row, bypassing reference checks.
    pub fn with_orbit(mut self, orbit: Orbit) -> Self {
        self.state.orbits.insert(orbit.orbit_id.clone(), orbit);
        self
    }

    pub fn with_class(mut self, code: &str, description: &str) -> Self {
        self.state
            .classes
            .insert(code.to_string(), description.to_string());
        self
    }

    pub fn asteroids(&self) -> impl Iterator<Item = &Asteroid> {
        self.state.asteroids.values()
    }

    pub fn asteroid(&self, id_internal: i64) -> Option<&Asteroid> {
        self.state.asteroids.get(&id_internal)
    }

    pub fn orbits(&self) -> impl Iterator<Item = &Orbit> {
        self.state.orbits.values()
    }

    pub fn orbit(&self, orbit_id: &str) -> Option<&Orbit> {
        self.state.orbits.get(orbit_id)
    }

    /// Class code → description.
    pub fn classes(&self) -> &BTreeMap<String, String> {
        &self.state.classes
    }

    pub fn load_errors(&self) -> &[LoadErrorRecord] {
        &self.state.load_errors
    }

    pub fn priorities(&self) -> &[Priority] {
        &self.state.priorities
    }

    pub fn levels(&self) -> &[Level] {
        &self.state.levels
    }

    /// Number of successful commits.
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn begin(&mut self) -> Result<()> {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.state.clone());
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.snapshot = None;
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(snapshot) = self.snapshot.take() {
            self.state = snapshot;
        }
        Ok(())
    }

    async fn ensure_reference_data(&mut self) -> Result<()> {
        if self.state.priorities.is_empty() {
            self.state.priorities = default_priorities();
        }
        if self.state.levels.is_empty() {
            self.state.levels = default_levels();
        }
        Ok(())
    }

    async fn load_identities(&mut self) -> Result<IdentityResolver> {
        let next_id = self
            .state
            .asteroids
            .keys()
            .next_back()
            .map_or(1, |max| max + 1);
        let mut resolver = IdentityResolver::new(next_id);
        for asteroid in self.state.asteroids.values() {
            resolver.seed(
                asteroid.id_internal,
                asteroid.neo_id.as_deref(),
                asteroid.spkid,
            );
        }
        Ok(resolver)
    }

    async fn next_mpc_sequence(&mut self) -> Result<i64> {
        let max = self
            .state
            .orbits
            .keys()
            .filter_map(|id| mpc_sequence_of(id))
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn ensure_class(&mut self, class: &OrbitalClass) -> Result<bool> {
        if class.code.is_empty() || self.state.classes.contains_key(&class.code) {
            return Ok(false);
        }
        self.state
            .classes
            .insert(class.code.clone(), class.description.clone());
        Ok(true)
    }

    async fn upsert_asteroid(
        &mut self,
        asteroid: &Asteroid,
        policy: MergePolicy,
    ) -> Result<UpsertAction> {
        let existing = asteroid
            .spkid
            .and_then(|s| self.state.by_spk.get(&s).copied())
            .or_else(|| {
                asteroid
                    .neo_id
                    .as_ref()
                    .and_then(|n| self.state.by_neo.get(&n.to_lowercase()).copied())
            });

        if let Some(id) = existing {
            if let Some(mut current) = self.state.asteroids.get(&id).cloned() {
                merge_asteroid(&mut current, asteroid, policy);
                self.state.put_asteroid(current);
                return Ok(UpsertAction::Updated);
            }
        }

        if self.state.asteroids.contains_key(&asteroid.id_internal) {
            return Err(CatalogError::load(
                "Asteroid",
                format!("duplicate id_internal {}", asteroid.id_internal),
            ));
        }
        let mut row = asteroid.clone();
        row.absolute_magnitude = row.absolute_magnitude.or(Some(0.0));
        self.state.put_asteroid(row);
        Ok(UpsertAction::Inserted)
    }

    async fn upsert_orbit(&mut self, orbit: &Orbit, policy: MergePolicy) -> Result<UpsertAction> {
        if let Some(current) = self.state.orbits.get(&orbit.orbit_id) {
            if let (Some(owner), Some(incoming)) = (current.id_internal, orbit.id_internal) {
                if owner != incoming {
                    return Ok(UpsertAction::Skipped);
                }
            }
        }

        if orbit.class == DEFAULT_CLASS {
            self.ensure_class(&OrbitalClass {
                code: DEFAULT_CLASS.to_string(),
                description: DEFAULT_CLASS_DESCRIPTION.to_string(),
            })
            .await?;
        }

        match self.state.orbits.get(&orbit.orbit_id).cloned() {
            Some(mut current) => {
                merge_orbit(&mut current, orbit, policy);
                self.state.check_orbit_references(&current)?;
                self.state.orbits.insert(current.orbit_id.clone(), current);
                Ok(UpsertAction::Updated)
            }
            None => {
                self.state.check_orbit_references(orbit)?;
                self.state
                    .orbits
                    .insert(orbit.orbit_id.clone(), orbit.clone());
                Ok(UpsertAction::Inserted)
            }
        }
    }

    async fn orbit_exists(&mut self, orbit_id: &str) -> Result<bool> {
        Ok(self.state.orbits.contains_key(orbit_id))
    }

    async fn find_asteroid_by_pdes(&mut self, pdes: &str) -> Result<Option<i64>> {
        Ok(self.state.by_pdes.get(pdes).copied())
    }

    async fn record_load_error(&mut self, record: &LoadErrorRecord) -> Result<()> {
        if !self.load_error_table {
            return Ok(());
        }
        let mut record = record.clone();
        record.raw_data = truncate_chars(&record.raw_data, limits::LOAD_ERROR_RAW);
        self.state.load_errors.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrbitSigmas;
    use chrono::NaiveDate;

    fn asteroid(id: i64, spkid: Option<i64>, neo_id: Option<&str>) -> Asteroid {
        Asteroid {
            id_internal: id,
            spkid,
            neo_id: neo_id.map(String::from),
            full_name: format!("Object {}", id),
            pdes: id.to_string(),
            name: None,
            prefix: String::new(),
            neo_flag: "Y".into(),
            pha_flag: "N".into(),
            diameter: None,
            absolute_magnitude: Some(18.0),
            albedo: None,
            diameter_sigma: None,
        }
    }

    fn orbit(id: &str, owner: Option<i64>) -> Orbit {
        Orbit {
            orbit_id: id.into(),
            id_internal: owner,
            class: DEFAULT_CLASS.into(),
            epoch: 2460000.5,
            epoch_mjd: None,
            epoch_cal: None,
            equinox: "J2000".into(),
            rms: 0.5,
            moid: 0.1,
            moid_ld: 40.0,
            e: 0.2,
            a: 1.5,
            q: 1.2,
            i: 10.0,
            om: 100.0,
            w: 50.0,
            ma: 20.0,
            ad: 1.8,
            n: 0.5,
            tp: 2459960.5,
            tp_cal: NaiveDate::from_ymd_opt(2023, 1, 16).unwrap(),
            per: 720.0,
            per_y: 1.97,
            orbit_uncertainty: None,
            condition_code: None,
            sigmas: OrbitSigmas::default(),
        }
    }

    #[tokio::test]
    async fn test_upsert_asteroid_matches_spkid_then_neo_id() {
        let mut store = MemoryStore::new().with_asteroid(asteroid(1, Some(100), None));

        let mut incoming = asteroid(9, Some(100), Some("a0000100"));
        incoming.full_name = "Renamed".into();
        let action = store
            .upsert_asteroid(&incoming, MergePolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(action, UpsertAction::Updated);
        let row = store.asteroid(1).unwrap();
        assert_eq!(row.full_name, "Renamed");
        assert_eq!(row.neo_id.as_deref(), Some("a0000100"));
        assert!(store.asteroid(9).is_none());

        let by_neo = asteroid(9, None, Some("A0000100"));
        let action = store
            .upsert_asteroid(&by_neo, MergePolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(action, UpsertAction::Updated);
        assert_eq!(store.asteroid(1).unwrap().spkid, Some(100));
    }

    #[tokio::test]
    async fn test_fill_missing_keeps_existing_values() {
        let mut existing = asteroid(1, Some(100), Some("a1"));
        existing.diameter = Some(1.0);
        existing.name = Some(String::new());
        let mut store = MemoryStore::new().with_asteroid(existing);

        let mut incoming = asteroid(1, Some(100), Some("a1"));
        incoming.full_name = "Other".into();
        incoming.diameter = Some(5.0);
        incoming.albedo = Some(0.25);
        incoming.name = Some("Eros".into());
        store
            .upsert_asteroid(&incoming, MergePolicy::FillMissing)
            .await
            .unwrap();

        let row = store.asteroid(1).unwrap();
        assert_eq!(row.full_name, "Object 1");
        assert_eq!(row.diameter, Some(1.0));
        assert_eq!(row.albedo, Some(0.25));
        assert_eq!(row.name.as_deref(), Some("Eros"));
    }

    #[tokio::test]
    async fn test_insert_defaults_magnitude() {
        let mut store = MemoryStore::new();
        let mut row = asteroid(3, None, Some("b3"));
        row.absolute_magnitude = None;
        let action = store
            .upsert_asteroid(&row, MergePolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(action, UpsertAction::Inserted);
        assert_eq!(store.asteroid(3).unwrap().absolute_magnitude, Some(0.0));
        assert_eq!(store.find_asteroid_by_pdes("3").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_orbit_owned_by_other_asteroid_is_skipped() {
        let mut store = MemoryStore::new()
            .with_asteroid(asteroid(1, Some(1), None))
            .with_asteroid(asteroid(2, Some(2), None));

        let action = store
            .upsert_orbit(&orbit("JPL 1", Some(1)), MergePolicy::FillMissing)
            .await
            .unwrap();
        assert_eq!(action, UpsertAction::Inserted);
        assert!(store.classes().contains_key(DEFAULT_CLASS));

        let action = store
            .upsert_orbit(&orbit("JPL 1", Some(2)), MergePolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(action, UpsertAction::Skipped);
        assert_eq!(store.orbit("JPL 1").unwrap().id_internal, Some(1));
    }

    #[tokio::test]
    async fn test_orbit_fill_missing_and_references() {
        let mut store = MemoryStore::new().with_asteroid(asteroid(1, Some(1), None));
        store
            .upsert_orbit(&orbit("MPC1", None), MergePolicy::FillMissing)
            .await
            .unwrap();

        let mut incoming = orbit("MPC1", Some(1));
        incoming.e = 0.9;
        incoming.epoch_mjd = Some(60000.0);
        store
            .upsert_orbit(&incoming, MergePolicy::FillMissing)
            .await
            .unwrap();
        let row = store.orbit("MPC1").unwrap();
        assert_eq!(row.e, 0.2);
        assert_eq!(row.epoch_mjd, Some(60000.0));
        assert_eq!(row.id_internal, Some(1));

        let mut unknown_class = orbit("X", None);
        unknown_class.class = "ZZZ".into();
        let err = store
            .upsert_orbit(&unknown_class, MergePolicy::Overwrite)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Load { .. }));
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let mut store = MemoryStore::new();
        store.begin().await.unwrap();
        store
            .upsert_asteroid(&asteroid(1, Some(1), None), MergePolicy::Overwrite)
            .await
            .unwrap();
        store.rollback().await.unwrap();
        assert_eq!(store.asteroids().count(), 0);
        assert_eq!(store.find_asteroid_by_pdes("1").await.unwrap(), None);

        store.begin().await.unwrap();
        store
            .upsert_asteroid(&asteroid(1, Some(1), None), MergePolicy::Overwrite)
            .await
            .unwrap();
        store.commit().await.unwrap();
        assert_eq!(store.asteroids().count(), 1);
        assert_eq!(store.commits(), 1);
        assert!(!store.in_transaction());
    }

    #[tokio::test]
    async fn test_identities_and_mpc_sequence() {
        let mut store = MemoryStore::new()
            .with_asteroid(asteroid(4, Some(40), Some("a4")))
            .with_orbit(orbit("MPC7", None))
            .with_orbit(orbit("MPC:00433", None));

        let mut resolver = store.load_identities().await.unwrap();
        assert_eq!(resolver.next_id(), 5);
        assert_eq!(resolver.resolve(None, Some(40)), Some(4));
        assert_eq!(store.next_mpc_sequence().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_load_errors_respect_table_presence() {
        let record = LoadErrorRecord {
            source_file: "neo.csv".into(),
            row_number: 3,
            entity: "Asteroid".into(),
            message: "Missing id or spkid".into(),
            raw_data: "x".repeat(5000),
        };

        let mut store = MemoryStore::new();
        store.record_load_error(&record).await.unwrap();
        assert_eq!(store.load_errors()[0].raw_data.len(), 4000);

        let mut bare = MemoryStore::without_load_error_table();
        bare.record_load_error(&record).await.unwrap();
        assert!(bare.load_errors().is_empty());
    }

    #[tokio::test]
    async fn test_reference_data_seeded_once() {
        let mut store = MemoryStore::new();
        store.ensure_reference_data().await.unwrap();
        store.ensure_reference_data().await.unwrap();
        assert_eq!(store.priorities().len(), 3);
        assert_eq!(store.levels().len(), 4);
    }
}
