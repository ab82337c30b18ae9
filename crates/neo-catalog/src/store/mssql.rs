//! SQL Server catalog store over a single tiberius connection.

use super::CatalogStore;
use crate::catalog::IdentityResolver;
use crate::config::ConnectionConfig;
use crate::db::{self, quote_ident, MssqlClient};
use crate::error::Result;
use crate::ingest::values::truncate_chars;
use crate::model::{
    columns, limits, Asteroid, LoadErrorRecord, MergePolicy, Orbit, OrbitalClass, UpsertAction,
    DEFAULT_CLASS, DEFAULT_CLASS_DESCRIPTION,
};
use async_trait::async_trait;
use tiberius::ToSql;
use tracing::{debug, warn};

const ENSURE_PRIORITIES: &str = "IF NOT EXISTS (SELECT 1 FROM Priority) \
     INSERT INTO Priority(id_priority, name) VALUES (1,'High'),(2,'Medium'),(3,'Low');";

const ENSURE_LEVELS: &str = "IF NOT EXISTS (SELECT 1 FROM Level) \
     INSERT INTO Level(id_level, color, description) \
     VALUES (1,'G','Green'),(2,'Y','Yellow'),(3,'O','Orange'),(4,'R','Red');";

const UPDATE_ASTEROID_OVERWRITE: &str = r#"
UPDATE Asteroid
SET neo_id = COALESCE(neo_id, @P1),
    spkid = COALESCE(spkid, @P2),
    full_name = @P3, pdes = @P4, name = @P5, prefix = @P6,
    neo_flag = @P7, pha_flag = @P8,
    diameter = @P9, absolute_magnitude = @P10, albedo = @P11, diameter_sigma = @P12
WHERE id_internal = @P13"#;

const UPDATE_ASTEROID_FILL: &str = r#"
UPDATE Asteroid
SET neo_id = COALESCE(neo_id, @P1),
    spkid = COALESCE(spkid, @P2),
    full_name = CASE WHEN full_name IS NULL OR full_name = '' THEN NULLIF(@P3, '') ELSE full_name END,
    pdes = CASE WHEN pdes IS NULL OR pdes = '' THEN NULLIF(@P4, '') ELSE pdes END,
    name = CASE WHEN name IS NULL OR name = '' THEN NULLIF(@P5, '') ELSE name END,
    prefix = CASE WHEN prefix IS NULL OR prefix = '' THEN COALESCE(NULLIF(@P6, ''), '') ELSE prefix END,
    neo_flag = CASE WHEN neo_flag IS NULL OR neo_flag = '' THEN NULLIF(@P7, '') ELSE neo_flag END,
    pha_flag = CASE WHEN pha_flag IS NULL OR pha_flag = '' THEN NULLIF(@P8, '') ELSE pha_flag END,
    diameter = COALESCE(diameter, @P9),
    absolute_magnitude = COALESCE(absolute_magnitude, @P10),
    albedo = COALESCE(albedo, @P11),
    diameter_sigma = COALESCE(diameter_sigma, @P12)
WHERE id_internal = @P13"#;

const INSERT_ASTEROID: &str = r#"
INSERT INTO Asteroid(
  id_internal, spkid, full_name, pdes, name, prefix,
  neo_flag, pha_flag, diameter, absolute_magnitude, albedo, diameter_sigma,
  created_at, neo_id
)
VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9, @P10, @P11, @P12, SYSDATETIME(), @P13)"#;

/// `INSERT INTO Orbit(...)` binding every column of [`columns::ORBIT`].
fn orbit_insert_sql() -> String {
    let cols: Vec<String> = columns::ORBIT.iter().map(|c| quote_ident(c)).collect();
    let params: Vec<String> = (1..=columns::ORBIT.len()).map(|i| format!("@P{}", i)).collect();
    format!(
        "INSERT INTO Orbit({}) VALUES ({})",
        cols.join(", "),
        params.join(", ")
    )
}

/// `UPDATE Orbit` keyed by `@P1`, binding the other columns in order.
fn orbit_update_sql(policy: MergePolicy) -> String {
    let sets: Vec<String> = columns::ORBIT
        .iter()
        .enumerate()
        .skip(1)
        .map(|(idx, col)| {
            let quoted = quote_ident(col);
            let param = format!("@P{}", idx + 1);
            match policy {
                MergePolicy::Overwrite => format!("{} = {}", quoted, param),
                MergePolicy::FillMissing if columns::ORBIT_TEXT.contains(col) => format!(
                    "{q} = CASE WHEN {q} IS NULL OR {q} = '' THEN NULLIF({p}, '') ELSE {q} END",
                    q = quoted,
                    p = param
                ),
                MergePolicy::FillMissing => format!("{q} = COALESCE({q}, {p})", q = quoted, p = param),
            }
        })
        .collect();
    format!("UPDATE Orbit SET {} WHERE [id_orbita] = @P1", sets.join(", "))
}

/// Parameters in [`columns::ORBIT`] order.
fn orbit_params(orbit: &Orbit) -> Vec<&dyn ToSql> {
    let s = &orbit.sigmas;
    vec![
        &orbit.orbit_id,
        &orbit.epoch,
        &orbit.rms,
        &orbit.moid_ld,
        &orbit.epoch_mjd,
        &orbit.epoch_cal,
        &orbit.tp,
        &orbit.tp_cal,
        &orbit.per,
        &orbit.per_y,
        &orbit.equinox,
        &orbit.orbit_uncertainty,
        &orbit.condition_code,
        &orbit.e,
        &orbit.a,
        &orbit.q,
        &orbit.i,
        &orbit.om,
        &orbit.w,
        &orbit.ma,
        &orbit.ad,
        &orbit.n,
        &orbit.moid,
        &s.e,
        &s.a,
        &s.q,
        &s.i,
        &s.n,
        &s.ma,
        &s.om,
        &s.w,
        &s.ad,
        &s.tp,
        &s.per,
        &orbit.id_internal,
        &orbit.class,
    ]
}

/// Catalog store backed by SQL Server.
///
/// Owns one connection so explicit transactions span every call between
/// `begin` and `commit`.
pub struct MssqlStore {
    client: MssqlClient,
    in_transaction: bool,
    load_error_table: Option<bool>,
}

impl MssqlStore {
    pub fn new(client: MssqlClient) -> Self {
        Self {
            client,
            in_transaction: false,
            load_error_table: None,
        }
    }

    pub async fn connect(cfg: &ConnectionConfig) -> Result<Self> {
        Ok(Self::new(db::connect(cfg).await?))
    }

    pub fn into_inner(self) -> MssqlClient {
        self.client
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<u64> {
        Ok(self.client.execute(sql, params).await?.total())
    }

    async fn first_id(&mut self, sql: &str, params: &[&dyn ToSql]) -> Result<Option<i64>> {
        db::query_i64(&mut self.client, sql, params).await
    }
}

#[async_trait]
impl CatalogStore for MssqlStore {
    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.batch("BEGIN TRANSACTION").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.batch("COMMIT TRANSACTION").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn ensure_reference_data(&mut self) -> Result<()> {
        self.batch(ENSURE_PRIORITIES).await?;
        self.batch(ENSURE_LEVELS).await
    }

    async fn load_identities(&mut self) -> Result<IdentityResolver> {
        let next_id = self
            .first_id(
                "SELECT CAST(ISNULL(MAX(id_internal), 0) + 1 AS BIGINT) FROM Asteroid",
                &[],
            )
            .await?
            .unwrap_or(1);
        let mut resolver = IdentityResolver::new(next_id);

        let rows = db::query_rows(
            &mut self.client,
            "SELECT CAST(id_internal AS BIGINT), neo_id, CAST(spkid AS BIGINT) FROM Asteroid",
            &[],
        )
        .await?;
        for row in &rows {
            let Some(id) = row.try_get::<i64, _>(0)? else {
                continue;
            };
            let neo_id: Option<&str> = row.try_get(1)?;
            let spkid: Option<i64> = row.try_get(2)?;
            resolver.seed(id, neo_id, spkid);
        }
        debug!(
            "Loaded {} asteroid keys, next id_internal {}",
            resolver.known_keys(),
            resolver.next_id()
        );
        Ok(resolver)
    }

    async fn next_mpc_sequence(&mut self) -> Result<i64> {
        let next = self
            .first_id(
                "SELECT CAST(ISNULL(MAX(TRY_CONVERT(int, SUBSTRING(id_orbita, 4, 50))), 0) + 1 AS BIGINT) \
                 FROM Orbit WHERE id_orbita LIKE 'MPC%'",
                &[],
            )
            .await?;
        Ok(next.unwrap_or(1))
    }

    async fn ensure_class(&mut self, class: &OrbitalClass) -> Result<bool> {
        if class.code.is_empty() {
            return Ok(false);
        }
        let inserted = self
            .execute(
                "IF NOT EXISTS (SELECT 1 FROM Class_Orbital WHERE class = @P1) \
                 INSERT INTO Class_Orbital(class, class_description) VALUES (@P1, @P2)",
                &[&class.code, &class.description],
            )
            .await?;
        Ok(inserted > 0)
    }

    async fn upsert_asteroid(
        &mut self,
        asteroid: &Asteroid,
        policy: MergePolicy,
    ) -> Result<UpsertAction> {
        let mut existing = None;
        if let Some(spkid) = asteroid.spkid {
            existing = self
                .first_id(
                    "SELECT TOP 1 CAST(id_internal AS BIGINT) FROM Asteroid WHERE spkid = @P1",
                    &[&spkid],
                )
                .await?;
        }
        if existing.is_none() {
            if let Some(neo_id) = asteroid.neo_id.as_deref() {
                existing = self
                    .first_id(
                        "SELECT TOP 1 CAST(id_internal AS BIGINT) FROM Asteroid WHERE neo_id = @P1",
                        &[&neo_id],
                    )
                    .await?;
            }
        }

        match existing {
            Some(id) => {
                let sql = match policy {
                    MergePolicy::Overwrite => UPDATE_ASTEROID_OVERWRITE,
                    MergePolicy::FillMissing => UPDATE_ASTEROID_FILL,
                };
                self.execute(
                    sql,
                    &[
                        &asteroid.neo_id,
                        &asteroid.spkid,
                        &asteroid.full_name,
                        &asteroid.pdes,
                        &asteroid.name,
                        &asteroid.prefix,
                        &asteroid.neo_flag,
                        &asteroid.pha_flag,
                        &asteroid.diameter,
                        &asteroid.absolute_magnitude,
                        &asteroid.albedo,
                        &asteroid.diameter_sigma,
                        &id,
                    ],
                )
                .await?;
                Ok(UpsertAction::Updated)
            }
            None => {
                let h = asteroid.absolute_magnitude.unwrap_or(0.0);
                self.execute(
                    INSERT_ASTEROID,
                    &[
                        &asteroid.id_internal,
                        &asteroid.spkid,
                        &asteroid.full_name,
                        &asteroid.pdes,
                        &asteroid.name,
                        &asteroid.prefix,
                        &asteroid.neo_flag,
                        &asteroid.pha_flag,
                        &asteroid.diameter,
                        &h,
                        &asteroid.albedo,
                        &asteroid.diameter_sigma,
                        &asteroid.neo_id,
                    ],
                )
                .await?;
                Ok(UpsertAction::Inserted)
            }
        }
    }

    async fn upsert_orbit(&mut self, orbit: &Orbit, policy: MergePolicy) -> Result<UpsertAction> {
        let rows = db::query_rows(
            &mut self.client,
            "SELECT CAST(id_internal AS BIGINT) FROM Orbit WHERE id_orbita = @P1",
            &[&orbit.orbit_id],
        )
        .await?;
        let existing_owner = match rows.first() {
            Some(row) => Some(row.try_get::<i64, _>(0)?),
            None => None,
        };

        if let Some(Some(owner)) = existing_owner {
            if let Some(incoming) = orbit.id_internal {
                if owner != incoming {
                    warn!(
                        "Orbit {} belongs to id_internal={}, skipping update",
                        orbit.orbit_id, owner
                    );
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

        let params = orbit_params(orbit);
        if existing_owner.is_some() {
            self.execute(&orbit_update_sql(policy), &params).await?;
            Ok(UpsertAction::Updated)
        } else {
            self.execute(&orbit_insert_sql(), &params).await?;
            Ok(UpsertAction::Inserted)
        }
    }

    async fn orbit_exists(&mut self, orbit_id: &str) -> Result<bool> {
        let rows = db::query_rows(
            &mut self.client,
            "SELECT 1 FROM Orbit WHERE id_orbita = @P1",
            &[&orbit_id],
        )
        .await?;
        Ok(!rows.is_empty())
    }

    async fn find_asteroid_by_pdes(&mut self, pdes: &str) -> Result<Option<i64>> {
        self.first_id(
            "SELECT TOP 1 CAST(id_internal AS BIGINT) FROM Asteroid WHERE pdes = @P1",
            &[&pdes],
        )
        .await
    }

    async fn record_load_error(&mut self, record: &LoadErrorRecord) -> Result<()> {
        let has_table = match self.load_error_table {
            Some(known) => known,
            None => {
                let exists = db::table_exists(&mut self.client, "Load_Error").await?;
                if !exists {
                    debug!("Load_Error table not present, row errors are only logged");
                }
                self.load_error_table = Some(exists);
                exists
            }
        };
        if !has_table {
            return Ok(());
        }

        let row_number = record.row_number as i64;
        let raw = truncate_chars(&record.raw_data, limits::LOAD_ERROR_RAW);
        self.execute(
            "INSERT INTO Load_Error(source_file, row_number, entity, error_message, raw_data) \
             VALUES (@P1, @P2, @P3, @P4, @P5)",
            &[
                &record.source_file,
                &row_number,
                &record.entity,
                &record.message,
                &raw,
            ],
        )
        .await?;
        Ok(())
    }
}
