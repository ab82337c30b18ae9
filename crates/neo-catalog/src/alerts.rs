//! Alerts: lookup data, asteroid search, creation, listing and
//! high-priority notifications.

use crate::db::{self, MssqlClient};
use crate::error::{CatalogError, Result};
use crate::model::{Level, Priority, HIGH_PRIORITY_ID};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tiberius::{Row, ToSql};
use tracing::{debug, info};

/// Rows returned by an asteroid search.
pub const SEARCH_LIMIT: u32 = 200;

/// Priorities and levels an alert can reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub priorities: Vec<Priority>,
    pub levels: Vec<Level>,
}

impl ReferenceData {
    pub async fn load(client: &mut MssqlClient) -> Result<Self> {
        let mut priorities = Vec::new();
        for row in db::query_rows(
            client,
            "SELECT CAST(id_priority AS INT), name FROM Priority ORDER BY id_priority",
            &[],
        )
        .await?
        {
            priorities.push(Priority {
                id: row.try_get::<i32, _>(0)?.unwrap_or_default(),
                name: text_at(&row, 1)?,
            });
        }

        let mut levels = Vec::new();
        for row in db::query_rows(
            client,
            "SELECT CAST(id_level AS INT), color, description FROM Level ORDER BY id_level",
            &[],
        )
        .await?
        {
            levels.push(Level {
                id: row.try_get::<i32, _>(0)?.unwrap_or_default(),
                color: text_at(&row, 1)?,
                description: text_at(&row, 2)?,
            });
        }

        Ok(Self { priorities, levels })
    }

    pub fn has_priority(&self, id: i32) -> bool {
        self.priorities.iter().any(|p| p.id == id)
    }

    pub fn has_level(&self, id: i32) -> bool {
        self.levels.iter().any(|l| l.id == id)
    }
}

fn text_at(row: &Row, idx: usize) -> Result<String> {
    Ok(row
        .try_get::<&str, _>(idx)?
        .unwrap_or_default()
        .trim()
        .to_string())
}

/// An asteroid matching a search term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsteroidMatch {
    pub id_internal: i64,
    pub spkid: Option<i64>,
    pub full_name: String,
    pub pdes: String,
    pub name: Option<String>,
    pub neo_flag: String,
    pub pha_flag: String,
    pub diameter: Option<f64>,
    pub absolute_magnitude: Option<f64>,
    pub neo_id: Option<String>,
}

fn search_sql(numeric: bool) -> String {
    let mut sql = format!(
        "SELECT TOP ({}) CAST(id_internal AS BIGINT), CAST(spkid AS BIGINT), full_name, pdes, name, \
         neo_flag, pha_flag, CAST(diameter AS FLOAT), CAST(absolute_magnitude AS FLOAT), neo_id \
         FROM Asteroid \
         WHERE pdes LIKE @P1 OR full_name LIKE @P1 OR name LIKE @P1 OR neo_id LIKE @P1",
        SEARCH_LIMIT
    );
    if numeric {
        sql.push_str(" OR id_internal = @P2 OR spkid = @P2");
    }
    sql.push_str(" ORDER BY id_internal DESC");
    sql
}

/// Find asteroids whose designation, names or record id contain `term`.
/// Numeric terms also match the internal id and SPK-ID exactly.
pub async fn search_asteroids(client: &mut MssqlClient, term: &str) -> Result<Vec<AsteroidMatch>> {
    let term = term.trim();
    if term.is_empty() {
        return Err(CatalogError::Validation("search term is empty".to_string()));
    }
    let like = format!("%{}%", term);
    let number = term
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then(|| term.parse::<i64>().ok())
        .flatten();

    let rows = match number {
        Some(n) => db::query_rows(client, &search_sql(true), &[&like, &n]).await?,
        None => db::query_rows(client, &search_sql(false), &[&like]).await?,
    };

    let mut matches = Vec::with_capacity(rows.len());
    for row in &rows {
        matches.push(AsteroidMatch {
            id_internal: row.try_get::<i64, _>(0)?.unwrap_or_default(),
            spkid: row.try_get::<i64, _>(1)?,
            full_name: text_at(row, 2)?,
            pdes: text_at(row, 3)?,
            name: row.try_get::<&str, _>(4)?.map(str::to_string),
            neo_flag: text_at(row, 5)?,
            pha_flag: text_at(row, 6)?,
            diameter: row.try_get::<f64, _>(7)?,
            absolute_magnitude: row.try_get::<f64, _>(8)?,
            neo_id: row.try_get::<&str, _>(9)?.map(str::to_string),
        });
    }
    debug!("Search '{}' matched {} asteroids", term, matches.len());
    Ok(matches)
}

/// Input of `create_alert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub id_internal: i64,
    pub criteria: String,
    pub priority: i32,
    pub level: i32,
    /// Defaults to now.
    pub generated_at: Option<NaiveDateTime>,
}

impl NewAlert {
    /// Check the alert against the reference data.
    pub fn validate(&self, refs: &ReferenceData) -> Result<()> {
        if self.id_internal <= 0 {
            return Err(CatalogError::Validation(format!(
                "invalid asteroid id {}",
                self.id_internal
            )));
        }
        if self.criteria.trim().is_empty() {
            return Err(CatalogError::Validation("alert criteria is required".to_string()));
        }
        if !refs.has_priority(self.priority) {
            return Err(CatalogError::Validation(format!("unknown priority {}", self.priority)));
        }
        if !refs.has_level(self.level) {
            return Err(CatalogError::Validation(format!("unknown level {}", self.level)));
        }
        Ok(())
    }
}

/// Insert an alert and return its id, drawn from `dbo.seq_alert_id`.
pub async fn create_alert(client: &mut MssqlClient, alert: &NewAlert) -> Result<i64> {
    let refs = ReferenceData::load(client).await?;
    alert.validate(&refs)?;

    let exists = db::query_rows(
        client,
        "SELECT 1 FROM Asteroid WHERE id_internal = @P1",
        &[&alert.id_internal],
    )
    .await?;
    if exists.is_empty() {
        return Err(CatalogError::Validation(format!(
            "asteroid {} does not exist",
            alert.id_internal
        )));
    }

    let id_alert = db::query_i64(client, "SELECT CAST(NEXT VALUE FOR dbo.seq_alert_id AS BIGINT)", &[])
        .await?
        .ok_or_else(|| CatalogError::Validation("sequence dbo.seq_alert_id returned no value".to_string()))?;
    let generated_at = alert
        .generated_at
        .unwrap_or_else(|| Local::now().naive_local());
    let criteria = alert.criteria.trim();

    client
        .execute(
            "INSERT INTO Alert (id_alert, data_generation, criteria_trigger, id_internal, id_priority, id_level) \
             VALUES (@P1, @P2, @P3, @P4, @P5, @P6)",
            &[
                &id_alert,
                &generated_at,
                &criteria,
                &alert.id_internal,
                &alert.priority,
                &alert.level,
            ],
        )
        .await?;
    info!(
        "Created alert {} for asteroid {} (priority {}, level {})",
        id_alert, alert.id_internal, alert.priority, alert.level
    );
    Ok(id_alert)
}

/// Optional filters of `list_alerts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub priority: Option<i32>,
    pub level: Option<i32>,
}

/// An alert with its lookups resolved to names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRow {
    pub id_alert: i64,
    pub generated_at: Option<NaiveDateTime>,
    pub priority: String,
    pub level: String,
    pub asteroid: String,
    pub criteria: String,
}

fn list_sql(filter: &AlertFilter) -> String {
    let mut conditions = Vec::new();
    let mut param = 0;
    if filter.priority.is_some() {
        param += 1;
        conditions.push(format!("a.id_priority = @P{}", param));
    }
    if filter.level.is_some() {
        param += 1;
        conditions.push(format!("a.id_level = @P{}", param));
    }
    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    format!(
        "SELECT CAST(a.id_alert AS BIGINT), CAST(a.data_generation AS DATETIME2), \
         COALESCE(p.name, CONCAT('ID ', a.id_priority)), \
         COALESCE(l.description, CONCAT('ID ', a.id_level)), \
         COALESCE(ast.full_name, CONCAT('ID ', a.id_internal)), \
         a.criteria_trigger \
         FROM Alert a \
         LEFT JOIN Priority p ON p.id_priority = a.id_priority \
         LEFT JOIN Level l ON l.id_level = a.id_level \
         LEFT JOIN Asteroid ast ON ast.id_internal = a.id_internal{} \
         ORDER BY a.data_generation DESC",
        where_sql
    )
}

/// Alerts, newest first.
pub async fn list_alerts(client: &mut MssqlClient, filter: &AlertFilter) -> Result<Vec<AlertRow>> {
    let mut params: Vec<&dyn ToSql> = Vec::new();
    if let Some(priority) = &filter.priority {
        params.push(priority);
    }
    if let Some(level) = &filter.level {
        params.push(level);
    }

    let rows = db::query_rows(client, &list_sql(filter), &params).await?;
    let mut alerts = Vec::with_capacity(rows.len());
    for row in &rows {
        alerts.push(AlertRow {
            id_alert: row.try_get::<i64, _>(0)?.unwrap_or_default(),
            generated_at: row.try_get::<NaiveDateTime, _>(1)?,
            priority: text_at(row, 2)?,
            level: text_at(row, 3)?,
            asteroid: text_at(row, 4)?,
            criteria: text_at(row, 5)?,
        });
    }
    Ok(alerts)
}

/// A new high-priority alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotice {
    pub id_alert: i64,
    pub generated_at: Option<NaiveDateTime>,
    pub criteria: String,
}

/// Where the watcher reads high-priority alerts from.
#[async_trait]
pub trait AlertSource: Send {
    /// Highest high-priority alert id, 0 when there is none.
    async fn max_high_priority_id(&mut self) -> Result<i64>;

    /// High-priority alerts with an id above `after`, ascending.
    async fn high_priority_after(&mut self, after: i64) -> Result<Vec<AlertNotice>>;
}

#[async_trait]
impl AlertSource for MssqlClient {
    async fn max_high_priority_id(&mut self) -> Result<i64> {
        let max = db::query_i64(
            self,
            "SELECT CAST(ISNULL(MAX(id_alert), 0) AS BIGINT) FROM Alert WHERE id_priority = @P1",
            &[&HIGH_PRIORITY_ID],
        )
        .await?;
        Ok(max.unwrap_or(0))
    }

    async fn high_priority_after(&mut self, after: i64) -> Result<Vec<AlertNotice>> {
        let rows = db::query_rows(
            self,
            "SELECT CAST(id_alert AS BIGINT), CAST(data_generation AS DATETIME2), criteria_trigger \
             FROM Alert WHERE id_priority = @P1 AND id_alert > @P2 ORDER BY id_alert",
            &[&HIGH_PRIORITY_ID, &after],
        )
        .await?;
        let mut notices = Vec::with_capacity(rows.len());
        for row in &rows {
            notices.push(AlertNotice {
                id_alert: row.try_get::<i64, _>(0)?.unwrap_or_default(),
                generated_at: row.try_get::<NaiveDateTime, _>(1)?,
                criteria: text_at(row, 2)?,
            });
        }
        Ok(notices)
    }
}

/// Reports high-priority alerts created since it started watching.
#[derive(Debug, Clone, Default)]
pub struct HighPriorityWatcher {
    last_seen: Option<i64>,
}

impl HighPriorityWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> Option<i64> {
        self.last_seen
    }

    /// The first poll only records the current maximum.
    pub async fn poll<S>(&mut self, source: &mut S) -> Result<Vec<AlertNotice>>
    where
        S: AlertSource + ?Sized,
    {
        let Some(last) = self.last_seen else {
            let max = source.max_high_priority_id().await?;
            debug!("Watching high-priority alerts above {}", max);
            self.last_seen = Some(max);
            return Ok(Vec::new());
        };

        let notices = source.high_priority_after(last).await?;
        if let Some(newest) = notices.iter().map(|n| n.id_alert).max() {
            self.last_seen = Some(newest.max(last));
        }
        Ok(notices)
    }
}
