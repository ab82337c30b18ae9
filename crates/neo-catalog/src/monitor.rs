//! Catalog dashboard: counts, alert statistics and trends.

use crate::config::MonitorConfig;
use crate::db::{self, MssqlClient};
use crate::error::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render values as a unicode bar line scaled between their min and max.
/// Missing values render as a space.
pub fn sparkline(values: &[Option<f64>]) -> String {
    let present: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|v| match v {
            Some(v) if v.is_finite() => {
                if range <= 0.0 {
                    BARS[BARS.len() / 2]
                } else {
                    let idx = ((v - min) / range * (BARS.len() - 1) as f64).round() as usize;
                    BARS[idx.min(BARS.len() - 1)]
                }
            }
            _ => ' ',
        })
        .collect()
}

/// A year of the RMS trend view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmsTrendPoint {
    pub year: i64,
    pub orbits: i64,
    pub avg_rms: Option<f64>,
}

/// Asteroids created in a `yyyy-MM` period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPoint {
    pub period: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestAsteroid {
    pub id_internal: i64,
    pub full_name: String,
    pub created_at: Option<NaiveDateTime>,
}

/// One refresh of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub asteroids: i64,
    pub orbits: i64,
    pub alerts: i64,
    pub high_priority_alerts: i64,
    pub red_alerts: i64,
    pub orange_alerts: i64,
    pub pha_over_100m: i64,
    pub new_neos_last_month: i64,
    pub next_critical_event: Option<NaiveDate>,
    /// Newest year first.
    pub rms_trend: Vec<RmsTrendPoint>,
    /// Newest period first.
    pub discoveries: Vec<DiscoveryPoint>,
    pub latest: Vec<LatestAsteroid>,
}

async fn count_if_exists(client: &mut MssqlClient, object: &str, sql: &str) -> Result<i64> {
    if !db::object_exists(client, object).await? {
        debug!("{} not found, reporting 0", object);
        return Ok(0);
    }
    Ok(db::query_i64(client, sql, &[]).await?.unwrap_or(0))
}

impl MonitorSnapshot {
    /// Query the dashboard figures. Views that do not exist read as zero or
    /// empty.
    pub async fn collect(client: &mut MssqlClient, cfg: &MonitorConfig) -> Result<Self> {
        let asteroids =
            count_if_exists(client, "Asteroid", "SELECT CAST(COUNT(*) AS BIGINT) FROM Asteroid").await?;
        let orbits = count_if_exists(client, "Orbit", "SELECT CAST(COUNT(*) AS BIGINT) FROM Orbit").await?;
        let alerts = count_if_exists(client, "Alert", "SELECT CAST(COUNT(*) AS BIGINT) FROM Alert").await?;
        let high_priority_alerts = count_if_exists(
            client,
            "Alert",
            "SELECT CAST(COUNT(*) AS BIGINT) FROM Alert WHERE id_priority = 1",
        )
        .await?;

        let (mut red_alerts, mut orange_alerts, mut pha_over_100m) = (0, 0, 0);
        if db::object_exists(client, "vw_Alert_Stats").await? {
            let rows = db::query_rows(
                client,
                "SELECT CAST(red_alerts AS BIGINT), CAST(orange_alerts AS BIGINT), CAST(pha_over_100 AS BIGINT) FROM vw_Alert_Stats",
                &[],
            )
            .await?;
            if let Some(row) = rows.first() {
                red_alerts = row.try_get::<i64, _>(0)?.unwrap_or(0);
                orange_alerts = row.try_get::<i64, _>(1)?.unwrap_or(0);
                pha_over_100m = row.try_get::<i64, _>(2)?.unwrap_or(0);
            }
        }

        let mut next_critical_event = None;
        if db::object_exists(client, "vw_Next_Critical_Event").await? {
            let rows = db::query_rows(
                client,
                "SELECT CAST(next_close_approach_date AS DATE) FROM vw_Next_Critical_Event",
                &[],
            )
            .await?;
            if let Some(row) = rows.first() {
                next_critical_event = row.try_get::<NaiveDate, _>(0)?;
            }
        }

        let new_neos_last_month = count_if_exists(
            client,
            "vw_New_NEOs_LastMonth",
            "SELECT CAST(new_neos_last_month AS BIGINT) FROM vw_New_NEOs_LastMonth",
        )
        .await?;

        let mut rms_trend = Vec::new();
        if db::object_exists(client, "vw_RMS_Trend").await? {
            let sql = format!(
                "SELECT TOP ({}) CAST(yr AS BIGINT), CAST(cnt AS BIGINT), CAST(avg_rms AS FLOAT) FROM vw_RMS_Trend ORDER BY yr DESC",
                cfg.trend_rows
            );
            for row in db::query_rows(client, &sql, &[]).await? {
                rms_trend.push(RmsTrendPoint {
                    year: row.try_get::<i64, _>(0)?.unwrap_or(0),
                    orbits: row.try_get::<i64, _>(1)?.unwrap_or(0),
                    avg_rms: row.try_get::<f64, _>(2)?,
                });
            }
        }

        let mut discoveries = Vec::new();
        let mut latest = Vec::new();
        if db::object_exists(client, "Asteroid").await? {
            let sql = format!(
                "SELECT TOP ({}) FORMAT(created_at, 'yyyy-MM') AS period, CAST(COUNT(*) AS BIGINT) \
                 FROM Asteroid WHERE created_at IS NOT NULL \
                 GROUP BY FORMAT(created_at, 'yyyy-MM') ORDER BY period DESC",
                cfg.trend_rows
            );
            for row in db::query_rows(client, &sql, &[]).await? {
                discoveries.push(DiscoveryPoint {
                    period: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                    count: row.try_get::<i64, _>(1)?.unwrap_or(0),
                });
            }

            let sql = format!(
                "SELECT TOP ({}) CAST(id_internal AS BIGINT), full_name, CAST(created_at AS DATETIME2) \
                 FROM Asteroid ORDER BY created_at DESC",
                cfg.latest_rows
            );
            for row in db::query_rows(client, &sql, &[]).await? {
                latest.push(LatestAsteroid {
                    id_internal: row.try_get::<i64, _>(0)?.unwrap_or(0),
                    full_name: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
                    created_at: row.try_get::<NaiveDateTime, _>(2)?,
                });
            }
        }

        Ok(Self {
            asteroids,
            orbits,
            alerts,
            high_priority_alerts,
            red_alerts,
            orange_alerts,
            pha_over_100m,
            new_neos_last_month,
            next_critical_event,
            rms_trend,
            discoveries,
            latest,
        })
    }

    /// Plain-text dashboard for terminals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "NEO catalog");
        let _ = writeln!(out, "  Asteroids:            {}", self.asteroids);
        let _ = writeln!(out, "  Orbits:               {}", self.orbits);
        let _ = writeln!(out, "  Alerts:               {}", self.alerts);
        let _ = writeln!(out, "  High priority alerts: {}", self.high_priority_alerts);
        let _ = writeln!(out, "  Red / orange alerts:  {} / {}", self.red_alerts, self.orange_alerts);
        let _ = writeln!(out, "  PHAs over 100 m:      {}", self.pha_over_100m);
        let _ = writeln!(out, "  New NEOs last month:  {}", self.new_neos_last_month);
        let next = self
            .next_critical_event
            .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
        let _ = writeln!(out, "  Next critical event:  {}", next);

        if !self.rms_trend.is_empty() {
            let chronological: Vec<&RmsTrendPoint> = self.rms_trend.iter().rev().collect();
            let line = sparkline(&chronological.iter().map(|p| p.avg_rms).collect::<Vec<_>>());
            let _ = writeln!(out, "\nOrbit precision (avg RMS by year)  {}", line);
            for p in &self.rms_trend {
                let avg = p.avg_rms.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v));
                let _ = writeln!(out, "  {:>6}  {:>8}  {:>10}", p.year, p.orbits, avg);
            }
        }

        if !self.discoveries.is_empty() {
            let counts: Vec<Option<f64>> = self
                .discoveries
                .iter()
                .rev()
                .map(|d| Some(d.count as f64))
                .collect();
            let _ = writeln!(out, "\nNew asteroids per month  {}", sparkline(&counts));
            for d in &self.discoveries {
                let _ = writeln!(out, "  {:>7}  {:>8}", d.period, d.count);
            }
        }

        if !self.latest.is_empty() {
            let _ = writeln!(out, "\nLatest asteroids");
            for a in &self.latest {
                let created = a
                    .created_at
                    .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
                let _ = writeln!(out, "  {:>8}  {:<40}  {}", a.id_internal, a.full_name, created);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_scales_between_extremes() {
        let line = sparkline(&[Some(1.0), Some(2.0), None, Some(8.0)]);
        let chars: Vec<char> = line.chars().collect();
        assert_eq!(chars.len(), 4);
        assert_eq!(chars[0], '▁');
        assert_eq!(chars[1], '▂');
        assert_eq!(chars[2], ' ');
        assert_eq!(chars[3], '█');
    }

    #[test]
    fn test_sparkline_flat_and_empty() {
        assert_eq!(sparkline(&[Some(3.0), Some(3.0)]), "▅▅");
        assert_eq!(sparkline(&[]), "");
        assert_eq!(sparkline(&[None]), " ");
    }

    #[test]
    fn test_render_includes_counts_and_trends() {
        let snapshot = MonitorSnapshot {
            asteroids: 35_000,
            orbits: 36_000,
            alerts: 4,
            high_priority_alerts: 1,
            red_alerts: 1,
            orange_alerts: 2,
            pha_over_100m: 7,
            new_neos_last_month: 12,
            next_critical_event: NaiveDate::from_ymd_opt(2029, 4, 13),
            rms_trend: vec![
                RmsTrendPoint { year: 2025, orbits: 10, avg_rms: Some(0.4) },
                RmsTrendPoint { year: 2024, orbits: 12, avg_rms: None },
            ],
            discoveries: vec![DiscoveryPoint { period: "2025-11".into(), count: 3 }],
            latest: vec![],
        };
        let text = snapshot.render();
        assert!(text.contains("Asteroids:            35000"));
        assert!(text.contains("Next critical event:  2029-04-13"));
        assert!(text.contains("0.4000"));
        assert!(text.contains("2025-11"));
        assert!(!text.contains("Latest asteroids"));
    }
}
