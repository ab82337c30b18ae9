//! Running generated scripts and checking what they created.

use super::batches::split_batches;
use crate::db::{self, quote_ident, MssqlClient};
use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tables whose row counts `verify` reports.
pub const COUNTED_TABLES: [&str; 4] = ["Asteroid", "Orbit", "Class_Orbital", "Alert"];

/// Where script batches run.
#[async_trait]
pub trait ScriptTarget: Send {
    async fn database_exists(&mut self, name: &str) -> Result<bool>;

    async fn execute_batch(&mut self, sql: &str) -> Result<()>;
}

#[async_trait]
impl ScriptTarget for MssqlClient {
    async fn database_exists(&mut self, name: &str) -> Result<bool> {
        let rows = db::query_rows(self, "SELECT 1 FROM sys.databases WHERE name = @P1", &[&name]).await?;
        Ok(!rows.is_empty())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Refuse to run when this database already exists.
    pub fail_if_exists: Option<String>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub run_id: String,
    pub batches_total: usize,
    pub batches_run: usize,
    pub duration_ms: u64,
}

/// Run every batch of `script` in order, stopping at the first failure.
pub async fn apply_script<T>(target: &mut T, script: &str, options: &ApplyOptions) -> Result<ApplyReport>
where
    T: ScriptTarget + ?Sized,
{
    let start = Instant::now();
    if let Some(name) = &options.fail_if_exists {
        if target.database_exists(name).await? {
            return Err(CatalogError::Validation(format!(
                "database '{}' already exists; drop it or restore under another name",
                name
            )));
        }
    }

    let batches = split_batches(script);
    info!("Applying script: {} batches", batches.len());

    let mut report = ApplyReport {
        run_id: uuid::Uuid::new_v4().to_string(),
        batches_total: batches.len(),
        batches_run: 0,
        duration_ms: 0,
    };

    for batch in &batches {
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(CatalogError::Cancelled);
        }
        debug!("Batch {} (line {})", batch.number, batch.start_line);
        target.execute_batch(&batch.sql).await.map_err(|e| {
            CatalogError::script(
                batch.number,
                format!(
                    "starting at line {}: {}. Run the whole script in order on an empty database",
                    batch.start_line, e
                ),
            )
        })?;
        report.batches_run += 1;
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!("Script applied in {} ms", report.duration_ms);
    Ok(report)
}

/// Object kind created by a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    View,
    Trigger,
}

impl ObjectKind {
    fn sys_type(self) -> &'static str {
        match self {
            ObjectKind::Table => "U",
            ObjectKind::View => "V",
            ObjectKind::Trigger => "TR",
        }
    }
}

/// Last bracketed or bare name of a possibly schema-qualified identifier.
fn object_name(qualified: &str) -> Option<String> {
    let head = qualified
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()?;
    let last = head.rsplit('.').next()?;
    let name = last.trim_matches(|c| c == '[' || c == ']');
    (!name.is_empty()).then(|| name.to_string())
}

/// Tables, views and triggers a script creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptInventory {
    pub objects: BTreeSet<(ObjectKind, String)>,
}

/// `sql` with `--` and `/* */` comments removed. Quoted strings and
/// bracketed identifiers are kept as written; line breaks survive.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut block_depth = 0usize;
    let mut in_line_comment = false;
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                out.push(c);
            }
            continue;
        }
        if block_depth > 0 {
            match (c, chars.peek()) {
                ('/', Some('*')) => {
                    chars.next();
                    block_depth += 1;
                }
                ('*', Some('/')) => {
                    chars.next();
                    block_depth -= 1;
                }
                ('\n', _) => out.push(c),
                _ => {}
            }
            continue;
        }
        if let Some(close) = quote {
            out.push(c);
            if c == close {
                quote = None;
            }
            continue;
        }
        match (c, chars.peek()) {
            ('-', Some('-')) => {
                chars.next();
                in_line_comment = true;
            }
            ('/', Some('*')) => {
                chars.next();
                block_depth = 1;
            }
            ('\'', _) => {
                quote = Some('\'');
                out.push(c);
            }
            ('[', _) => {
                quote = Some(']');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

impl ScriptInventory {
    /// Scan `script` batch by batch. Comments and temp tables are ignored,
    /// and so is everything after the header of a trigger, procedure or
    /// function, whose body runs to the end of its batch.
    pub fn from_script(script: &str) -> Self {
        let mut objects = BTreeSet::new();
        for batch in split_batches(script) {
            let sql = strip_comments(&batch.sql);
            for line in sql.lines() {
                let words: Vec<&str> = line.split_whitespace().collect();
                if !words.first().is_some_and(|w| w.eq_ignore_ascii_case("create")) {
                    continue;
                }
                // CREATE OR ALTER VIEW ...
                let rest: Vec<&str> = words[1..]
                    .iter()
                    .copied()
                    .filter(|w| !w.eq_ignore_ascii_case("or") && !w.eq_ignore_ascii_case("alter"))
                    .collect();
                let Some(kind) = rest.first() else {
                    continue;
                };
                let kind = match kind.to_ascii_uppercase().as_str() {
                    "TABLE" => ObjectKind::Table,
                    "VIEW" => ObjectKind::View,
                    "TRIGGER" => ObjectKind::Trigger,
                    "PROCEDURE" | "PROC" | "FUNCTION" => break,
                    _ => continue,
                };
                if let Some(name) = rest.get(1).and_then(|n| object_name(n)) {
                    if !name.starts_with('#') {
                        objects.insert((kind, name));
                    }
                }
                if kind == ObjectKind::Trigger {
                    break;
                }
            }
        }
        Self { objects }
    }

    pub fn count(&self, kind: ObjectKind) -> usize {
        self.objects.iter().filter(|(k, _)| *k == kind).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingObject {
    pub kind: ObjectKind,
    pub name: String,
}

/// Objects found in the catalog database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub database: String,
    pub tables: i64,
    pub views: i64,
    pub triggers: i64,
    pub row_counts: Vec<TableCount>,
    /// Objects the script creates that the database lacks.
    pub missing: Vec<MissingObject>,
}

impl VerifyReport {
    pub fn complete(&self) -> bool {
        self.missing.is_empty()
    }
}

const COUNT_TABLES: &str =
    "SELECT CAST(COUNT(*) AS BIGINT) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'";
const COUNT_VIEWS: &str =
    "SELECT CAST(COUNT(*) AS BIGINT) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'VIEW'";
const COUNT_TRIGGERS: &str = "SELECT CAST(COUNT(*) AS BIGINT) FROM sys.triggers";

/// Count tables, views and triggers, row counts of the catalog tables, and
/// compare against `expected` when given.
pub async fn verify_objects(
    client: &mut MssqlClient,
    database: &str,
    expected: Option<&ScriptInventory>,
) -> Result<VerifyReport> {
    let tables = db::query_i64(client, COUNT_TABLES, &[]).await?.unwrap_or(0);
    let views = db::query_i64(client, COUNT_VIEWS, &[]).await?.unwrap_or(0);
    let triggers = db::query_i64(client, COUNT_TRIGGERS, &[]).await?.unwrap_or(0);

    let mut row_counts = Vec::new();
    for table in COUNTED_TABLES {
        if !db::table_exists(client, table).await? {
            continue;
        }
        let sql = format!("SELECT CAST(COUNT(*) AS BIGINT) FROM [dbo].{}", quote_ident(table));
        let rows = db::query_i64(client, &sql, &[]).await?.unwrap_or(0);
        row_counts.push(TableCount {
            table: table.to_string(),
            rows,
        });
    }

    let mut missing = Vec::new();
    if let Some(expected) = expected {
        let present: BTreeSet<(String, String)> = db::query_rows(
            client,
            "SELECT RTRIM(type), name FROM sys.objects WHERE type IN ('U', 'V', 'TR')",
            &[],
        )
        .await?
        .iter()
        .filter_map(|row| {
            let kind = row.try_get::<&str, _>(0).ok().flatten()?;
            let name = row.try_get::<&str, _>(1).ok().flatten()?;
            Some((kind.to_string(), name.to_lowercase()))
        })
        .collect();

        for (kind, name) in &expected.objects {
            let key = (kind.sys_type().to_string(), name.to_lowercase());
            if !present.contains(&key) {
                missing.push(MissingObject {
                    kind: *kind,
                    name: name.clone(),
                });
            }
        }
    }

    info!(
        "Verified {}: {} tables, {} views, {} triggers, {} missing",
        database,
        tables,
        views,
        triggers,
        missing.len()
    );
    Ok(VerifyReport {
        database: database.to_string(),
        tables,
        views,
        triggers,
        row_counts,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EXIT_SCRIPT_ERROR;

    #[derive(Default)]
    struct FakeTarget {
        databases: Vec<String>,
        fail_on: Option<String>,
        executed: Vec<String>,
    }

    #[async_trait]
    impl ScriptTarget for FakeTarget {
        async fn database_exists(&mut self, name: &str) -> Result<bool> {
            Ok(self.databases.iter().any(|d| d == name))
        }

        async fn execute_batch(&mut self, sql: &str) -> Result<()> {
            if self.fail_on.as_deref().is_some_and(|f| sql.contains(f)) {
                return Err(CatalogError::Validation(
                    "The INSERT statement conflicted with the FOREIGN KEY constraint".into(),
                ));
            }
            self.executed.push(sql.to_string());
            Ok(())
        }
    }

    const SCRIPT: &str = "CREATE DATABASE [NEOs]\nGO\nUSE [NEOs]\nGO\nINSERT [dbo].[Orbit] VALUES (1)\nGO\nSELECT 1\n";

    #[tokio::test]
    async fn test_runs_batches_in_order() {
        let mut target = FakeTarget::default();
        let report = apply_script(&mut target, SCRIPT, &ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(report.batches_total, 4);
        assert_eq!(report.batches_run, 4);
        assert_eq!(target.executed[1], "USE [NEOs]");
    }

    #[tokio::test]
    async fn test_stops_at_first_failing_batch() {
        let mut target = FakeTarget {
            fail_on: Some("INSERT".into()),
            ..Default::default()
        };
        let err = apply_script(&mut target, SCRIPT, &ApplyOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_SCRIPT_ERROR);
        assert!(matches!(err, CatalogError::Script { batch: 3, .. }));
        assert!(err.to_string().contains("line 5"));
        assert_eq!(target.executed.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_database_fails_early() {
        let mut target = FakeTarget {
            databases: vec!["NEOs".into()],
            ..Default::default()
        };
        let options = ApplyOptions {
            fail_if_exists: Some("NEOs".into()),
            ..Default::default()
        };
        let err = apply_script(&mut target, SCRIPT, &options).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(target.executed.is_empty());

        let options = ApplyOptions {
            fail_if_exists: Some("NEOs_copy".into()),
            ..Default::default()
        };
        assert!(apply_script(&mut target, SCRIPT, &options).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = ApplyOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let mut target = FakeTarget::default();
        let err = apply_script(&mut target, SCRIPT, &options).await.unwrap_err();
        assert!(matches!(err, CatalogError::Cancelled));
    }

    #[test]
    fn test_inventory_ignores_comments_temp_tables_and_bodies() {
        let script = "\
CREATE TABLE [dbo].[Alert](\n\
\t[id_alert] [int] NOT NULL\n\
) ON [PRIMARY]\n\
GO\n\
-- CREATE TABLE [dbo].[Legacy_NEO](x int)\n\
/* CREATE VIEW [dbo].[vw_Old]\n\
   CREATE TABLE [dbo].[Older] */\n\
CREATE TRIGGER [dbo].[trg_Alert_Insert] ON [dbo].[Alert] AFTER INSERT AS\n\
BEGIN\n\
\tCREATE TABLE #staging (id int)\n\
\tCREATE TABLE [dbo].[Audit_Scratch] (id int)\n\
END\n\
GO\n\
CREATE PROCEDURE [dbo].[usp_Refresh] AS\n\
CREATE TABLE [dbo].[Proc_Scratch] (id int)\n\
GO\n\
CREATE TABLE #loose (id int)\n\
INSERT [dbo].[Alert] ([criteria_trigger]) VALUES (N'-- CREATE TABLE [dbo].[InString]')\n";
        let inventory = ScriptInventory::from_script(script);
        let expected: BTreeSet<(ObjectKind, String)> = [
            (ObjectKind::Table, "Alert".to_string()),
            (ObjectKind::Trigger, "trg_Alert_Insert".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(inventory.objects, expected);
    }

    #[test]
    fn test_strip_comments_keeps_strings_and_lines() {
        let sql = "SELECT N'a--b' /* x\ny */ AS [c--d] -- tail\nFROM t";
        assert_eq!(strip_comments(sql), "SELECT N'a--b' \n AS [c--d] \nFROM t");
    }

    #[test]
    fn test_inventory_from_script() {
        let script = "\
CREATE TABLE [dbo].[Asteroid](\n\
\t[id_internal] [int] NOT NULL\n\
) ON [PRIMARY]\n\
CREATE TABLE dbo.Orbit (x int)\n\
/****** Object:  View [dbo].[vw_Alert_Stats] ******/\n\
CREATE   VIEW [dbo].[vw_Alert_Stats] AS\n\
CREATE OR ALTER VIEW [dbo].[vw_Next_Critical_Event]\n\
CREATE TRIGGER [dbo].[trg_Alert_Insert] ON [dbo].[Alert]\n\
ALTER TABLE [dbo].[Orbit] WITH CHECK ADD CONSTRAINT [FK_Orbit_Asteroid]\n\
CREATE NONCLUSTERED INDEX [IX_Orbit] ON [dbo].[Orbit]\n";
        let inventory = ScriptInventory::from_script(script);
        assert_eq!(inventory.count(ObjectKind::Table), 2);
        assert_eq!(inventory.count(ObjectKind::View), 2);
        assert_eq!(inventory.count(ObjectKind::Trigger), 1);
        assert!(inventory
            .objects
            .contains(&(ObjectKind::Table, "Orbit".to_string())));
        assert!(inventory
            .objects
            .contains(&(ObjectKind::Trigger, "trg_Alert_Insert".to_string())));
    }
}
