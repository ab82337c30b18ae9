//! SQL script generation, batching and restore.
//!
//! `generate` rewrites an SSMS "Generate Scripts" export so that its data
//! section reflects a merged CSV. The result is a plain text script that can
//! be committed and later replayed with `apply_script`.

pub mod batches;
pub mod dataset;
pub mod literal;
pub mod render;
pub mod restore;

pub use batches::{split_batches, Batch};
pub use dataset::Dataset;
pub use render::{splice, InsertBlocks, InsertKind};
pub use restore::{
    apply_script, verify_objects, ApplyOptions, ApplyReport, ObjectKind, ScriptInventory,
    ScriptTarget, VerifyReport,
};

use crate::error::Result;
use crate::ingest::read_text;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Read a script, honouring UTF-8 and UTF-16 byte-order marks.
pub fn read_script<P: AsRef<Path>>(path: P) -> Result<String> {
    read_text(path)
}

/// Counts of a generated script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateReport {
    pub output: String,
    pub classes: usize,
    pub asteroids: usize,
    pub orbits: usize,
}

/// Merge `csv` into `template` and write the script to `output`.
pub fn generate(template: &Path, csv: &Path, output: &Path, today: NaiveDate) -> Result<GenerateReport> {
    info!("Loading CSV data from {}", csv.display());
    let data = Dataset::from_csv(&read_text(csv)?, today)?;
    info!(
        "Classes: {} | Asteroids: {} | Orbits: {}",
        data.classes.len(),
        data.asteroids.len(),
        data.orbits.len()
    );

    let blocks = InsertBlocks::build(&data);
    let script = splice(&read_script(template)?, &blocks);
    std::fs::write(output, script)?;
    info!("Wrote {}", output.display());

    Ok(GenerateReport {
        output: output.display().to_string(),
        classes: blocks.classes.len(),
        asteroids: blocks.asteroids.len(),
        orbits: blocks.orbits.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_generate_writes_spliced_script() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("NEOs_database.sql");
        let csv = dir.path().join("merged.csv");
        let output = dir.path().join("NEOs_database_correct.sql");

        // UTF-16LE with BOM, as SSMS saves it.
        let template_text = "USE [NEOs]\r\nGO\r\nINSERT [dbo].[Asteroid] ([id_internal]) VALUES (99)\r\nGO\r\n";
        let mut bytes = vec![0xFF, 0xFE];
        for unit in template_text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(&template, bytes).unwrap();
        fs::write(&csv, "id;spkid;full_name;orbit_id;epoch_mjd;class\na1;11;One;JPL 1;60000;AMO\n").unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let report = generate(&template, &csv, &output, today).unwrap();
        assert_eq!((report.classes, report.asteroids, report.orbits), (1, 1, 1));

        let script = fs::read_to_string(&output).unwrap();
        assert!(script.starts_with("USE [NEOs]\nGO\nINSERT [dbo].[Asteroid] ("));
        assert!(!script.contains("VALUES (99)"));
        assert!(script.contains("INSERT [dbo].[Orbit] ("));
        assert!(script.trim_end().ends_with("N'AMO');"));

        let batches = split_batches(&script);
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_generate_rejects_empty_csv() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.sql");
        let csv = dir.path().join("empty.csv");
        fs::write(&template, "GO\n").unwrap();
        fs::write(&csv, "\n").unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(generate(&template, &csv, &dir.path().join("out.sql"), today).is_err());
    }
}
