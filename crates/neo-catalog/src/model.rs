//! Catalog entities stored in the NEOs database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column limits of the catalog schema.
pub mod limits {
    pub const CLASS_CODE: usize = 20;
    pub const CLASS_DESCRIPTION: usize = 255;
    pub const FULL_NAME: usize = 100;
    pub const PDES: usize = 50;
    pub const NAME: usize = 100;
    pub const PREFIX: usize = 10;
    pub const LOAD_ERROR_RAW: usize = 4000;
}

/// Column orders shared by the SQL writers and the script generator.
pub mod columns {
    pub const ASTEROID: [&str; 14] = [
        "id_internal",
        "spkid",
        "full_name",
        "pdes",
        "name",
        "prefix",
        "neo_flag",
        "pha_flag",
        "diameter",
        "absolute_magnitude",
        "albedo",
        "diameter_sigma",
        "created_at",
        "neo_id",
    ];

    pub const ORBIT: [&str; 36] = [
        "id_orbita",
        "epoch",
        "rms",
        "moid_ld",
        "epoch_mjd",
        "epoch_cal",
        "tp",
        "tp_cal",
        "per",
        "per_y",
        "equinox",
        "orbit_uncertainty",
        "condition_code",
        "e",
        "a",
        "q",
        "i",
        "om",
        "w",
        "ma",
        "ad",
        "n",
        "moid",
        "sigma_e",
        "sigma_a",
        "sigma_q",
        "sigma_i",
        "sigma_n",
        "sigma_ma",
        "sigma_om",
        "sigma_w",
        "sigma_ad",
        "sigma_tp",
        "sigma_per",
        "id_internal",
        "class",
    ];

    /// Orbit columns holding text.
    pub const ORBIT_TEXT: [&str; 2] = ["equinox", "class"];
}

/// Class assigned to new orbits that carry none.
pub const DEFAULT_CLASS: &str = "NEA";
pub const DEFAULT_CLASS_DESCRIPTION: &str = "Near Earth Asteroid";

/// Class used for MPCORB rows without an orbit type.
pub const UNKNOWN_CLASS: &str = "UNK";

pub const DEFAULT_EQUINOX: &str = "J2000";

/// `Class_Orbital` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrbitalClass {
    pub code: String,
    pub description: String,
}

/// `Asteroid` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asteroid {
    pub id_internal: i64,
    pub spkid: Option<i64>,
    /// JPL record id (e.g. `a0000433`).
    pub neo_id: Option<String>,
    pub full_name: String,
    /// Primary designation.
    pub pdes: String,
    pub name: Option<String>,
    pub prefix: String,
    pub neo_flag: String,
    pub pha_flag: String,
    pub diameter: Option<f64>,
    pub absolute_magnitude: Option<f64>,
    pub albedo: Option<f64>,
    pub diameter_sigma: Option<f64>,
}

fn fill_text(slot: &mut String, incoming: &str) {
    if slot.trim().is_empty() {
        *slot = incoming.to_string();
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if slot.is_none() {
        *slot = incoming.clone();
    }
}

impl Asteroid {
    /// Fill empty columns from `other`; keys and populated values stay.
    pub fn fill_missing(&mut self, other: &Asteroid) {
        fill_text(&mut self.full_name, &other.full_name);
        fill_text(&mut self.pdes, &other.pdes);
        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            self.name = other.name.clone().filter(|n| !n.trim().is_empty());
        }
        fill_text(&mut self.prefix, &other.prefix);
        fill_text(&mut self.neo_flag, &other.neo_flag);
        fill_text(&mut self.pha_flag, &other.pha_flag);
        fill(&mut self.diameter, &other.diameter);
        fill(&mut self.absolute_magnitude, &other.absolute_magnitude);
        fill(&mut self.albedo, &other.albedo);
        fill(&mut self.diameter_sigma, &other.diameter_sigma);
        fill(&mut self.neo_id, &other.neo_id);
        fill(&mut self.spkid, &other.spkid);
    }
}

/// One-sigma uncertainties of the orbital elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrbitSigmas {
    pub e: Option<f64>,
    pub a: Option<f64>,
    pub q: Option<f64>,
    pub i: Option<f64>,
    pub om: Option<f64>,
    pub w: Option<f64>,
    pub ma: Option<f64>,
    pub ad: Option<f64>,
    pub n: Option<f64>,
    pub tp: Option<f64>,
    pub per: Option<f64>,
}

impl OrbitSigmas {
    /// Keep existing values, filling gaps from `other`.
    pub fn fill_from(&mut self, other: &OrbitSigmas) {
        let pairs = [
            (&mut self.e, other.e),
            (&mut self.a, other.a),
            (&mut self.q, other.q),
            (&mut self.i, other.i),
            (&mut self.om, other.om),
            (&mut self.w, other.w),
            (&mut self.ma, other.ma),
            (&mut self.ad, other.ad),
            (&mut self.n, other.n),
            (&mut self.tp, other.tp),
            (&mut self.per, other.per),
        ];
        for (slot, value) in pairs {
            if slot.is_none() {
                *slot = value;
            }
        }
    }
}

/// `Orbit` row. Element columns are NOT NULL in the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orbit {
    /// `id_orbita`: JPL orbit id, `MPC:<designation>` or `MPC<seq>`.
    pub orbit_id: String,
    pub id_internal: Option<i64>,
    pub class: String,
    /// Epoch as Julian Date.
    pub epoch: f64,
    pub epoch_mjd: Option<f64>,
    pub epoch_cal: Option<NaiveDate>,
    pub equinox: String,
    pub rms: f64,
    pub moid: f64,
    pub moid_ld: f64,
    pub e: f64,
    pub a: f64,
    pub q: f64,
    pub i: f64,
    pub om: f64,
    pub w: f64,
    pub ma: f64,
    pub ad: f64,
    pub n: f64,
    pub tp: f64,
    pub tp_cal: NaiveDate,
    pub per: f64,
    pub per_y: f64,
    pub orbit_uncertainty: Option<i64>,
    pub condition_code: Option<i64>,
    pub sigmas: OrbitSigmas,
}

impl Orbit {
    /// Fill the nullable columns from `other`. Element columns are NOT NULL
    /// and always hold a value, so they are left alone.
    pub fn fill_missing(&mut self, other: &Orbit) {
        fill(&mut self.epoch_mjd, &other.epoch_mjd);
        fill(&mut self.epoch_cal, &other.epoch_cal);
        fill(&mut self.orbit_uncertainty, &other.orbit_uncertainty);
        fill(&mut self.condition_code, &other.condition_code);
        fill(&mut self.id_internal, &other.id_internal);
        fill_text(&mut self.equinox, &other.equinox);
        fill_text(&mut self.class, &other.class);
        self.sigmas.fill_from(&other.sigmas);
    }
}

/// How an existing catalog row is reconciled with incoming data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Incoming values replace stored ones.
    Overwrite,
    /// Incoming values only fill empty columns.
    FillMissing,
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Inserted,
    Updated,
    /// Row belongs to another asteroid and was left alone.
    Skipped,
}

/// Alert priority (`Priority` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    pub id: i32,
    pub name: String,
}

/// Alert level (`Level` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: i32,
    pub color: String,
    pub description: String,
}

/// Priority id treated as "high" by notifications.
pub const HIGH_PRIORITY_ID: i32 = 1;

/// Seed rows for `Priority`.
pub fn default_priorities() -> Vec<Priority> {
    [(1, "High"), (2, "Medium"), (3, "Low")]
        .into_iter()
        .map(|(id, name)| Priority {
            id,
            name: name.to_string(),
        })
        .collect()
}

/// Seed rows for `Level`.
pub fn default_levels() -> Vec<Level> {
    [(1, "G", "Green"), (2, "Y", "Yellow"), (3, "O", "Orange"), (4, "R", "Red")]
        .into_iter()
        .map(|(id, color, description)| Level {
            id,
            color: color.to_string(),
            description: description.to_string(),
        })
        .collect()
}

/// A row that could not be loaded, destined for `Load_Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadErrorRecord {
    pub source_file: String,
    pub row_number: usize,
    pub entity: String,
    pub message: String,
    pub raw_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmas_fill_from_keeps_existing() {
        let mut current = OrbitSigmas {
            e: Some(1.0),
            ..Default::default()
        };
        let incoming = OrbitSigmas {
            e: Some(9.0),
            a: Some(2.0),
            ..Default::default()
        };
        current.fill_from(&incoming);
        assert_eq!(current.e, Some(1.0));
        assert_eq!(current.a, Some(2.0));
        assert_eq!(current.q, None);
    }

    #[test]
    fn test_reference_seed_rows() {
        let priorities = default_priorities();
        assert_eq!(priorities[0].id, HIGH_PRIORITY_ID);
        assert_eq!(priorities[0].name, "High");
        let levels = default_levels();
        assert_eq!(levels.len(), 4);
        assert_eq!(levels[3].color, "R");
    }
}
