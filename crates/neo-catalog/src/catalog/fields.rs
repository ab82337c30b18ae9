//! Mapping of export rows onto catalog entities.
//!
//! JPL small-body exports and MPCORB exports name the same orbital elements
//! differently (`e` vs `eccentricity`); merged files carry both. Readers here
//! accept either spelling and derive whatever can be computed from the rest.

use crate::astro;
use crate::ingest::values::{norm_flag, truncate_chars};
use crate::ingest::Record;
use crate::model::{
    limits, Asteroid, Orbit, OrbitSigmas, OrbitalClass, DEFAULT_CLASS, DEFAULT_EQUINOX,
    UNKNOWN_CLASS,
};
use chrono::NaiveDate;

/// Placeholder for rows that carry no usable name.
pub const UNKNOWN_NAME: &str = "UNKNOWN";

/// Split `"(433) Eros"` into `("433", "Eros")`. Values without a leading
/// parenthesised number come back as `("", value)`.
pub fn split_designation_full(value: &str) -> (String, String) {
    let v = value.trim();
    if let Some(inner) = v.strip_prefix('(') {
        if let Some(close) = inner.find(')') {
            let number = inner[..close].trim().to_string();
            let rest = inner[close + 1..].trim().to_string();
            return (number, rest);
        }
    }
    (String::new(), v.to_string())
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| !c.trim().is_empty())
}

/// Asteroid columns read from one export row.
#[derive(Debug, Clone, PartialEq)]
pub struct AsteroidFields {
    pub neo_id: Option<String>,
    pub spkid: Option<i64>,
    pub full_name: String,
    pub pdes: String,
    pub name: Option<String>,
    pub prefix: String,
    pub neo_flag: String,
    pub pha_flag: String,
    pub h: Option<f64>,
    pub diameter: Option<f64>,
    pub albedo: Option<f64>,
    pub diameter_sigma: Option<f64>,
}

impl AsteroidFields {
    pub fn from_record(record: &Record) -> Self {
        let designation = record.text("designation").unwrap_or_default();
        let designation_full = record.text("designation_full").unwrap_or_default();

        let full_name = match record.text("full_name") {
            Some(name) => name,
            None => first_non_empty(&[designation_full.as_str(), designation.as_str()])
                .unwrap_or(UNKNOWN_NAME)
                .to_string(),
        };

        let pdes = match record.text("pdes") {
            Some(pdes) => pdes,
            None => {
                let (number, rest) = split_designation_full(&designation_full);
                first_non_empty(&[designation.as_str(), number.as_str(), rest.as_str()])
                    .unwrap_or(UNKNOWN_NAME)
                    .to_string()
            }
        };

        Self {
            neo_id: record.text("id"),
            spkid: record.int("spkid"),
            full_name: truncate_chars(&full_name, limits::FULL_NAME),
            pdes: truncate_chars(&pdes, limits::PDES),
            name: record
                .text("name")
                .map(|n| truncate_chars(&n, limits::NAME)),
            prefix: truncate_chars(&record.text("prefix").unwrap_or_default(), limits::PREFIX),
            neo_flag: norm_flag(record.raw("neo")),
            pha_flag: norm_flag(record.raw("pha")),
            h: record.first_float(&["h", "abs_mag"]),
            diameter: record.float("diameter"),
            albedo: record.float("albedo"),
            diameter_sigma: record.float("diameter_sigma"),
        }
    }

    /// Both JPL keys present.
    pub fn has_keys(&self) -> bool {
        self.neo_id.is_some() && self.spkid.is_some()
    }

    pub fn into_asteroid(self, id_internal: i64) -> Asteroid {
        Asteroid {
            id_internal,
            spkid: self.spkid,
            neo_id: self.neo_id,
            full_name: self.full_name,
            pdes: self.pdes,
            name: self.name,
            prefix: self.prefix,
            neo_flag: self.neo_flag,
            pha_flag: self.pha_flag,
            diameter: self.diameter,
            absolute_magnitude: self.h,
            albedo: self.albedo,
            diameter_sigma: self.diameter_sigma,
        }
    }
}

/// Orbital class columns of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFields {
    /// Empty when the row carries no class.
    pub code: String,
    pub description: String,
}

impl ClassFields {
    pub fn from_record(record: &Record) -> Self {
        let orbit_type = record.raw("orbit_type").trim().to_string();
        let mut code = truncate_chars(record.raw("class").trim(), limits::CLASS_CODE);
        if code.is_empty() && !orbit_type.is_empty() {
            code = truncate_chars(&orbit_type, limits::CLASS_CODE);
        }
        let description = first_non_empty(&[
            record.raw("class_description"),
            orbit_type.as_str(),
            code.as_str(),
        ])
        .unwrap_or("")
            .trim()
            .to_string();
        Self { code, description }
    }

    /// The class to ensure in `Class_Orbital`, if any.
    pub fn to_class(&self) -> Option<OrbitalClass> {
        if self.code.is_empty() {
            return None;
        }
        let description = if self.description.is_empty() {
            &self.code
        } else {
            &self.description
        };
        Some(OrbitalClass {
            code: truncate_chars(&self.code, limits::CLASS_CODE),
            description: truncate_chars(description, limits::CLASS_DESCRIPTION),
        })
    }
}

/// Orbital elements as read from a row, before NOT NULL defaults apply.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitElements {
    /// Julian Date.
    pub epoch: Option<f64>,
    pub epoch_mjd: Option<f64>,
    pub epoch_cal: Option<NaiveDate>,
    pub equinox: String,
    pub rms: Option<f64>,
    pub moid: Option<f64>,
    pub moid_ld: Option<f64>,
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
    pub tp_cal: NaiveDate,
    pub per: Option<f64>,
    pub per_y: Option<f64>,
    pub orbit_uncertainty: Option<i64>,
    pub sigmas: OrbitSigmas,
}

impl OrbitElements {
    /// Read a JPL or merged JPL+MPCORB row.
    ///
    /// `today` backs `tp_cal` when neither the row nor the epoch yields one.
    pub fn from_record(record: &Record, today: NaiveDate) -> Self {
        let mut epoch = record.float("epoch");
        let mut epoch_mjd = record.float("epoch_mjd");
        let mut epoch_cal = record.date("epoch_cal");

        if epoch.is_none() {
            epoch = epoch_mjd.map(astro::mjd_to_jd);
        }
        if epoch.is_none() && epoch_cal.is_none() {
            if let Some(cal) = astro::unpack_mpc_epoch(record.raw("epoch_mpc")) {
                let mjd = astro::date_to_mjd(cal);
                epoch_cal = Some(cal);
                epoch_mjd = Some(mjd);
                epoch = Some(astro::mjd_to_jd(mjd));
            }
        }

        let e = record.first_float(&["e", "eccentricity"]);
        let a = record.first_float(&["a", "semi_major_axis"]);
        let ma = record.first_float(&["ma", "mean_anomaly"]);
        let n = record.first_float(&["n", "mean_motion"]);

        let q = record
            .float("q")
            .or_else(|| Some(astro::perihelion_distance(a?, e?)));
        let ad = record
            .float("ad")
            .or_else(|| Some(astro::aphelion_distance(a?, e?)));

        let mut per = record.float("per");
        let mut per_y = record.float("per_y");
        if per.is_none() {
            if let Some(days) = n.and_then(astro::period_days) {
                per = Some(days);
                per_y = Some(astro::period_years(days));
            }
        }

        let mut tp = record.float("tp");
        let mut tp_cal = record.date("tp_cal");
        if tp.is_none() {
            // A zero epoch is a placeholder, not a date to count back from.
            if let (Some(epoch_jd), Some(ma), Some(n)) = (epoch.filter(|jd| *jd != 0.0), ma, n) {
                if let Some(tp_jd) = astro::perihelion_time(epoch_jd, ma, n) {
                    tp = Some(tp_jd);
                    tp_cal = astro::mjd_to_date(astro::jd_to_mjd(tp_jd)).or(tp_cal);
                }
            }
        }

        Self {
            epoch,
            epoch_mjd,
            epoch_cal,
            equinox: record
                .text("equinox")
                .unwrap_or_else(|| DEFAULT_EQUINOX.to_string()),
            rms: record.first_float(&["rms", "rms_residual"]),
            moid: record.float("moid"),
            moid_ld: record.float("moid_ld"),
            e,
            a,
            q,
            i: record.first_float(&["i", "inclination"]),
            om: record.first_float(&["om", "long_asc_node"]),
            w: record.first_float(&["w", "arg_perihelion"]),
            ma,
            ad,
            n,
            tp,
            tp_cal: tp_cal.or(epoch_cal).unwrap_or(today),
            per,
            per_y,
            orbit_uncertainty: record.int("uncertainty"),
            sigmas: OrbitSigmas {
                e: record.float("sigma_e"),
                a: record.float("sigma_a"),
                q: record.float("sigma_q"),
                i: record.float("sigma_i"),
                om: record.float("sigma_om"),
                w: record.float("sigma_w"),
                ma: record.float("sigma_ma"),
                ad: record.float("sigma_ad"),
                n: record.float("sigma_n"),
                tp: record.float("sigma_tp"),
                per: record.float("sigma_per"),
            },
        }
    }

    /// Read a row of an MPCORB export, whose `epoch` column is packed.
    pub fn from_mpcorb(record: &Record, today: NaiveDate) -> Self {
        let epoch_cal = astro::unpack_mpc_epoch(record.raw("epoch"));
        let epoch_mjd = epoch_cal.map(astro::date_to_mjd).unwrap_or(0.0);
        let epoch_jd = astro::mjd_to_jd(epoch_mjd);

        let e = record.float("eccentricity").unwrap_or(0.0);
        let a = record.float("semi_major_axis").unwrap_or(0.0);
        let ma = record.float("mean_anomaly").unwrap_or(0.0);
        let n = record.float("mean_motion").unwrap_or(0.0);

        let (q, ad) = if a != 0.0 {
            (
                astro::perihelion_distance(a, e),
                astro::aphelion_distance(a, e),
            )
        } else {
            (0.0, 0.0)
        };
        let per = astro::period_days(n).unwrap_or(0.0);
        let per_y = astro::period_years(per);

        let fallback_cal = epoch_cal.unwrap_or(today);
        let (tp, tp_cal) = match astro::perihelion_time(epoch_jd, ma, n) {
            Some(tp_jd) => (
                tp_jd,
                astro::mjd_to_date(astro::jd_to_mjd(tp_jd)).unwrap_or(fallback_cal),
            ),
            None => (epoch_jd, fallback_cal),
        };

        Self {
            epoch: Some(epoch_jd),
            epoch_mjd: Some(epoch_mjd),
            epoch_cal,
            equinox: DEFAULT_EQUINOX.to_string(),
            rms: record.float("rms_residual"),
            moid: None,
            moid_ld: None,
            e: Some(e),
            a: Some(a),
            q: Some(q),
            i: record.float("inclination"),
            om: record.float("long_asc_node"),
            w: record.float("arg_perihelion"),
            ma: Some(ma),
            ad: Some(ad),
            n: Some(n),
            tp: Some(tp),
            tp_cal,
            per: Some(per),
            per_y: Some(per_y),
            orbit_uncertainty: record.int("uncertainty"),
            sigmas: OrbitSigmas::default(),
        }
    }

    /// Build an `Orbit` row, defaulting NOT NULL columns.
    pub fn into_orbit(self, orbit_id: String, id_internal: Option<i64>, class: &str) -> Orbit {
        let class = if class.trim().is_empty() {
            DEFAULT_CLASS.to_string()
        } else {
            class.trim().to_string()
        };
        Orbit {
            orbit_id,
            id_internal,
            class,
            epoch: self.epoch.or(self.epoch_mjd).unwrap_or(0.0),
            epoch_mjd: self.epoch_mjd,
            epoch_cal: self.epoch_cal,
            equinox: self.equinox,
            rms: self.rms.unwrap_or(0.0),
            moid: self.moid.unwrap_or(0.0),
            moid_ld: self.moid_ld.unwrap_or(0.0),
            e: self.e.unwrap_or(0.0),
            a: self.a.unwrap_or(0.0),
            q: self.q.unwrap_or(0.0),
            i: self.i.unwrap_or(0.0),
            om: self.om.unwrap_or(0.0),
            w: self.w.unwrap_or(0.0),
            ma: self.ma.unwrap_or(0.0),
            ad: self.ad.unwrap_or(0.0),
            n: self.n.unwrap_or(0.0),
            tp: self.tp.unwrap_or(0.0),
            tp_cal: self.tp_cal,
            per: self.per.unwrap_or(0.0),
            per_y: self.per_y.unwrap_or(0.0),
            orbit_uncertainty: self.orbit_uncertainty,
            condition_code: None,
            sigmas: self.sigmas,
        }
    }
}

/// Class of an MPCORB row: its `orbit_type`, or `UNK`.
pub fn mpcorb_class(record: &Record) -> OrbitalClass {
    let orbit_type = record.raw("orbit_type").trim();
    let code = if orbit_type.is_empty() {
        UNKNOWN_CLASS.to_string()
    } else {
        truncate_chars(orbit_type, limits::CLASS_CODE)
    };
    let description = if orbit_type.is_empty() { &code } else { orbit_type };
    OrbitalClass {
        description: truncate_chars(description, limits::CLASS_DESCRIPTION),
        code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(pairs: &[(&str, &str)]) -> Record {
        let header = pairs.iter().map(|(k, _)| k.to_string()).collect();
        let values = pairs.iter().map(|(_, v)| v.to_string()).collect();
        Record::new(2, Arc::new(header), values)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    #[test]
    fn test_split_designation_full() {
        assert_eq!(
            split_designation_full("(433) Eros"),
            ("433".to_string(), "Eros".to_string())
        );
        assert_eq!(
            split_designation_full(" 2024 AB1 "),
            (String::new(), "2024 AB1".to_string())
        );
        assert_eq!(
            split_designation_full("(99942"),
            (String::new(), "(99942".to_string())
        );
    }

    #[test]
    fn test_asteroid_fields_from_jpl_row() {
        let row = record(&[
            ("id", "a0000433"),
            ("spkid", "2000433"),
            ("full_name", "   433 Eros (A898 PA)"),
            ("pdes", "433"),
            ("name", "Eros"),
            ("neo", "y"),
            ("pha", "x"),
            ("h", "10.4"),
            ("diameter", "16.84"),
        ]);
        let fields = AsteroidFields::from_record(&row);
        assert!(fields.has_keys());
        assert_eq!(fields.full_name, "433 Eros (A898 PA)");
        assert_eq!(fields.neo_flag, "Y");
        assert_eq!(fields.pha_flag, "N");
        assert_eq!(fields.prefix, "");
        assert_eq!(fields.h, Some(10.4));

        let asteroid = fields.into_asteroid(7);
        assert_eq!(asteroid.id_internal, 7);
        assert_eq!(asteroid.neo_id.as_deref(), Some("a0000433"));
        assert_eq!(asteroid.absolute_magnitude, Some(10.4));
    }

    #[test]
    fn test_asteroid_fields_designation_fallbacks() {
        let row = record(&[
            ("id", ""),
            ("spkid", "NULL"),
            ("designation_full", "(433) Eros"),
            ("abs_mag", "10.3"),
        ]);
        let fields = AsteroidFields::from_record(&row);
        assert!(!fields.has_keys());
        assert_eq!(fields.full_name, "(433) Eros");
        assert_eq!(fields.pdes, "433");
        assert_eq!(fields.h, Some(10.3));

        let empty = AsteroidFields::from_record(&record(&[("id", "")]));
        assert_eq!(empty.full_name, UNKNOWN_NAME);
        assert_eq!(empty.pdes, UNKNOWN_NAME);
    }

    #[test]
    fn test_class_fields() {
        let jpl = ClassFields::from_record(&record(&[("class", "APO"), ("class_description", "")]));
        assert_eq!(
            jpl.to_class(),
            Some(OrbitalClass {
                code: "APO".into(),
                description: "APO".into()
            })
        );

        let mpc = ClassFields::from_record(&record(&[("class", ""), ("orbit_type", "Apollo")]));
        assert_eq!(mpc.code, "Apollo");
        assert_eq!(mpc.description, "Apollo");

        assert_eq!(ClassFields::from_record(&record(&[])).to_class(), None);
    }

    #[test]
    fn test_orbit_elements_derivations_from_mpc_columns() {
        let row = record(&[
            ("epoch", ""),
            ("epoch_mpc", "K25BL"),
            ("eccentricity", "0.2"),
            ("semi_major_axis", "2.0"),
            ("mean_anomaly", "10"),
            ("mean_motion", "0.5"),
            ("rms_residual", "0.4"),
        ]);
        let el = OrbitElements::from_record(&row, today());
        let cal = NaiveDate::from_ymd_opt(2025, 11, 21).unwrap();
        assert_eq!(el.epoch_cal, Some(cal));
        assert_eq!(el.epoch_mjd, Some(astro::date_to_mjd(cal)));
        assert_eq!(el.epoch, Some(astro::date_to_mjd(cal) + astro::JD_MJD_OFFSET));
        assert!((el.q.unwrap() - 1.6).abs() < 1e-12);
        assert!((el.ad.unwrap() - 2.4).abs() < 1e-12);
        assert_eq!(el.per, Some(720.0));
        assert_eq!(el.tp, Some(el.epoch.unwrap() - 20.0));
        assert_eq!(el.tp_cal, cal - chrono::Duration::days(20));
        assert_eq!(el.rms, Some(0.4));
        assert_eq!(el.equinox, "J2000");
    }

    #[test]
    fn test_orbit_elements_epoch_from_mjd_and_today_fallback() {
        let row = record(&[("epoch_mjd", "60000"), ("e", "0.1")]);
        let el = OrbitElements::from_record(&row, today());
        assert_eq!(el.epoch, Some(2_460_000.5));
        assert_eq!(el.tp, None);
        assert_eq!(el.tp_cal, today());
    }

    #[test]
    fn test_zero_epoch_does_not_derive_perihelion_time() {
        let row = record(&[("epoch", "0"), ("ma", "10"), ("n", "0.5")]);
        let el = OrbitElements::from_record(&row, today());
        assert_eq!(el.epoch, Some(0.0));
        assert_eq!(el.tp, None);
        assert_eq!(el.tp_cal, today());

        let orbit = el.into_orbit("MPC2".into(), None, "AMO");
        assert_eq!(orbit.tp, 0.0);
    }

    #[test]
    fn test_into_orbit_defaults() {
        let el = OrbitElements::from_record(&record(&[("epoch_cal", "20250101")]), today());
        let orbit = el.into_orbit("MPC1".into(), None, "  ");
        assert_eq!(orbit.class, DEFAULT_CLASS);
        assert_eq!(orbit.epoch, 0.0);
        assert_eq!(orbit.e, 0.0);
        assert_eq!(orbit.tp_cal, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(orbit.condition_code, None);
    }

    #[test]
    fn test_from_mpcorb() {
        let row = record(&[
            ("designation", "00433"),
            ("epoch", "K25BL"),
            ("eccentricity", "0.2"),
            ("semi_major_axis", "2.0"),
            ("mean_anomaly", "0"),
            ("mean_motion", "0"),
            ("uncertainty", "0"),
        ]);
        let el = OrbitElements::from_mpcorb(&row, today());
        let cal = NaiveDate::from_ymd_opt(2025, 11, 21).unwrap();
        assert_eq!(el.epoch_cal, Some(cal));
        assert_eq!(el.per, Some(0.0));
        assert_eq!(el.tp, el.epoch);
        assert_eq!(el.tp_cal, cal);
        assert_eq!(el.orbit_uncertainty, Some(0));

        let bad_epoch = OrbitElements::from_mpcorb(&record(&[("epoch", "??")]), today());
        assert_eq!(bad_epoch.epoch, Some(astro::JD_MJD_OFFSET));
        assert_eq!(bad_epoch.epoch_cal, None);
        assert_eq!(bad_epoch.tp_cal, today());
    }

    #[test]
    fn test_mpcorb_class() {
        assert_eq!(mpcorb_class(&record(&[])).code, UNKNOWN_CLASS);
        let class = mpcorb_class(&record(&[("orbit_type", "Amor")]));
        assert_eq!(class.code, "Amor");
        assert_eq!(class.description, "Amor");
    }
}
