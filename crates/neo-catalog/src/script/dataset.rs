//! Offline merge of a merged JPL+MPCORB export into catalog rows.

use crate::catalog::{AsteroidFields, ClassFields, IdentityResolver, OrbitElements};
use crate::error::Result;
use crate::ingest::DelimitedReader;
use crate::loader::mpcorb::MPCORB_ORBIT_PREFIX;
use crate::model::{Asteroid, Orbit};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Classes, asteroids and orbits of one export, keyed the way they are
/// scripted.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Class code to description; the first description seen wins.
    pub classes: BTreeMap<String, String>,
    pub asteroids: BTreeMap<i64, Asteroid>,
    pub orbits: BTreeMap<String, Orbit>,
}

impl Dataset {
    /// Build from CSV text.
    ///
    /// Rows with both JPL keys are identified by them; the rest by their MPC
    /// designation. Repeated rows fill gaps and never overwrite.
    pub fn from_csv(text: &str, today: NaiveDate) -> Result<Self> {
        let reader = DelimitedReader::open_semicolon_or_comma(text, true)?;
        let mut resolver = IdentityResolver::default();
        let mut data = Dataset::default();

        for record in reader.records() {
            let fields = AsteroidFields::from_record(&record);
            let designation = record.raw("designation").trim().to_string();
            let designation_full = record.raw("designation_full").trim().to_string();

            let keyed = if fields.has_keys() {
                resolver.resolve(fields.neo_id.as_deref(), fields.spkid)
            } else {
                None
            };
            let id_internal = match keyed {
                Some(id) => id,
                None => {
                    let key = [designation_full.as_str(), designation.as_str()]
                        .into_iter()
                        .find(|k| !k.is_empty())
                        .or(fields.neo_id.as_deref())
                        .unwrap_or("");
                    resolver.resolve_designation(key)
                }
            };

            let class = ClassFields::from_record(&record);
            if let Some(class) = class.to_class() {
                data.classes.entry(class.code).or_insert(class.description);
            }

            let mut asteroid = fields.into_asteroid(id_internal);
            asteroid.absolute_magnitude = asteroid.absolute_magnitude.or(Some(0.0));
            match data.asteroids.get_mut(&id_internal) {
                Some(current) => current.fill_missing(&asteroid),
                None => {
                    data.asteroids.insert(id_internal, asteroid);
                }
            }

            let orbit_id = match record.text("orbit_id") {
                Some(id) => id,
                None if !designation.is_empty() => format!("{}{}", MPCORB_ORBIT_PREFIX, designation),
                None if !designation_full.is_empty() => {
                    format!("{}{}", MPCORB_ORBIT_PREFIX, designation_full)
                }
                None => continue,
            };

            let orbit = OrbitElements::from_record(&record, today).into_orbit(
                orbit_id,
                Some(id_internal),
                &class.code,
            );
            match data.orbits.get_mut(&orbit.orbit_id) {
                Some(current) if current.id_internal != orbit.id_internal => {
                    debug!(
                        "Line {}: orbit {} already belongs to asteroid {:?}",
                        record.line, orbit.orbit_id, current.id_internal
                    );
                }
                Some(current) => current.fill_missing(&orbit),
                None => {
                    data.orbits.insert(orbit.orbit_id.clone(), orbit);
                }
            }
        }

        Ok(data)
    }
}
