//! INSERT blocks and their placement in an SSMS-generated script.

use super::dataset::Dataset;
use super::literal::{self, required_text};
use crate::model::{columns, Asteroid, Orbit};

const CLASS_TABLE: &str = "[dbo].[Class_Orbital]";
const ASTEROID_TABLE: &str = "[dbo].[Asteroid]";
const ORBIT_TABLE: &str = "[dbo].[Orbit]";

/// Kind of data statement in a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertKind {
    Class,
    Asteroid,
    Orbit,
}

impl InsertKind {
    const ALL: [InsertKind; 3] = [InsertKind::Class, InsertKind::Asteroid, InsertKind::Orbit];

    /// Classify a script line by the table it inserts into.
    pub fn of_line(line: &str) -> Option<Self> {
        let s = line
            .trim_start()
            .trim_start_matches('\u{feff}')
            .to_lowercase();
        if s.starts_with("insert [dbo].[asteroid]") {
            Some(InsertKind::Asteroid)
        } else if s.starts_with("insert [dbo].[orbit]") {
            Some(InsertKind::Orbit)
        } else if s.starts_with("insert [dbo].[class_orbital]") {
            Some(InsertKind::Class)
        } else {
            None
        }
    }
}

fn column_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|c| format!("[{}]", c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn asteroid_values(a: &Asteroid) -> Vec<String> {
    vec![
        literal::int(Some(a.id_internal)),
        literal::int(a.spkid),
        required_text(&a.full_name),
        required_text(&a.pdes),
        literal::text(a.name.as_deref(), true, true),
        required_text(&a.prefix),
        required_text(&a.neo_flag),
        required_text(&a.pha_flag),
        literal::float(a.diameter),
        literal::float(a.absolute_magnitude),
        literal::float(a.albedo),
        literal::float(a.diameter_sigma),
        "SYSDATETIME()".to_string(),
        literal::text(a.neo_id.as_deref(), true, true),
    ]
}

fn orbit_values(o: &Orbit) -> Vec<String> {
    let f = |v: f64| literal::float(Some(v));
    let s = &o.sigmas;
    vec![
        required_text(&o.orbit_id),
        f(o.epoch),
        f(o.rms),
        f(o.moid_ld),
        literal::float(o.epoch_mjd),
        literal::date(o.epoch_cal),
        f(o.tp),
        literal::date(Some(o.tp_cal)),
        f(o.per),
        f(o.per_y),
        required_text(&o.equinox),
        literal::int(o.orbit_uncertainty),
        literal::int(o.condition_code),
        f(o.e),
        f(o.a),
        f(o.q),
        f(o.i),
        f(o.om),
        f(o.w),
        f(o.ma),
        f(o.ad),
        f(o.n),
        f(o.moid),
        literal::float(s.e),
        literal::float(s.a),
        literal::float(s.q),
        literal::float(s.i),
        literal::float(s.n),
        literal::float(s.ma),
        literal::float(s.om),
        literal::float(s.w),
        literal::float(s.ad),
        literal::float(s.tp),
        literal::float(s.per),
        literal::int(o.id_internal),
        required_text(&o.class),
    ]
}

fn insert(table: &str, columns: &str, values: &[String]) -> String {
    format!("INSERT {} ({}) VALUES ({});", table, columns, values.join(", "))
}

/// Generated INSERT statements, one per line, in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertBlocks {
    pub classes: Vec<String>,
    pub asteroids: Vec<String>,
    pub orbits: Vec<String>,
}

impl InsertBlocks {
    pub fn build(data: &Dataset) -> Self {
        let class_columns = column_list(&["class_description", "class"]);
        let asteroid_columns = column_list(&columns::ASTEROID);
        let orbit_columns = column_list(&columns::ORBIT);

        Self {
            classes: data
                .classes
                .iter()
                .map(|(code, description)| {
                    let values = [
                        literal::text(Some(description.as_str()), true, true),
                        required_text(code),
                    ];
                    insert(CLASS_TABLE, &class_columns, &values)
                })
                .collect(),
            asteroids: data
                .asteroids
                .values()
                .map(|a| insert(ASTEROID_TABLE, &asteroid_columns, &asteroid_values(a)))
                .collect(),
            orbits: data
                .orbits
                .values()
                .map(|o| insert(ORBIT_TABLE, &orbit_columns, &orbit_values(o)))
                .collect(),
        }
    }

    fn block(&self, kind: InsertKind) -> &[String] {
        match kind {
            InsertKind::Class => &self.classes,
            InsertKind::Asteroid => &self.asteroids,
            InsertKind::Orbit => &self.orbits,
        }
    }

    pub fn total(&self) -> usize {
        self.classes.len() + self.asteroids.len() + self.orbits.len()
    }
}

/// Nullable key columns of `Asteroid`: MPC-only rows have neither.
const RELAXED_ASTEROID_COLUMNS: [&str; 2] = ["[spkid]", "[neo_id]"];

/// Put `blocks` into `template`.
///
/// The first template INSERT of each kind is replaced by the generated block
/// and later ones of that kind are dropped. Kinds absent from the template
/// are appended. Inside the `Asteroid` table definition the key columns are
/// made nullable.
pub fn splice(template: &str, blocks: &InsertBlocks) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut placed = [false; 3];
    let mut in_asteroid = false;

    for line in template.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let stripped = line.trim();
        if stripped.starts_with("CREATE TABLE [dbo].[Asteroid]") {
            in_asteroid = true;
        }
        if in_asteroid {
            if stripped == ") ON [PRIMARY]" {
                in_asteroid = false;
            } else if stripped.contains("NOT NULL")
                && RELAXED_ASTEROID_COLUMNS
                    .iter()
                    .any(|col| stripped.starts_with(col))
            {
                out.push(line.replace("NOT NULL", "NULL"));
                continue;
            }
        }

        match InsertKind::of_line(line) {
            Some(kind) => {
                if !placed[kind as usize] {
                    out.extend(blocks.block(kind).iter().cloned());
                    placed[kind as usize] = true;
                }
            }
            None => out.push(line.to_string()),
        }
    }

    for kind in InsertKind::ALL {
        if !placed[kind as usize] {
            out.extend(blocks.block(kind).iter().cloned());
        }
    }

    let mut script = out.join("\n");
    if !out.is_empty() {
        script.push('\n');
    }
    script
}
