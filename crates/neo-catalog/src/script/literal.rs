//! T-SQL literals as written by SSMS "Generate Scripts".

use chrono::NaiveDate;

/// Unicode string literal.
///
/// Absent, blank or `NULL` values become `NULL` when `allow_null` and
/// `empty_as_null` both hold, otherwise `N''`.
pub fn text(value: Option<&str>, allow_null: bool, empty_as_null: bool) -> String {
    let Some(value) = value else {
        return if allow_null { "NULL" } else { "N''" }.to_string();
    };
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("null") {
        return if allow_null && empty_as_null {
            "NULL"
        } else {
            "N''"
        }
        .to_string();
    }
    format!("N'{}'", v.replace('\'', "''"))
}

/// Text for a NOT NULL column.
pub fn required_text(value: &str) -> String {
    text(Some(value), false, false)
}

/// Shortest representation that reads back as the same `f64`.
pub fn float(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:?}", v),
        _ => "NULL".to_string(),
    }
}

pub fn int(value: Option<i64>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| v.to_string())
}

pub fn date(value: Option<NaiveDate>) -> String {
    match value {
        Some(d) => format!("CAST(N'{}' AS Date)", d.format("%Y-%m-%d")),
        None => "NULL".to_string(),
    }
}
