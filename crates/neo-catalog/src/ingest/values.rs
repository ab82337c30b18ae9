//! Lenient scalar parsing for catalog exports.
//!
//! Empty cells and the literal `NULL` (any case) mean "no value". Unparseable
//! numbers are treated the same way instead of failing the row.

use chrono::{NaiveDate, NaiveDateTime};

fn present(raw: &str) -> Option<&str> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(value)
    }
}

/// Parse a float.
pub fn parse_float(raw: &str) -> Option<f64> {
    present(raw)?.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parse an integer, accepting float notation (`"2000433.0"`) and truncating.
pub fn parse_int(raw: &str) -> Option<i64> {
    let value = present(raw)?;
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    let f = value.parse::<f64>().ok()?;
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Parse a calendar date.
///
/// JPL exports use `YYYYMMDD` optionally followed by a day fraction
/// (`20250101.5`); other tools write ISO or European dates.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = present(raw)?;
    let head = value.get(..8);
    if let Some(head) = head.filter(|h| h.bytes().all(|b| b.is_ascii_digit())) {
        return NaiveDate::parse_from_str(head, "%Y%m%d").ok();
    }
    ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Parse an operator-entered timestamp.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Trimmed text, or none when blank or `NULL`.
pub fn norm_text(raw: &str) -> Option<String> {
    present(raw).map(str::to_string)
}

/// Normalize a Y/N flag; anything else becomes `N`.
pub fn norm_flag(raw: &str) -> String {
    match raw.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('Y') => "Y".to_string(),
        _ => "N".to_string(),
    }
}

/// Truncate to at most `max` characters.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
