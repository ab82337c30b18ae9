//! Epoch conversions and orbital element derivations.

use chrono::{Duration, NaiveDate};

/// Offset between Julian Date and Modified Julian Date.
pub const JD_MJD_OFFSET: f64 = 2_400_000.5;

/// Days in a Julian year.
pub const DAYS_PER_JULIAN_YEAR: f64 = 365.25;

/// MJD 0.
pub fn mjd_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1858, 11, 17).unwrap_or(NaiveDate::MIN)
}

/// Decode an MPC packed epoch such as `K25BL` (2025-11-21).
///
/// Layout: century letter (`I` 1800, `J` 1900, `K` 2000), two year digits,
/// then month and day each as `1`-`9` or `A` (10) onward.
pub fn unpack_mpc_epoch(packed: &str) -> Option<NaiveDate> {
    let packed = packed.trim();
    let chars: Vec<char> = packed.chars().collect();
    if chars.len() != 5 {
        return None;
    }

    let century = match chars[0] {
        'I' => 1800,
        'J' => 1900,
        'K' => 2000,
        _ => return None,
    };
    let yy = chars[1].to_digit(10)? * 10 + chars[2].to_digit(10)?;

    let decode = |c: char| -> Option<u32> {
        match c {
            '1'..='9' => c.to_digit(10),
            'A'..='Z' => Some(10 + (c as u32 - 'A' as u32)),
            _ => None,
        }
    };
    let month = decode(chars[3])?;
    let day = decode(chars[4])?;

    NaiveDate::from_ymd_opt(century + yy as i32, month, day)
}

/// Whole days since MJD 0.
pub fn date_to_mjd(date: NaiveDate) -> f64 {
    (date - mjd_epoch()).num_days() as f64
}

/// Calendar date of an MJD, truncating the day fraction toward zero.
pub fn mjd_to_date(mjd: f64) -> Option<NaiveDate> {
    if !mjd.is_finite() {
        return None;
    }
    mjd_epoch().checked_add_signed(Duration::try_days(mjd.trunc() as i64)?)
}

pub fn mjd_to_jd(mjd: f64) -> f64 {
    mjd + JD_MJD_OFFSET
}

pub fn jd_to_mjd(jd: f64) -> f64 {
    jd - JD_MJD_OFFSET
}

/// q = a(1 - e)
pub fn perihelion_distance(a: f64, e: f64) -> f64 {
    a * (1.0 - e)
}

/// Q = a(1 + e)
pub fn aphelion_distance(a: f64, e: f64) -> f64 {
    a * (1.0 + e)
}

/// Orbital period in days from the mean motion in degrees/day.
pub fn period_days(mean_motion: f64) -> Option<f64> {
    (mean_motion != 0.0).then(|| 360.0 / mean_motion)
}

pub fn period_years(period_days: f64) -> f64 {
    period_days / DAYS_PER_JULIAN_YEAR
}

/// Time of perihelion passage (JD) from the epoch, mean anomaly (deg) and
/// mean motion (deg/day).
pub fn perihelion_time(epoch_jd: f64, mean_anomaly: f64, mean_motion: f64) -> Option<f64> {
    (mean_motion != 0.0).then(|| epoch_jd - mean_anomaly / mean_motion)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_unpack_mpc_epoch() {
        assert_eq!(unpack_mpc_epoch("K25BL"), Some(ymd(2025, 11, 21)));
        assert_eq!(unpack_mpc_epoch("J9611"), Some(ymd(1996, 1, 1)));
        assert_eq!(unpack_mpc_epoch(" I99CV "), Some(ymd(1899, 12, 31)));
        assert_eq!(unpack_mpc_epoch("K2520"), None);
        assert_eq!(unpack_mpc_epoch("K252U"), None);
        assert_eq!(unpack_mpc_epoch("L25BL"), None);
        assert_eq!(unpack_mpc_epoch("K25B"), None);
        assert_eq!(unpack_mpc_epoch("KX5BL"), None);
    }

    #[test]
    fn test_mjd_round_trip_reference_dates() {
        assert_eq!(date_to_mjd(ymd(1858, 11, 17)), 0.0);
        assert_eq!(date_to_mjd(ymd(2000, 1, 1)), 51544.0);
        assert_eq!(mjd_to_date(51544.9), Some(ymd(2000, 1, 1)));
        assert_eq!(mjd_to_jd(51544.0), 2451544.5);
        assert_eq!(mjd_to_date(f64::NAN), None);
    }

    #[test]
    fn test_derived_elements() {
        assert!((perihelion_distance(1.458, 0.2229) - 1.1330118).abs() < 1e-6);
        assert!((aphelion_distance(1.458, 0.2229) - 1.7829882).abs() < 1e-6);
        assert_eq!(period_days(0.5), Some(720.0));
        assert_eq!(period_days(0.0), None);
        assert!((period_years(365.25) - 1.0).abs() < 1e-12);
        assert_eq!(perihelion_time(2460000.5, 90.0, 0.5), Some(2459820.5));
        assert_eq!(perihelion_time(2460000.5, 90.0, 0.0), None);
    }
}
