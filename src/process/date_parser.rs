use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::process::utils::clean_str;

/// Portuguese month abbreviations as they appear in the index sheets
/// (`jan/24`, `fev/2024`), with English fallbacks for the ones that differ.
const MONTHS: &[(&str, u32)] = &[
    ("jan", 1),
    ("fev", 2),
    ("feb", 2),
    ("mar", 3),
    ("abr", 4),
    ("apr", 4),
    ("mai", 5),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("ago", 8),
    ("aug", 8),
    ("set", 9),
    ("sep", 9),
    ("out", 10),
    ("oct", 10),
    ("nov", 11),
    ("dez", 12),
    ("dec", 12),
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Largest serial Excel accepts (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

/// Excel's day-serial → calendar date (1900 date system, epoch 1899-12-30).
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > EXCEL_MAX_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parse a date cell written as text. Month-only forms land on day 1.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = clean_str(raw);
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&s, fmt) {
            return Some(d);
        }
    }
    if let Some(dt) = parse_naive_datetime(&s) {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    parse_year_month(&s).or_else(|| parse_month_abbrev(&s))
}

/// Parse a timestamp cell. Bare dates become midnight UTC; naive
/// date-times are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = clean_str(raw);
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = parse_naive_datetime(&s) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    parse_date(&s)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// `MM/YYYY`, `YYYY-MM`, `YYYY/MM`.
fn parse_year_month(s: &str) -> Option<NaiveDate> {
    let (a, b) = s.split_once(['/', '-'])?;
    if !a.chars().all(|c| c.is_ascii_digit()) || !b.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (year, month) = match (a.len(), b.len()) {
        (4, 1..=2) => (a.parse().ok()?, b.parse().ok()?),
        (1..=2, 4) => (b.parse().ok()?, a.parse().ok()?),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// `jan/24`, `fev-2024`, `março 2024`.
fn parse_month_abbrev(s: &str) -> Option<NaiveDate> {
    let lower = s.to_lowercase();
    let split_at = lower.find(|c: char| c == '/' || c == '-' || c == ' ' || c == '.')?;
    let (name, rest) = lower.split_at(split_at);
    let year_part = rest.trim_start_matches(|c: char| c == '/' || c == '-' || c == ' ' || c == '.');

    let prefix: String = name.chars().take(3).collect();
    let month = MONTHS
        .iter()
        .find(|(abbrev, _)| *abbrev == prefix)
        .map(|(_, m)| *m)?;

    if year_part.is_empty() || !year_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = match year_part.len() {
        2 => {
            let yy: i32 = year_part.parse().ok()?;
            if yy < 70 {
                2000 + yy
            } else {
                1900 + yy
            }
        }
        4 => year_part.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}
