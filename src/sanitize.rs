//! Column-name and cell normalization into warehouse-safe forms.
//!
//! Both functions are pure. `sanitize_scalar` is total: it yields a typed
//! value or an explicit `TypedValue::Null`, never NaN.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::process::date_parser::{excel_serial_to_date, parse_date, parse_timestamp};
use crate::process::raw_table::RawValue;
use crate::process::typed_table::TypedValue;
use crate::process::utils::{clean_str, is_null_token, parse_number};
use crate::schema::SemanticType;

static INVALID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());
static REPEATED_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Lowercase, fold accents to ASCII, replace anything outside `[a-z0-9_]`
/// with `_` and collapse repeated `_`.
///
/// `"Índice (%)"` becomes `"indice_"`. Idempotent; never returns an empty
/// string.
pub fn sanitize_column_name(raw: &str) -> String {
    let folded: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    let replaced = INVALID_CHARS.replace_all(&folded, "_");
    let collapsed = REPEATED_SEPARATORS.replace_all(&replaced, "_");
    if collapsed.is_empty() {
        "_".to_string()
    } else {
        collapsed.into_owned()
    }
}

/// Coerce one raw cell into `target`, or `Null` when that is impossible.
pub fn sanitize_scalar(value: &RawValue, target: SemanticType) -> TypedValue {
    match (value, target) {
        (RawValue::Missing, _) => TypedValue::Null,

        (RawValue::Number(n), SemanticType::Float64) if n.is_finite() => TypedValue::Float(*n),
        (RawValue::Text(s), SemanticType::Float64) => {
            parse_number(s).map_or(TypedValue::Null, TypedValue::Float)
        }

        (RawValue::Number(n), SemanticType::Date) => {
            excel_serial_to_date(*n).map_or(TypedValue::Null, TypedValue::Date)
        }
        (RawValue::Text(s), SemanticType::Date) => {
            parse_date(s).map_or(TypedValue::Null, TypedValue::Date)
        }

        (RawValue::Number(n), SemanticType::Timestamp) => excel_serial_to_timestamp(*n)
            .map_or(TypedValue::Null, TypedValue::Timestamp),
        (RawValue::Text(s), SemanticType::Timestamp) => {
            parse_timestamp(s).map_or(TypedValue::Null, TypedValue::Timestamp)
        }

        (RawValue::Number(n), SemanticType::String) if n.is_finite() => {
            TypedValue::Text(n.to_string())
        }
        (RawValue::Text(s), SemanticType::String) => {
            let cleaned = clean_str(s);
            if is_null_token(&cleaned) {
                TypedValue::Null
            } else {
                TypedValue::Text(cleaned)
            }
        }

        // non-finite numbers
        (RawValue::Number(_), _) => TypedValue::Null,
    }
}

/// Excel serials carry the time of day in the fractional part.
fn excel_serial_to_timestamp(serial: f64) -> Option<DateTime<Utc>> {
    let date = excel_serial_to_date(serial)?;
    let seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
    midnight.checked_add_signed(chrono::Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn column_names_are_folded_and_collapsed() {
        assert_eq!(sanitize_column_name("Índice (%)"), "indice_");
        assert_eq!(sanitize_column_name("ICC até 10 SM"), "icc_ate_10_sm");
        assert_eq!(sanitize_column_name("Acesso a Crédito"), "acesso_a_credito");
        assert_eq!(sanitize_column_name("a__b---c"), "a_b_c");
        assert_eq!(sanitize_column_name("MÊS"), "mes");
        assert_eq!(sanitize_column_name(""), "_");
        assert_eq!(sanitize_column_name("%%%"), "_");
    }

    #[test]
    fn column_name_sanitizing_is_idempotent() {
        let samples = [
            "Índice (%)",
            "  Série Histórica ",
            "__x__",
            "Perspectiva Profissional > 10 SM",
            "ß straße",
            "",
            "already_clean_123",
        ];
        for s in samples {
            let once = sanitize_column_name(s);
            assert_eq!(sanitize_column_name(&once), once, "not idempotent for {s:?}");
            assert!(once
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }

    #[test]
    fn floats_never_come_out_nan() {
        assert_eq!(
            sanitize_scalar(&RawValue::Number(f64::NAN), SemanticType::Float64),
            TypedValue::Null
        );
        assert_eq!(
            sanitize_scalar(&RawValue::Number(f64::INFINITY), SemanticType::Float64),
            TypedValue::Null
        );
        assert_eq!(
            sanitize_scalar(&RawValue::from("NaN"), SemanticType::Float64),
            TypedValue::Null
        );
        assert_eq!(
            sanitize_scalar(&RawValue::from("101,3"), SemanticType::Float64),
            TypedValue::Float(101.3)
        );
        assert_eq!(
            sanitize_scalar(&RawValue::Number(99.0), SemanticType::Float64),
            TypedValue::Float(99.0)
        );
    }

    #[test]
    fn dates_from_text_and_serials() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            sanitize_scalar(&RawValue::from("jan/24"), SemanticType::Date),
            TypedValue::Date(jan)
        );
        assert_eq!(
            sanitize_scalar(&RawValue::Number(45292.0), SemanticType::Date),
            TypedValue::Date(jan)
        );
        assert_eq!(
            sanitize_scalar(&RawValue::from("Fonte: CNC"), SemanticType::Date),
            TypedValue::Null
        );
    }

    #[test]
    fn timestamps_keep_serial_time_of_day() {
        let ts = match sanitize_scalar(&RawValue::Number(45292.5), SemanticType::Timestamp) {
            TypedValue::Timestamp(ts) => ts,
            other => panic!("expected timestamp, got {other:?}"),
        };
        assert_eq!(ts.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }

    #[test]
    fn strings_are_trimmed_and_placeholders_dropped() {
        assert_eq!(
            sanitize_scalar(&RawValue::from("  abc "), SemanticType::String),
            TypedValue::Text("abc".into())
        );
        assert_eq!(
            sanitize_scalar(&RawValue::from("-"), SemanticType::String),
            TypedValue::Null
        );
        assert_eq!(
            sanitize_scalar(&RawValue::Number(3.5), SemanticType::String),
            TypedValue::Text("3.5".into())
        );
        assert_eq!(
            sanitize_scalar(&RawValue::Missing, SemanticType::String),
            TypedValue::Null
        );
    }
}
