use std::collections::{HashMap, HashSet};

/// Spreadsheet placeholders that mean "no value".
const NULL_TOKENS: &[&str] = &[
    "", "-", "--", "...", "n/a", "na", "n/d", "#n/a", "#n/d", "nan", "null", "none", "x",
];

/// 1) Trim whitespace (including non-breaking spaces) + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{a0}');
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// True when the cleaned text is a placeholder for a missing value.
pub fn is_null_token(cleaned: &str) -> bool {
    let lower = cleaned.to_lowercase();
    NULL_TOKENS.contains(&lower.as_str())
}

/// 2) Parse a number the way the source sheets write them.
///
/// Accepts plain `98.7`, decimal commas (`98,7`), Brazilian grouping
/// (`1.234,5`), English grouping (`1,234.5`) and a trailing `%`.
/// Never returns NaN or infinity.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = clean_str(raw);
    if is_null_token(&cleaned) {
        return None;
    }
    let compact: String = cleaned
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();

    let normalized = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) if compact.matches(',').count() == 1 => compact.replace(',', "."),
        (Some(_), None) => compact.replace(',', ""),
        _ => compact,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Make column names unique by suffixing repeats with `_2`, `_3`, ...,
/// skipping suffixed names already taken.
pub fn unique_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut next: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            if taken.insert(name.clone()) {
                return name;
            }
            let n = next.entry(name.clone()).or_insert(1);
            loop {
                *n += 1;
                let candidate = format!("{}_{}", name, n);
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}
