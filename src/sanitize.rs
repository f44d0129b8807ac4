//! Numeric and string coercion helpers shared by ingestion, commands and snapshot restore.
//!
//! Every helper is total: malformed input degrades to a safe default instead of failing.

use serde_json::Value;

/// Coerce a JSON value into a non-negative whole number.
///
/// Numbers are floored, numeric strings are parsed, anything else (including
/// negative or non-finite values) collapses to `0`.
pub fn non_negative_int(value: &Value) -> u64 {
    match value {
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                unsigned
            } else {
                number.as_f64().map(floor_non_negative).unwrap_or(0)
            }
        }
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map(floor_non_negative)
            .unwrap_or(0),
        Value::Bool(true) => 1,
        _ => 0,
    }
}

/// Same as [`non_negative_int`] for optional fields; absence yields `0`.
pub fn opt_non_negative_int(value: Option<&Value>) -> u64 {
    value.map(non_negative_int).unwrap_or(0)
}

fn floor_non_negative(raw: f64) -> u64 {
    if raw.is_finite() && raw > 0.0 {
        // saturating float-to-int cast
        raw.floor() as u64
    } else {
        0
    }
}

/// Interpret a JSON value as a boolean flag, using loose truthiness for non-booleans.
pub fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
        Value::Null => false,
    }
}

/// Render a scalar JSON value as text; `null`, arrays and objects become empty.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

/// Normalize an identifier for comparisons: trimmed and case-folded.
pub fn identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize a vocabulary token (event type, sub-type) by case-folding and
/// dropping everything that is not alphanumeric, so `"Community Gift"`,
/// `"community_gift"` and `"communityGift"` compare equal.
pub fn token(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Return the first candidate that is non-empty after trimming.
pub fn first_non_empty<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(text)
        .map(|candidate| candidate.trim().to_string())
        .find(|candidate| !candidate.is_empty())
}
