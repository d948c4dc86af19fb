//! Numeric normalization for loosely typed upstream values.
//!
//! Sources disagree on how they encode numbers: native JSON numbers,
//! `"1,234.56"`, `"$12,345"`, `"3.21%"`, and APYs as either a fraction
//! (`0.05`) or a percentage (`5.0`). Everything here returns `None` rather
//! than failing.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// APY values at or below this are read as fractions and scaled by 100.
///
/// Values between 1.0% and 1.5% are indistinguishable from fractional
/// encodings of 100%–150%; the former are rare enough to accept the error.
pub const FRACTION_CEILING: f64 = 1.5;

/// Parse a JSON value into a finite float.
///
/// Native numbers pass through; strings go through [`parse_numeric_str`];
/// anything else is `None`.
pub fn parse_numberish(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

/// Strict signed decimal, ASCII digits only.
static SIGNED_DECIMAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").ok());

fn is_decoration(c: char) -> bool {
    c == '$' || c == '%' || c.is_whitespace()
}

/// Parse a decorated decimal string: thousands separators are dropped and
/// surrounding `$`, `%` and whitespace are stripped, including between a
/// leading minus and the digits (`-$1,234.50`). What remains must match
/// `-?[0-9]+(\.[0-9]+)?` exactly.
pub fn parse_numeric_str(raw: &str) -> Option<f64> {
    let without_commas: String = raw.chars().filter(|c| *c != ',').collect();
    let trimmed = without_commas.trim_matches(is_decoration);
    let cleaned = match trimmed.strip_prefix('-') {
        Some(rest) => format!("-{}", rest.trim_start_matches(is_decoration)),
        None => trimmed.to_string(),
    };

    if !is_signed_decimal(&cleaned) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn is_signed_decimal(s: &str) -> bool {
    SIGNED_DECIMAL.as_ref().is_some_and(|re| re.is_match(s))
}

/// Express an APY-like value as a percentage.
///
/// Non-finite input becomes 0. Values `<= 1.5` are treated as fractions.
pub fn as_pct(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    if x <= FRACTION_CEILING { x * 100.0 } else { x }
}

/// [`as_pct`] over an optional value, with `None` meaning 0.
pub fn opt_pct(x: Option<f64>) -> f64 {
    x.map(as_pct).unwrap_or(0.0)
}

/// A finite, non-negative value or 0.
pub fn non_negative(x: Option<f64>) -> f64 {
    x.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0)
}
