//! Numeric extraction from free-text telemetry fields.
//!
//! Device firmware reports values like "-95 dBm", "12 dB (SS-SINR)" or
//! "N/A"; the first signed decimal found scanning left to right wins.
//! Absence of a match is a normal, silent outcome.

use once_cell::sync::Lazy;
use regex::Regex;

/// Optional leading minus, digits, optional fractional part.
static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("decimal pattern is valid"));

/// Returns the first signed decimal number in `text`, or `None` if the field
/// is absent, empty, or contains no decimal pattern. Never fails on
/// malformed input.
pub fn extract_numeric(text: Option<&str>) -> Option<f64> {
    let text = text?;
    let m = DECIMAL_RE.find(text)?;
    m.as_str().parse::<f64>().ok()
}
