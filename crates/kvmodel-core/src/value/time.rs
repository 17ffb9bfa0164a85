//! Timestamp text form: fractional epoch seconds with six decimals.
//!
//! Lock expiries, stored timestamp attributes, and timestamp index fragments
//! all share this encoding so equal instants always produce equal text.
#![expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use chrono::{DateTime, Utc};

const MICROS_PER_SEC: i64 = 1_000_000;

/// Format an instant as `<secs>.<micros>`.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    let micros = ts.timestamp_micros();
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let per_sec = MICROS_PER_SEC.unsigned_abs();

    format!("{sign}{}.{:06}", abs / per_sec, abs % per_sec)
}

/// Parse fractional epoch seconds, falling back to RFC 3339.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    parse_fractional_seconds(text)
        .or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .and_then(timestamp_from_secs)
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|ts| ts.with_timezone(&Utc))
        })
}

/// Convert float epoch seconds into an instant (microsecond precision).
pub(crate) fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    let micros = (secs * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }

    DateTime::from_timestamp_micros(micros as i64)
}

/// Range-index score for an instant.
pub(crate) fn timestamp_score(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

// Exact decimal parse so text produced by `format_timestamp` never goes
// through float rounding.
fn parse_fractional_seconds(text: &str) -> Option<DateTime<Utc>> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, frac) = body.split_once('.').unwrap_or((body, ""));

    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let secs: i64 = whole.parse().ok()?;
    let mut micros_text: String = frac.chars().take(6).collect();
    while micros_text.len() < 6 {
        micros_text.push('0');
    }
    let micros: i64 = micros_text.parse().ok()?;

    let total = secs.checked_mul(MICROS_PER_SEC)?.checked_add(micros)?;
    let total = if negative { -total } else { total };

    DateTime::from_timestamp_micros(total)
}
