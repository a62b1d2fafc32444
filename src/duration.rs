//! Operator-facing duration syntax.
//!
//! Intervals are written as a sequence of decimal numbers with a unit
//! suffix, for example `30s`, `20m`, `1h30m` or `1.5h`. Recognised units
//! are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is accepted
//! as the zero duration.

use std::time::Duration;

use crate::{AppError, Result};

const UNITS: &[(&str, f64)] = &[
    ("ns", 1e-9),
    ("us", 1e-6),
    ("µs", 1e-6),
    ("ms", 1e-3),
    ("s", 1.0),
    ("m", 60.0),
    ("h", 3600.0),
];

/// Parse an operator duration such as `1h30m`.
///
/// # Errors
///
/// Returns `AppError::Validation` if the text is empty, negative, uses an
/// unknown unit, or is otherwise malformed.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("empty duration".into()));
    }
    if trimmed.starts_with('-') {
        return Err(AppError::Validation(format!(
            "negative duration '{trimmed}' is not allowed"
        )));
    }
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if body == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = body;
    let mut total_secs = 0.0_f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid(trimmed));
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid(trimmed))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale = UNITS
            .iter()
            .find_map(|(name, scale)| (*name == unit).then_some(*scale))
            .ok_or_else(|| {
                if unit.is_empty() {
                    AppError::Validation(format!("missing unit in duration '{trimmed}'"))
                } else {
                    AppError::Validation(format!("unknown unit '{unit}' in duration '{trimmed}'"))
                }
            })?;
        total_secs += value * scale;
    }

    // Snap to whole nanoseconds so `250ms` is exactly 250ms.
    let snapped = (total_secs * 1e9).round() / 1e9;
    Duration::try_from_secs_f64(snapped).map_err(|_| invalid(trimmed))
}

/// Render a duration compactly: `0s`, `250ms`, `45s`, `30m0s`, `1h30m0s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".into();
    }
    if duration < Duration::from_secs(1) {
        return format!("{}ms", duration.as_millis());
    }

    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    let millis = duration.subsec_millis();
    let seconds_text = if millis == 0 {
        format!("{seconds}s")
    } else {
        format!("{seconds}.{millis:03}s")
    };

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds_text}")
    } else if minutes > 0 {
        format!("{minutes}m{seconds_text}")
    } else {
        seconds_text
    }
}

fn invalid(text: &str) -> AppError {
    AppError::Validation(format!("invalid duration '{text}'"))
}
