//! Duration string parsing for the `agg` command.
//!
//! Accepts a sequence of decimal numbers each followed by a unit, such as
//! `30s`, `1m`, `1h30m`, `1.5h` or `250ms`. Valid units are `ns`, `us`
//! (or `µs`), `ms`, `s`, `m` and `h`.

use std::time::Duration;

use crate::{GatorError, Result};

const NANOS_PER_UNIT: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3600e9),
];

/// Parse a duration string into a `Duration`.
///
/// Negative durations are rejected, since the result is always used as an interval.
/// A bare `0` parses to a zero duration.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || GatorError::InvalidDuration(format!("{input:?}"));

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }

    let s = match s.strip_prefix('+') {
        Some(rest) => rest,
        None if s.starts_with('-') => {
            return Err(GatorError::InvalidDuration(format!(
                "{input:?} is negative"
            )))
        }
        None => s,
    };

    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total_nanos = 0f64;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after_number) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_len);
        if unit.is_empty() {
            return Err(GatorError::InvalidDuration(format!(
                "missing unit in duration {input:?}"
            )));
        }

        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| {
                GatorError::InvalidDuration(format!("unknown unit {unit:?} in duration {input:?}"))
            })?;

        total_nanos += value * scale;
        rest = after_unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Parse a duration that must be strictly positive.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let duration = parse_duration(input)?;
    if duration.is_zero() {
        return Err(GatorError::InvalidDuration(format!(
            "{input:?} must be greater than zero"
        )));
    }
    Ok(duration)
}
