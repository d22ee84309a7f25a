//! Publish date normalization.
//!
//! Syndication documents carry publish dates in several textual layouts.
//! This module converts them to UTC, trying a fixed list of layouts in
//! priority order and returning `None` when nothing matches.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Layouts accepted for publish dates, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLayout {
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Numeric,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123Named,
    /// `2006-01-02T15:04:05Z`
    Rfc3339,
    /// `2006-01-02`, taken as midnight UTC.
    DateOnly,
}

impl DateLayout {
    /// All layouts in priority order.
    pub const ALL: [DateLayout; 4] = [
        DateLayout::Rfc1123Numeric,
        DateLayout::Rfc1123Named,
        DateLayout::Rfc3339,
        DateLayout::DateOnly,
    ];

    /// Try to parse `s` with this layout.
    pub fn parse(self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            DateLayout::Rfc1123Numeric => {
                let rest = strip_weekday(s)?;
                DateTime::parse_from_str(rest, "%d %b %Y %H:%M:%S %z")
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            DateLayout::Rfc1123Named => {
                let rest = strip_weekday(s)?;
                let (datetime, zone) = rest.rsplit_once(' ')?;
                let offset = zone_offset(zone)?;
                let naive = NaiveDateTime::parse_from_str(datetime, "%d %b %Y %H:%M:%S").ok()?;
                offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            DateLayout::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            DateLayout::DateOnly => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive)),
        }
    }
}

/// Normalize a raw publish date.
///
/// Empty input is absent. Input that matches no layout is logged and also absent.
pub fn normalize_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = DateLayout::ALL.iter().find_map(|layout| layout.parse(s));
    if parsed.is_none() {
        warn!(raw = %raw, "Unrecognized publish date");
    }
    parsed
}

/// Strip the leading `Mon, ` from an RFC 1123 date.
///
/// The weekday is checked for shape but not against the date, since feeds
/// often get it wrong.
fn strip_weekday(s: &str) -> Option<&str> {
    const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    let (day, rest) = s.split_once(", ")?;
    if WEEKDAYS.iter().any(|w| w.eq_ignore_ascii_case(day)) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Offset for a named time zone. Unknown alphabetic abbreviations are UTC.
fn zone_offset(zone: &str) -> Option<FixedOffset> {
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let hours = match zone.to_ascii_uppercase().as_str() {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    };
    FixedOffset::east_opt(hours * 3600)
}
