//! Rate-limit header parsing.
//!
//! Providers disagree on header names and on how the reset moment is written.
//! Each known family is tried in order; the first one whose remaining and
//! limit headers both parse wins.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::stores::RateLimitFragment;

/// Epoch values at or above this are milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;
/// Epoch values at or above this (and below the millis threshold) are seconds
const EPOCH_SECONDS_THRESHOLD: i64 = 1_000_000_000;

struct HeaderFamily {
    remaining: &'static str,
    limit: &'static str,
    reset: &'static str,
}

const FAMILIES: &[HeaderFamily] = &[
    // GitHub, Twitter v1 and most REST APIs
    HeaderFamily {
        remaining: "x-ratelimit-remaining",
        limit: "x-ratelimit-limit",
        reset: "x-ratelimit-reset",
    },
    HeaderFamily {
        remaining: "x-rate-limit-remaining",
        limit: "x-rate-limit-limit",
        reset: "x-rate-limit-reset",
    },
    // IETF RateLimit header fields draft
    HeaderFamily {
        remaining: "ratelimit-remaining",
        limit: "ratelimit-limit",
        reset: "ratelimit-reset",
    },
    // OpenAI
    HeaderFamily {
        remaining: "x-ratelimit-remaining-requests",
        limit: "x-ratelimit-limit-requests",
        reset: "x-ratelimit-reset-requests",
    },
    // Anthropic
    HeaderFamily {
        remaining: "anthropic-ratelimit-requests-remaining",
        limit: "anthropic-ratelimit-requests-limit",
        reset: "anthropic-ratelimit-requests-reset",
    },
];

fn header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Leading integer of a header value, e.g. `100` from `100, 100;w=60`
fn parse_count(raw: &str) -> Option<i64> {
    raw.split([',', ';']).next()?.trim().parse().ok()
}

/// Parse the response headers into a rate-limit observation taken at `now`.
///
/// Returns `None` when no family is present or none has parsable counts.
pub fn extract_rate_limit(headers: &BTreeMap<String, String>, now: DateTime<Utc>) -> Option<RateLimitFragment> {
    FAMILIES.iter().find_map(|family| {
        let remaining = header(headers, family.remaining).and_then(parse_count)?;
        let limit = header(headers, family.limit).and_then(parse_count)?;
        let reset_time = header(headers, family.reset).and_then(|raw| parse_reset(raw, now));

        Some(RateLimitFragment {
            remaining,
            limit,
            reset_time,
            observed_at: now,
        })
    })
}

/// Absolute reset moment from any of the conventions seen in the wild:
/// epoch seconds or millis, delta seconds, RFC 3339, naive ISO-8601 (UTC),
/// HTTP-date and Go durations such as `1m30s` or `250ms`.
pub fn parse_reset(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(int) = value.parse::<i64>() {
        return from_integer(int, now);
    }
    if let Ok(float) = value.parse::<f64>() {
        return from_float(float, now);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(duration) = parse_go_duration(value) {
        return now.checked_add_signed(duration);
    }

    // `60;w=60` and similar parameterized forms
    match value.split_once(';') {
        Some((head, _)) if !head.trim().is_empty() => parse_reset(head, now),
        _ => None,
    }
}

fn from_integer(value: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if value >= EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(value).single()
    } else if value >= EPOCH_SECONDS_THRESHOLD {
        Utc.timestamp_opt(value, 0).single()
    } else if value >= 0 {
        now.checked_add_signed(Duration::seconds(value))
    } else {
        None
    }
}

fn from_float(value: f64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value >= EPOCH_MILLIS_THRESHOLD as f64 {
        Utc.timestamp_millis_opt(value.round() as i64).single()
    } else if value >= EPOCH_SECONDS_THRESHOLD as f64 {
        Utc.timestamp_millis_opt((value * 1000.0).round() as i64).single()
    } else {
        now.checked_add_signed(Duration::milliseconds((value * 1000.0).round() as i64))
    }
}

/// `1h2m3.5s`, `250ms`, `6m0s`. Every number needs a unit.
fn parse_go_duration(raw: &str) -> Option<Duration> {
    let mut total_ms = 0f64;
    let mut rest = raw;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_ms = match &rest[..unit_len] {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            "us" | "µs" => 0.001,
            "ns" => 0.000_001,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_ms += number * unit_ms;
    }

    Some(Duration::milliseconds(total_ms.round() as i64))
}
