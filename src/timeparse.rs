//! Parsing of the time expressions accepted by tool parameters.
//!
//! Timestamps may be absolute (RFC3339, `YYYY-MM-DD`, unix epoch in seconds,
//! millis, micros or nanos) or relative to the current instant (`now`,
//! `now-1h`, `-15m`, `2h ago`). Durations use the compact Prometheus style
//! (`90s`, `1h30m`, `2d`).

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;

fn duration_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)(ms|s|m|h|d|w)").expect("static regex"))
}

/// Parses `1h30m`, `500ms`, `2d`, `1.5h`. A bare integer is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total_ms: f64 = 0.0;
    let mut consumed = 0usize;
    for cap in duration_token_re().captures_iter(s) {
        let whole = cap.get(0).expect("group 0");
        if whole.start() != consumed {
            return Err(format!("invalid duration {input:?}"));
        }
        consumed = whole.end();
        let value: f64 = cap[1]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        let unit_ms = match &cap[2] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "d" => 86_400_000.0,
            "w" => 604_800_000.0,
            _ => unreachable!(),
        };
        total_ms += value * unit_ms;
    }
    if consumed != s.len() {
        return Err(format!("invalid duration {input:?}; expected e.g. 30s, 5m, 1h30m"));
    }
    Ok(Duration::from_millis(total_ms.round() as u64))
}

/// Interprets an epoch number by its magnitude: seconds, millis, micros or nanos.
pub fn from_epoch(value: i64) -> Result<DateTime<Utc>, String> {
    let digits = value.unsigned_abs().to_string().len();
    let ts = match digits {
        0..=10 => Utc.timestamp_opt(value, 0).single(),
        11..=13 => Utc.timestamp_millis_opt(value).single(),
        14..=16 => Some(Utc.timestamp_nanos(value.saturating_mul(1_000))),
        _ => Some(Utc.timestamp_nanos(value)),
    };
    ts.ok_or_else(|| format!("epoch value {value} out of range"))
}

pub fn parse_timestamp(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty timestamp".to_string());
    }
    let lower = s.to_ascii_lowercase();

    if lower == "now" {
        return Ok(now);
    }
    if let Some(rest) = lower.strip_prefix("now") {
        let rest = rest.trim_start();
        if let Some(d) = rest.strip_prefix('-') {
            return shift_back(now, d);
        }
        if let Some(d) = rest.strip_prefix('+') {
            let d = parse_duration(d)?;
            return Ok(now + to_chrono(d)?);
        }
        return Err(format!("invalid relative timestamp {input:?}"));
    }
    if let Some(d) = lower.strip_prefix('-') {
        if !d.starts_with(|c: char| c.is_ascii_digit()) || d.parse::<i64>().is_err() {
            return shift_back(now, d);
        }
    }
    if let Some(d) = lower.strip_suffix("ago") {
        return shift_back(now, d.trim());
    }

    if let Ok(n) = s.parse::<i64>() {
        return from_epoch(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }
    Err(format!(
        "invalid timestamp {input:?}; expected RFC3339, unix epoch, `now` or a relative offset like -1h"
    ))
}

fn shift_back(now: DateTime<Utc>, dur: &str) -> Result<DateTime<Utc>, String> {
    let d = parse_duration(dur.trim())?;
    Ok(now - to_chrono(d)?)
}

fn to_chrono(d: Duration) -> Result<chrono::Duration, String> {
    chrono::Duration::from_std(d).map_err(|_| "duration too large".to_string())
}

/// Loki takes nanosecond epochs on the query string.
pub fn to_nanos_string(ts: &DateTime<Utc>) -> String {
    match ts.timestamp_nanos_opt() {
        Some(n) => n.to_string(),
        None => format!("{}000000000", ts.timestamp()),
    }
}
