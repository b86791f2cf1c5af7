//! Human readable durations such as `2d4h7m` or `1h 30m`.
//!
//! A duration is any number of `<integer><unit>` tokens where the unit is one of
//! `d`, `h`, `m` or `s`. Whitespace is allowed around both parts and repeated
//! units add up, so `1h6s5s2d` is two days, one hour and eleven seconds.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

static DURATION_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*([0-9]+)\s*([dhms])\s*").expect("duration token pattern is valid")
});

fn unit_secs(unit: &str) -> u64 {
    match unit {
        "d" => SECS_PER_DAY,
        "h" => SECS_PER_HOUR,
        "m" => SECS_PER_MINUTE,
        _ => 1,
    }
}

/// Sums every `<integer><unit>` token found in `input`.
///
/// Parsing is lenient: text that is not part of a token is ignored (a warning
/// names it), and an input without any token is [`Duration::ZERO`].
pub fn parse_duration(input: &str) -> Duration {
    let mut total_secs: u64 = 0;
    let mut ignored = String::new();
    let mut last_end = 0;

    for caps in DURATION_TOKEN_RE.captures_iter(input) {
        let (Some(whole), Some(count), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        ignored.push_str(&input[last_end..whole.start()]);
        last_end = whole.end();

        let count = count.as_str().parse::<u64>().unwrap_or(u64::MAX);
        total_secs = total_secs.saturating_add(count.saturating_mul(unit_secs(unit.as_str())));
    }
    ignored.push_str(&input[last_end..]);

    let ignored = ignored.trim();
    if !ignored.is_empty() {
        tracing::warn!("Ignoring unrecognised text {:?} in duration {:?}", ignored, input);
    }

    Duration::from_secs(total_secs)
}

/// Renders a duration in the grammar accepted by [`parse_duration`].
///
/// Sub-second precision is dropped.
pub fn format_duration_str(duration: Duration) -> String {
    let mut remaining = duration.as_secs();
    if remaining == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, secs) in [
        ('d', SECS_PER_DAY),
        ('h', SECS_PER_HOUR),
        ('m', SECS_PER_MINUTE),
        ('s', 1),
    ] {
        let count = remaining / secs;
        if count > 0 {
            out.push_str(&format!("{count}{unit}"));
            remaining %= secs;
        }
    }
    out
}

/// `#[serde(with = "...")]` adapter for [`Duration`] fields written as duration strings.
pub mod duration_str {
    use super::{format_duration_str, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration_str(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(parse_duration(&raw))
    }
}
