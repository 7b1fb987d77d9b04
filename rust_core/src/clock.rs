//! Game clock decoding and formatting.
//!
//! Feeds encode the game clock either as an ISO-8601 style duration
//! (`PT05M23.40S`) or as plain `MM:SS`. Decoding is total: anything that
//! cannot be read becomes 0 seconds so clock lookups never fail.

use regex::Regex;
use std::sync::OnceLock;

// ASCII classes only: the regex crate is built without unicode-perl
fn minutes_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]+)M").ok()).as_ref()
}

fn seconds_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)S").ok()).as_ref()
}

/// Decode an encoded game clock into whole seconds.
///
/// Fractional seconds are truncated: `PT5M23.40S` and `5:23` both decode to 323.
pub fn decode_clock(clock: &str) -> u32 {
    let clock = clock.trim();
    if clock.is_empty() {
        return 0;
    }

    if clock.starts_with("PT") {
        let (minutes, seconds) = iso_components(clock);
        return to_seconds(minutes, seconds);
    }

    let parts: Vec<&str> = clock.split(':').collect();
    match parts.len() {
        2 => to_seconds(leading_int(parts[0]), leading_int(parts[1])),
        _ => 0,
    }
}

/// `minutes * 60 + seconds`, or 0 when that does not fit
fn to_seconds(minutes: u32, seconds: u32) -> u32 {
    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .unwrap_or(0)
}

/// Render a clock for display: `PT05M03.00S` becomes `5:03`, `MM:SS` passes through.
pub fn format_clock(clock: &str) -> String {
    let clock = clock.trim();
    if clock.is_empty() {
        return "--:--".to_string();
    }
    if !clock.starts_with("PT") {
        return clock.to_string();
    }
    let (minutes, seconds) = iso_components(clock);
    format!("{}:{:02}", minutes, seconds)
}

fn iso_components(clock: &str) -> (u32, u32) {
    let minutes = minutes_re()
        .and_then(|re| re.captures(clock))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0);
    let seconds = seconds_re()
        .and_then(|re| re.captures(clock))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s < u32::MAX as f64)
        .map(|s| s.floor() as u32)
        .unwrap_or(0);
    (minutes, seconds)
}

/// Integer prefix of a string ("23.5" -> 23, "abc" -> 0, overflow -> 0)
fn leading_int(raw: &str) -> u32 {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().unwrap_or(0)
}
