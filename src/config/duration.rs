// src/config/duration.rs

use std::time::Duration;

/// Parse a grace period: a duration like `"5s"`, or `"none"` for no limit.
pub fn parse_grace_period(s: &str) -> Result<Option<Duration>, String> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_duration(trimmed).map(Some)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let duration = match unit_part.trim().to_lowercase().as_str() {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(60 * 60).map(Duration::from_secs),
        unit => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };

    duration
        .filter(|d| *d <= MAX_DURATION)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

/// Upper bound for configured durations (one year).
const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);
