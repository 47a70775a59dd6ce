//! Duration and retry parsing
//!
//! Accepts the forms GitLab allows for `timeout`: a plain number of seconds
//! or a sequence of `<number><unit>` tokens such as `1h 30m`, `30 minutes`
//! or `2 days`.

use glhub_core::domain::pipeline::DEFAULT_TIMEOUT_SECS;
use serde_yaml::Value;

/// Upper bound of `retry`
pub const MAX_RETRY: u32 = 2;

/// Parse a `timeout` value into seconds
///
/// Anything unparseable, and a total of zero, yields the default of one hour.
pub fn parse_duration(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().filter(|secs| *secs > 0),
        Value::String(s) => parse_duration_str(s),
        _ => None,
    }
    .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

fn parse_duration_str(input: &str) -> Option<u64> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<u64>() {
        return (secs > 0).then_some(secs);
    }

    let mut total: u64 = 0;
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut number = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            number.push(d);
        }
        let amount: u64 = number.parse().ok()?;

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut unit = String::new();
        while let Some(c) = chars.next_if(|c| c.is_ascii_alphabetic()) {
            unit.push(c.to_ascii_lowercase());
        }

        let multiplier = unit_seconds(&unit)?;
        total = total.checked_add(amount.checked_mul(multiplier)?)?;
    }

    (total > 0).then_some(total)
}

/// Seconds per unit word; an empty unit means seconds
fn unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Some(1),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3600),
        "d" | "day" | "days" => Some(86_400),
        _ => None,
    }
}

/// Parse `retry`: an integer or `{max: N}`, clamped to `0..=2`
pub fn parse_retry(value: &Value) -> u32 {
    let raw = match value {
        Value::Mapping(map) => map.get("max").and_then(Value::as_u64),
        other => other.as_u64(),
    };
    raw.map(|n| n.min(u64::from(MAX_RETRY)) as u32).unwrap_or(0)
}
