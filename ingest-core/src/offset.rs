//! Parsing of the loosely formatted `utc_offset` values weather APIs report.
//!
//! Accepted shapes, tried in order after an optional `UTC` prefix and sign:
//! - `H:MM`, `HH:MM`, `HMM`, `HHMM` (hours and minutes)
//! - decimal hours: `5`, `5.`, `5.5`, `4.75`
//!
//! A missing sign means east of UTC. Anything beyond +/-14:00 is rejected.

use chrono::{FixedOffset, TimeDelta};

use crate::error::FormatError;

/// Largest offset in use anywhere (Line Islands, UTC+14).
const MAX_OFFSET_MINUTES: i64 = 14 * 60;

/// Parse a free-form offset string into a signed duration east of UTC.
pub fn parse_offset(raw: &str) -> Result<TimeDelta, FormatError> {
    let unrecognized = || FormatError::Offset { raw: raw.to_string() };

    let mut rest = raw.trim();
    if rest.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("utc")) {
        rest = rest[3..].trim_start();
    }

    let (sign, body) = if let Some(body) = rest.strip_prefix('+') {
        (1, body)
    } else if let Some(body) = rest.strip_prefix('-') {
        (-1, body)
    } else {
        (1, rest)
    };

    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    let minutes = match hours_and_minutes(&body) {
        Some((_, minutes)) if minutes > 59 => return Err(unrecognized()),
        Some((hours, minutes)) => hours * 60 + minutes,
        None => {
            let hours = decimal_hours(&body).ok_or_else(unrecognized)?;
            if hours > (MAX_OFFSET_MINUTES / 60) as f64 {
                return Err(FormatError::OffsetOutOfRange { raw: raw.to_string() });
            }
            let whole = hours.trunc();
            whole as i64 * 60 + ((hours - whole) * 60.0).round_ties_even() as i64
        }
    };

    if minutes > MAX_OFFSET_MINUTES {
        return Err(FormatError::OffsetOutOfRange { raw: raw.to_string() });
    }

    Ok(TimeDelta::minutes(sign * minutes))
}

/// Parse an offset string straight into a chrono timezone.
pub fn fixed_offset(raw: &str) -> Result<FixedOffset, FormatError> {
    let delta = parse_offset(raw)?;
    FixedOffset::east_opt(delta.num_seconds() as i32)
        .ok_or_else(|| FormatError::OffsetOutOfRange { raw: raw.to_string() })
}

fn hours_and_minutes(body: &str) -> Option<(i64, i64)> {
    if !body.is_ascii() {
        return None;
    }

    let (hours, minutes) = match body.split_once(':') {
        Some(parts) => parts,
        None if body.len() >= 3 => body.split_at(body.len() - 2),
        None => return None,
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !(1..=2).contains(&hours.len()) || minutes.len() != 2 {
        return None;
    }
    if !all_digits(hours) || !all_digits(minutes) {
        return None;
    }

    Some((hours.parse().ok()?, minutes.parse().ok()?))
}

// Plain digits and at most one dot; no exponents, no "inf", no second sign.
fn decimal_hours(body: &str) -> Option<f64> {
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    body.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(hours: i64, minutes: i64) -> TimeDelta {
        TimeDelta::hours(hours) + TimeDelta::minutes(minutes)
    }

    #[test]
    fn missing_sign_means_positive() {
        assert_eq!(parse_offset("+5:30").unwrap(), parse_offset("5:30").unwrap());
        assert_eq!(parse_offset("5:30").unwrap(), hm(5, 30));
    }

    #[test]
    fn utc_prefix_is_stripped_case_insensitively() {
        assert_eq!(parse_offset("UTC-4").unwrap(), -hm(4, 0));
        assert_eq!(parse_offset("utc+5:30").unwrap(), hm(5, 30));
        assert_eq!(parse_offset(" UTC + 05 : 45 ").unwrap(), hm(5, 45));
    }

    #[test]
    fn compact_hours_minutes() {
        assert_eq!(parse_offset("0530").unwrap(), hm(5, 30));
        assert_eq!(parse_offset("-0400").unwrap(), -hm(4, 0));
        assert_eq!(parse_offset("530").unwrap(), hm(5, 30));
        assert_eq!(parse_offset("+05:00").unwrap(), hm(5, 0));
    }

    #[test]
    fn decimal_hours_shapes() {
        assert_eq!(parse_offset("4.").unwrap(), hm(4, 0));
        assert_eq!(parse_offset("5.").unwrap(), hm(5, 0));
        assert_eq!(parse_offset("-4.0").unwrap(), -hm(4, 0));
        assert_eq!(parse_offset("-4").unwrap(), -hm(4, 0));
        assert_eq!(parse_offset("5.5").unwrap(), hm(5, 30));
        assert_eq!(parse_offset("+4.75").unwrap(), hm(4, 45));
        assert_eq!(parse_offset("-5.5").unwrap(), -hm(5, 30));
        assert_eq!(parse_offset("0").unwrap(), TimeDelta::zero());
    }

    #[test]
    fn fractional_minutes_are_rounded() {
        // 0.1 h = 6 min, 0.01 h = 0.6 min -> 1 min
        assert_eq!(parse_offset("5.1").unwrap(), hm(5, 6));
        assert_eq!(parse_offset("5.01").unwrap(), hm(5, 1));
    }

    #[test]
    fn garbage_is_rejected() {
        for raw in ["banana", "", "UTC", "+", "5:3", "5:3a", "1e1", "inf", "NaN", "--4", "5.5.5", "."] {
            let err = parse_offset(raw).unwrap_err();
            assert_eq!(err, FormatError::Offset { raw: raw.to_string() }, "input {raw:?}");
        }
    }

    #[test]
    fn minutes_above_59_are_rejected() {
        assert!(matches!(parse_offset("5:75"), Err(FormatError::Offset { .. })));
    }

    #[test]
    fn offsets_beyond_fourteen_hours_are_rejected() {
        assert!(matches!(parse_offset("14:30"), Err(FormatError::OffsetOutOfRange { .. })));
        assert!(matches!(parse_offset("-15"), Err(FormatError::OffsetOutOfRange { .. })));
        assert!(matches!(parse_offset("12345"), Err(FormatError::OffsetOutOfRange { .. })));
        assert_eq!(parse_offset("+14:00").unwrap(), hm(14, 0));
        assert_eq!(parse_offset("-12").unwrap(), -hm(12, 0));
    }

    #[test]
    fn fixed_offset_matches_duration() {
        let tz = fixed_offset("UTC-4").unwrap();
        assert_eq!(tz.local_minus_utc(), -4 * 3600);

        let tz = fixed_offset("5:45").unwrap();
        assert_eq!(tz.local_minus_utc(), 5 * 3600 + 45 * 60);
    }
}
