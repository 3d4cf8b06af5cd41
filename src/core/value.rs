// src/core/value.rs

//! Value-format parsing and formatting shared across the three components:
//! durations (§6.4), booleans (§6.4), scores with `INFINITY` sentinels
//! (§6.4), dotted-decimal versions (§6.4), and the `++`/`+=` value
//! expansion grammar used by the attribute aggregator (§4.1).

use std::cmp::Ordering;

use crate::core::errors::AttrdError;

/// The magnitude `INFINITY`/`-INFINITY`/`+INFINITY` map to. Configurable so a
/// deployment can match whatever convention its CIB uses; the spec's
/// suggested default is 1,000,000.
pub const DEFAULT_INFINITY_MAGNITUDE: i64 = 1_000_000;

/// Parses a human-readable duration: a bare integer millisecond count, or
/// `N(ms|s|m|h)`. `0` (in either form) means "no dampening".
pub fn parse_duration_ms(input: &str) -> Result<u64, AttrdError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AttrdError::InvalidDuration(input.to_string()));
    }
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(ms);
    }
    let (digits, unit) = s.split_at(
        s.find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| AttrdError::InvalidDuration(input.to_string()))?,
    );
    let n: u64 = digits
        .parse()
        .map_err(|_| AttrdError::InvalidDuration(input.to_string()))?;
    let multiplier = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return Err(AttrdError::InvalidDuration(input.to_string())),
    };
    Ok(n.saturating_mul(multiplier))
}

/// Formats a millisecond duration back into its canonical bare-integer form.
/// Round-trips with [`parse_duration_ms`] for inputs that were already
/// expressed in milliseconds.
pub fn format_duration_ms(ms: u64) -> String {
    ms.to_string()
}

/// Parses a boolean in the case-insensitive `true|yes|on|1` /
/// `false|no|off|0` vocabulary.
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Parses a score: a signed integer, or one of the `INFINITY` sentinels
/// (`INFINITY`, `+INFINITY` map to `+magnitude`; `-INFINITY` maps to
/// `-magnitude`).
pub fn parse_score(input: &str, magnitude: i64) -> Option<i64> {
    match input.trim() {
        "INFINITY" | "+INFINITY" => Some(magnitude),
        "-INFINITY" => Some(-magnitude),
        other => other.parse::<i64>().ok(),
    }
}

/// Formats a score, mapping `±magnitude` back to the `INFINITY` sentinels so
/// that `parse_score(format_score(s)) == s` for all finite `s` in
/// `[-magnitude, magnitude]`.
pub fn format_score(value: i64, magnitude: i64) -> String {
    if value == magnitude {
        "INFINITY".to_string()
    } else if value == -magnitude {
        "-INFINITY".to_string()
    } else {
        value.to_string()
    }
}

/// Compares two dotted-decimal version strings component-by-component,
/// treating missing trailing components as `0` (so `1.1` == `1.1.0`).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut ia = a.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    let mut ib = b.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    loop {
        match (ia.next(), ib.next()) {
            (None, None) => return Ordering::Equal,
            (Some(x), None) => {
                if x != 0 {
                    return Ordering::Greater;
                }
            }
            (None, Some(y)) => {
                if y != 0 {
                    return Ordering::Less;
                }
            }
            (Some(x), Some(y)) => match x.cmp(&y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Expands a value of the form `<prefix>++` or `<prefix>+=N` into an
/// arithmetic increment on `old` (interpreted as a signed integer, `0` if
/// `old` is absent or non-numeric). Any other value passes through
/// unchanged. Overflow saturates to `i64`'s range, per §9.
pub fn expand_value(value: Option<&str>, old: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let old_n: i64 = old.and_then(|s| s.parse().ok()).unwrap_or(0);

    if value.ends_with("++") {
        return old_n.saturating_add(1).to_string();
    }
    if let Some(rest) = find_plus_equals(value) {
        if let Ok(delta) = rest.parse::<i64>() {
            return old_n.saturating_add(delta).to_string();
        }
    }
    value.to_string()
}

fn find_plus_equals(value: &str) -> Option<&str> {
    value.find("+=").map(|idx| &value[idx + 2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_bare_ms_and_units() {
        assert_eq!(parse_duration_ms("20s").unwrap(), 20_000);
        assert_eq!(parse_duration_ms("20000").unwrap(), 20_000);
        assert_eq!(parse_duration_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms("0").unwrap(), 0);
        assert_eq!(parse_duration_ms("500ms").unwrap(), 500);
    }

    #[test]
    fn duration_rejects_garbage() {
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("abc").is_err());
        assert!(parse_duration_ms("10y").is_err());
    }

    #[test]
    fn bool_parses_known_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn score_round_trips_through_full_range() {
        let magnitude = DEFAULT_INFINITY_MAGNITUDE;
        for s in [-magnitude, -1, 0, 1, 12345, magnitude] {
            let formatted = format_score(s, magnitude);
            assert_eq!(parse_score(&formatted, magnitude), Some(s));
        }
    }

    #[test]
    fn score_sentinels_are_bijective() {
        let magnitude = DEFAULT_INFINITY_MAGNITUDE;
        assert_eq!(parse_score("INFINITY", magnitude), Some(magnitude));
        assert_eq!(parse_score("+INFINITY", magnitude), Some(magnitude));
        assert_eq!(parse_score("-INFINITY", magnitude), Some(-magnitude));
        assert_eq!(format_score(magnitude, magnitude), "INFINITY");
        assert_eq!(format_score(-magnitude, magnitude), "-INFINITY");
    }

    #[test]
    fn versions_compare_lexicographically_by_component() {
        assert_eq!(compare_versions("1.1.15", "1.1.2"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("1.1", "1.1.0"), Ordering::Equal);
    }

    #[test]
    fn expand_handles_increment_and_assign() {
        assert_eq!(expand_value(Some("++"), Some("4")), "5");
        assert_eq!(expand_value(Some("++"), None), "1");
        assert_eq!(expand_value(Some("+=3"), Some("4")), "7");
        assert_eq!(expand_value(Some("+=3"), Some("not-a-number")), "3");
        assert_eq!(expand_value(Some("literal"), Some("4")), "literal");
    }

    #[test]
    fn expand_saturates_on_overflow() {
        assert_eq!(
            expand_value(Some("++"), Some(&i64::MAX.to_string())),
            i64::MAX.to_string()
        );
    }

    proptest::proptest! {
        /// §8 property: score format/parse is a bijection within
        /// `[-magnitude, magnitude]`.
        #[test]
        fn score_round_trip_prop(s in -1_000_000i64..=1_000_000i64) {
            let magnitude = DEFAULT_INFINITY_MAGNITUDE;
            let formatted = format_score(s, magnitude);
            proptest::prop_assert_eq!(parse_score(&formatted, magnitude), Some(s));
        }

        /// §8 property: every millisecond count round-trips through
        /// duration format/parse unchanged.
        #[test]
        fn duration_round_trip_prop(ms in 0u64..=1_000_000_000u64) {
            let formatted = format_duration_ms(ms);
            proptest::prop_assert_eq!(parse_duration_ms(&formatted).unwrap(), ms);
        }
    }
}
