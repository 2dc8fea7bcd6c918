//! Input validation for the add-medicine flow
//!
//! Time input is normalized to canonical `HH:MM`; dosage input is checked
//! against the known unit grammar but unusual short strings are accepted
//! with a warning rather than rejected.

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_COLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]|[01][0-9]|2[0-3]):([0-5][0-9])$").unwrap());
static TIME_BARE_HOUR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]|[01][0-9]|2[0-3])$").unwrap());
static TIME_COMPACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{3,4}$").unwrap());

static DOSAGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // count + unit, optionally fractional: "1 tablet", "2.5 ml", "2 капсули"
        r"(?i)^\d+(\.\d+)?\s*(tablets?|tab\.?|capsules?|caps?\.?|drops?|ml\.?|mg\.?|g\.?|таблетк[аи]|таб\.?|капсул[аи]|кап\.?|краплі|крапель|мл\.?|г\.?)$",
        // "half a tablet" / "пів таблетки"
        r"(?i)^(half|пів)\s*(a\s*)?(tablets?|capsules?|таблетк[аи]|капсул[аи])$",
        // "1/2 tablet"
        r"(?i)^\d+/\d+\s*(tablets?|capsules?|таблетк[аи]|капсул[аи])$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Normalize a time string to `HH:MM`.
///
/// Accepts `H:MM`/`HH:MM`, a bare hour ("8" -> "08:00"), and compact
/// 3-4 digit forms ("830" -> "08:30", "1245" -> "12:45"). Anything with
/// an hour over 23 or a minute over 59 yields `None`.
pub fn normalize_time(input: &str) -> Option<String> {
    let input = input.trim();

    if let Some(caps) = TIME_COLON.captures(input) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return Some(format!("{hour:02}:{minute:02}"));
    }

    if TIME_BARE_HOUR.is_match(input) {
        let hour: u32 = input.parse().ok()?;
        return Some(format!("{hour:02}:00"));
    }

    if TIME_COMPACT.is_match(input) {
        let split = input.len() - 2;
        let hour: u32 = input[..split].parse().ok()?;
        let minute: u32 = input[split..].parse().ok()?;
        if hour <= 23 && minute <= 59 {
            return Some(format!("{hour:02}:{minute:02}"));
        }
    }

    None
}

/// Validate a dosage string.
///
/// Known unit forms pass silently; any other non-empty input up to 50
/// characters is accepted with a logged warning; longer input is rejected.
pub fn normalize_dosage(input: &str) -> Option<String> {
    let dosage = input.trim();
    if dosage.is_empty() {
        return None;
    }

    if DOSAGE_PATTERNS.iter().any(|pattern| pattern.is_match(dosage)) {
        return Some(dosage.to_string());
    }

    if dosage.chars().count() <= 50 {
        warn!("Unusual dosage format: {dosage}");
        return Some(dosage.to_string());
    }

    None
}

/// Medicine names are 1-100 characters after trimming
pub fn normalize_name(input: &str) -> Option<String> {
    let name = input.trim();
    match name.chars().count() {
        1..=100 => Some(name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_time_colon_forms() {
        assert_eq!(normalize_time("8:30").as_deref(), Some("08:30"));
        assert_eq!(normalize_time("08:30").as_deref(), Some("08:30"));
        assert_eq!(normalize_time("0:05").as_deref(), Some("00:05"));
        assert_eq!(normalize_time("23:59").as_deref(), Some("23:59"));
    }

    #[test]
    fn test_normalize_time_bare_hours() {
        assert_eq!(normalize_time("8").as_deref(), Some("08:00"));
        assert_eq!(normalize_time("08").as_deref(), Some("08:00"));
        assert_eq!(normalize_time("0").as_deref(), Some("00:00"));
        assert_eq!(normalize_time("23").as_deref(), Some("23:00"));
    }

    #[test]
    fn test_normalize_time_compact_forms() {
        assert_eq!(normalize_time("830").as_deref(), Some("08:30"));
        assert_eq!(normalize_time("800").as_deref(), Some("08:00"));
        assert_eq!(normalize_time("1245").as_deref(), Some("12:45"));
        assert_eq!(normalize_time("0000").as_deref(), Some("00:00"));
        assert_eq!(normalize_time("2359").as_deref(), Some("23:59"));
    }

    #[test]
    fn test_normalize_time_rejects_out_of_range() {
        for input in ["24", "24:00", "12:60", "2460", "960", "25:99", "12345"] {
            assert_eq!(normalize_time(input), None, "accepted {input}");
        }
    }

    #[test]
    fn test_normalize_time_rejects_garbage() {
        for input in ["", "morning", "8am", "8:3", "twelve", ":30"] {
            assert_eq!(normalize_time(input), None, "accepted {input}");
        }
    }

    #[test]
    fn test_normalize_dosage_known_units() {
        assert_eq!(normalize_dosage("1 tablet").as_deref(), Some("1 tablet"));
        assert_eq!(normalize_dosage("2 capsules").as_deref(), Some("2 capsules"));
        assert_eq!(normalize_dosage("5 ml").as_deref(), Some("5 ml"));
        assert_eq!(normalize_dosage("1 таблетка").as_deref(), Some("1 таблетка"));
        assert_eq!(normalize_dosage("2 капсули").as_deref(), Some("2 капсули"));
        assert_eq!(
            normalize_dosage("пів таблетки").as_deref(),
            Some("пів таблетки")
        );
        assert_eq!(
            normalize_dosage("1/2 tablet").as_deref(),
            Some("1/2 tablet")
        );
    }

    #[test]
    fn test_normalize_dosage_unusual_but_short_is_accepted() {
        assert_eq!(
            normalize_dosage("one big spoonful").as_deref(),
            Some("one big spoonful")
        );
    }

    #[test]
    fn test_normalize_dosage_rejects_empty_and_long() {
        assert_eq!(normalize_dosage(""), None);
        assert_eq!(normalize_dosage("   "), None);
        assert_eq!(normalize_dosage(&"x".repeat(51)), None);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Aspirin ").as_deref(), Some("Aspirin"));
        assert_eq!(normalize_name("A").as_deref(), Some("A"));
        assert_eq!(normalize_name(&"n".repeat(100)).as_deref(), Some("n".repeat(100).as_str()));
        assert_eq!(normalize_name(""), None);
        assert_eq!(normalize_name("   "), None);
        assert_eq!(normalize_name(&"n".repeat(101)), None);
    }
}
