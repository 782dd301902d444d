//! # Quantity Parser
//!
//! Extracts a numeric value and a unit token from free-text quantities such as
//! `"2 cups"`, `"05 Kg"` or `"2cups"`. The unit is passed through
//! [`normalize_unit`](crate::units::normalize_unit).

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::measurement_patterns::QUANTITY_REGEX;
use crate::units::normalize_unit;

/// A parsed quantity with its canonical unit token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuantity {
    /// Numeric value (e.g. `2.0` for "2 cups")
    pub value: f64,
    /// Canonical unit token (e.g. `"cup"`)
    pub unit: String,
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Parse the first `<number><letters>` run in `text`
///
/// Returns `None` when the text holds no such run (a bare number without a
/// unit does not match) or the number overflows to infinity. Callers treat
/// `None` as "skip this entry".
///
/// # Examples
///
/// ```rust
/// use pantry::quantity::parse_quantity;
///
/// let parsed = parse_quantity("2 cups").unwrap();
/// assert_eq!(parsed.value, 2.0);
/// assert_eq!(parsed.unit, "cup");
///
/// assert!(parse_quantity("no numbers here").is_none());
/// ```
pub fn parse_quantity(text: &str) -> Option<ParsedQuantity> {
    let lowered = text.to_lowercase();
    let captures = QUANTITY_REGEX.captures(&lowered)?;

    let value = captures
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())?;
    let unit = normalize_unit(captures.get(2)?.as_str())?;

    trace!(input = %text, value, unit = %unit, "Parsed quantity");
    Some(ParsedQuantity { value, unit })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_quantities() {
        assert_eq!(
            parse_quantity("2 cups"),
            Some(ParsedQuantity {
                value: 2.0,
                unit: "cup".to_string()
            })
        );
        assert_eq!(
            parse_quantity("1 tbsp"),
            Some(ParsedQuantity {
                value: 1.0,
                unit: "tablespoon".to_string()
            })
        );
    }

    #[test]
    fn test_parse_leading_zero_and_case() {
        let parsed = parse_quantity("05 Kg").unwrap();
        assert_eq!(parsed.value, 5.0);
        assert_eq!(parsed.unit, "kg");
    }

    #[test]
    fn test_parse_without_space() {
        let parsed = parse_quantity("2cups").unwrap();
        assert_eq!(parsed.value, 2.0);
        assert_eq!(parsed.unit, "cup");
    }

    #[test]
    fn test_parse_decimal() {
        let parsed = parse_quantity("0.5 l").unwrap();
        assert_eq!(parsed.value, 0.5);
        assert_eq!(parsed.unit, "l");
    }

    #[test]
    fn test_parse_unknown_unit_passes_through() {
        let parsed = parse_quantity("3 Bunches").unwrap();
        assert_eq!(parsed.value, 3.0);
        assert_eq!(parsed.unit, "bunches");
    }

    #[test]
    fn test_parse_first_match_wins() {
        let parsed = parse_quantity("about 2 cups or 480 ml").unwrap();
        assert_eq!(parsed.value, 2.0);
        assert_eq!(parsed.unit, "cup");
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_quantity("no numbers here"), None);
        assert_eq!(parse_quantity("3"), None);
        assert_eq!(parse_quantity(""), None);
    }

    #[test]
    fn test_overflowing_number_is_rejected() {
        let huge = format!("{} kg", "9".repeat(400));
        assert_eq!(parse_quantity(&huge), None);
    }
}
