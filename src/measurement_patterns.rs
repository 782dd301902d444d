//! # Measurement Patterns Module
//!
//! This module contains the regex used to pull a quantity out of free text.

use lazy_static::lazy_static;
use regex::Regex;

// A number with an optional decimal part, optional whitespace, then a run of letters
pub const QUANTITY_PATTERN: &str = r"(\d+(?:\.\d+)?)\s*([a-zA-Z]+)";

lazy_static! {
    pub static ref QUANTITY_REGEX: Regex =
        Regex::new(QUANTITY_PATTERN).expect("Quantity pattern should be valid");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_value_and_unit() {
        let caps = QUANTITY_REGEX.captures("about 1.5 cups of flour").unwrap();
        assert_eq!(&caps[1], "1.5");
        assert_eq!(&caps[2], "cups");
    }

    #[test]
    fn test_unit_may_touch_the_number() {
        let caps = QUANTITY_REGEX.captures("250g").unwrap();
        assert_eq!(&caps[1], "250");
        assert_eq!(&caps[2], "g");
    }

    #[test]
    fn test_bare_number_does_not_match() {
        assert!(QUANTITY_REGEX.captures("3").is_none());
        assert!(QUANTITY_REGEX.captures("a pinch").is_none());
    }
}
