//! # Units Module
//!
//! Unit normalization and deterministic conversion.
//!
//! Every unit family has exactly one canonical token ("cup", "tablespoon",
//! "gram", ...). [`normalize_unit`] maps synonyms onto that token and passes
//! unknown tokens through lower-cased. [`convert_amount`] only knows the
//! ordered pairs listed in the conversion table; it never derives inverses or
//! chains several hops.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Synonym table, canonical token on the right
static UNIT_MAPPINGS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Volume units
    map.insert("cups", "cup");
    map.insert("cup", "cup");
    map.insert("tablespoons", "tablespoon");
    map.insert("tablespoon", "tablespoon");
    map.insert("tbsp", "tablespoon");
    map.insert("teaspoons", "teaspoon");
    map.insert("teaspoon", "teaspoon");
    map.insert("tsp", "teaspoon");
    map.insert("ml", "ml");
    map.insert("milliliter", "ml");
    map.insert("milliliters", "ml");
    map.insert("millilitre", "ml");
    map.insert("millilitres", "ml");
    map.insert("l", "l");
    map.insert("liter", "l");
    map.insert("liters", "l");
    map.insert("litre", "l");
    map.insert("litres", "l");

    // Mass units
    map.insert("kilograms", "kg");
    map.insert("kilogram", "kg");
    map.insert("kg", "kg");
    map.insert("grams", "gram");
    map.insert("gram", "gram");
    map.insert("g", "gram");

    // Discrete units
    map.insert("cloves", "clove");
    map.insert("clove", "clove");
    map.insert("pcs", "pcs");
    map.insert("piece", "pcs");
    map.insert("pieces", "pcs");

    map
});

/// Deterministic factors for ordered (from, to) pairs
const CONVERSION_FACTORS: &[(&str, &str, f64)] = &[
    ("kg", "gram", 1000.0),
    ("gram", "kg", 0.001),
    ("cup", "tablespoon", 16.0),
    ("tablespoon", "teaspoon", 3.0),
    ("teaspoon", "gram", 5.0),
    ("tablespoon", "gram", 15.0),
    ("cup", "gram", 240.0),
    ("ml", "gram", 1.0),
];

/// Map a free-text unit token onto its canonical token
///
/// Lookup is case-insensitive and ignores surrounding whitespace. Unknown
/// tokens come back lower-cased. Empty input yields `None`.
///
/// # Examples
///
/// ```rust
/// use pantry::units::normalize_unit;
///
/// assert_eq!(normalize_unit("Cups").as_deref(), Some("cup"));
/// assert_eq!(normalize_unit("tbsp").as_deref(), Some("tablespoon"));
/// assert_eq!(normalize_unit("Bunch").as_deref(), Some("bunch"));
/// assert_eq!(normalize_unit("  "), None);
/// ```
pub fn normalize_unit(unit: &str) -> Option<String> {
    let lowered = unit.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    Some(match UNIT_MAPPINGS.get(lowered.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => lowered,
    })
}

/// Look up the deterministic factor for an ordered pair of canonical units
pub fn conversion_factor(from_unit: &str, to_unit: &str) -> Option<f64> {
    CONVERSION_FACTORS
        .iter()
        .find(|(from, to, _)| *from == from_unit && *to == to_unit)
        .map(|(_, _, factor)| *factor)
}

/// Convert `value` between canonical units using the fixed table
///
/// Returns `None` when the ordered pair is absent, which tells the caller to
/// escalate to estimation.
///
/// # Examples
///
/// ```rust
/// use pantry::units::convert_amount;
///
/// assert_eq!(convert_amount(1.0, "cup", "tablespoon"), Some(16.0));
/// assert_eq!(convert_amount(1.0, "tablespoon", "cup"), None);
/// ```
pub fn convert_amount(value: f64, from_unit: &str, to_unit: &str) -> Option<f64> {
    conversion_factor(from_unit, to_unit).map(|factor| value * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_synonyms() {
        assert_eq!(normalize_unit("cups").as_deref(), Some("cup"));
        assert_eq!(normalize_unit("TBSP").as_deref(), Some("tablespoon"));
        assert_eq!(normalize_unit("tsp").as_deref(), Some("teaspoon"));
        assert_eq!(normalize_unit("Kilograms").as_deref(), Some("kg"));
        assert_eq!(normalize_unit("g").as_deref(), Some("gram"));
        assert_eq!(normalize_unit("pieces").as_deref(), Some("pcs"));
        assert_eq!(normalize_unit("Litres").as_deref(), Some("l"));
    }

    #[test]
    fn test_unknown_unit_passes_through_lowercased() {
        assert_eq!(normalize_unit("Handful").as_deref(), Some("handful"));
        assert!(!UNIT_MAPPINGS.contains_key("handful"));
    }

    #[test]
    fn test_normalize_is_idempotent_for_every_synonym() {
        for synonym in UNIT_MAPPINGS.keys() {
            let once = normalize_unit(synonym).unwrap();
            let twice = normalize_unit(&once).unwrap();
            assert_eq!(once, twice, "normalizing '{synonym}' twice changed it");
        }
    }

    #[test]
    fn test_conversion_table_lookups() {
        assert_eq!(convert_amount(1.0, "cup", "tablespoon"), Some(16.0));
        assert_eq!(convert_amount(2.0, "kg", "gram"), Some(2000.0));
        assert_eq!(convert_amount(2.0, "tablespoon", "teaspoon"), Some(6.0));
        assert_eq!(convert_amount(100.0, "ml", "gram"), Some(100.0));
    }

    #[test]
    fn test_conversion_is_ordered_pair_only() {
        // inverse pairs are not derived
        assert_eq!(convert_amount(1.0, "tablespoon", "cup"), None);
        assert_eq!(convert_amount(1.0, "gram", "ml"), None);
        // and there is no chaining: cup -> tablespoon -> teaspoon is two hops
        assert_eq!(convert_amount(1.0, "cup", "teaspoon"), None);
    }
}
