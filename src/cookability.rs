//! # Cookability Recomputation
//!
//! Decides which recipes a user can cook from their stock.
//!
//! A recipe is cookable when, for every requirement, the user's stock of that
//! ingredient is strictly greater than the required amount. A missing stock
//! row counts as zero. A recipe without requirements is always cookable.
//!
//! Two entry points:
//!
//! - [`compute_cookable`]: full recompute, needed whenever stock grew
//! - [`retract_after_decrease`]: incremental update after one ingredient
//!   decreased. Only recipes that are currently cookable and use that
//!   ingredient are re-checked, and only removals are possible. The result
//!   always equals what a full recompute would give for the new stock.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::model::{IngredientId, RecipeId, RecipeRequirement};

/// Stock amounts by ingredient, in canonical units
pub type StockLevels = HashMap<IngredientId, f64>;

/// Requirements grouped by recipe
pub type RequirementIndex = HashMap<RecipeId, Vec<RecipeRequirement>>;

/// Group flat requirement rows by recipe
pub fn index_requirements(rows: Vec<RecipeRequirement>) -> RequirementIndex {
    let mut index = RequirementIndex::new();
    for row in rows {
        index.entry(row.recipe_id).or_default().push(row);
    }
    index
}

/// Whether `stock` covers every requirement with some left over
pub fn is_cookable(stock: &StockLevels, requirements: &[RecipeRequirement]) -> bool {
    requirements.iter().all(|req| {
        let available = stock.get(&req.ingredient_id).copied().unwrap_or(0.0);
        available > req.amount
    })
}

/// Full recompute over every recipe in `recipes`
///
/// `recipes` lists all recipe ids, so that recipes without requirement rows
/// are still considered.
pub fn compute_cookable(
    stock: &StockLevels,
    recipes: &[RecipeId],
    requirements: &RequirementIndex,
) -> BTreeSet<RecipeId> {
    recipes
        .iter()
        .copied()
        .filter(|id| {
            requirements
                .get(id)
                .map_or(true, |reqs| is_cookable(stock, reqs))
        })
        .collect()
}

/// Remove recipes that stopped being cookable after `ingredient` decreased
///
/// Mutates `cookable` in place and returns the removed ids.
pub fn retract_after_decrease(
    cookable: &mut BTreeSet<RecipeId>,
    stock: &StockLevels,
    requirements: &RequirementIndex,
    ingredient: IngredientId,
) -> BTreeSet<RecipeId> {
    let removed: BTreeSet<RecipeId> = cookable
        .iter()
        .copied()
        .filter(|id| {
            requirements.get(id).is_some_and(|reqs| {
                reqs.iter().any(|r| r.ingredient_id == ingredient) && !is_cookable(stock, reqs)
            })
        })
        .collect();

    for id in &removed {
        cookable.remove(id);
    }

    if !removed.is_empty() {
        debug!(ingredient, removed = removed.len(), "Retracted cookable recipes");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOMATO: IngredientId = 1;
    const ONION: IngredientId = 2;

    fn stock(levels: &[(IngredientId, f64)]) -> StockLevels {
        levels.iter().copied().collect()
    }

    fn requirements() -> RequirementIndex {
        index_requirements(vec![
            RecipeRequirement::new(10, TOMATO, 5.0),
            RecipeRequirement::new(11, TOMATO, 4.999),
            RecipeRequirement::new(12, TOMATO, 3.0),
            RecipeRequirement::new(12, ONION, 1.0),
            RecipeRequirement::new(13, ONION, 0.5),
        ])
    }

    #[test]
    fn test_stock_must_exceed_requirement() {
        let stock = stock(&[(TOMATO, 5.0)]);
        let reqs = requirements();
        assert!(!is_cookable(&stock, &reqs[&10]));
        assert!(is_cookable(&stock, &reqs[&11]));
    }

    #[test]
    fn test_missing_stock_counts_as_zero() {
        let reqs = requirements();
        assert!(!is_cookable(&stock(&[(TOMATO, 5.0)]), &reqs[&12]));
    }

    #[test]
    fn test_full_recompute() {
        let stock = stock(&[(TOMATO, 5.0), (ONION, 2.0)]);
        let cookable = compute_cookable(&stock, &[10, 11, 12, 13, 14], &requirements());
        // 14 has no requirements
        assert_eq!(cookable, BTreeSet::from([11, 12, 13, 14]));
    }

    #[test]
    fn test_retraction_matches_full_recompute() {
        let recipes = [10, 11, 12, 13];
        let reqs = requirements();

        let before = stock(&[(TOMATO, 5.0), (ONION, 2.0)]);
        let mut cookable = compute_cookable(&before, &recipes, &reqs);

        let after = stock(&[(TOMATO, 2.0), (ONION, 2.0)]);
        let removed = retract_after_decrease(&mut cookable, &after, &reqs, TOMATO);

        assert_eq!(removed, BTreeSet::from([11, 12]));
        assert_eq!(cookable, compute_cookable(&after, &recipes, &reqs));
        assert_eq!(cookable, BTreeSet::from([13]));
    }

    #[test]
    fn test_retraction_ignores_unrelated_recipes() {
        let reqs = requirements();
        let mut cookable = BTreeSet::from([13]);
        // onion-only recipe is untouched when tomato drops to zero
        let removed = retract_after_decrease(&mut cookable, &stock(&[(ONION, 2.0)]), &reqs, TOMATO);
        assert!(removed.is_empty());
        assert_eq!(cookable, BTreeSet::from([13]));
    }
}
