//! # Pantry Data Model
//!
//! This module defines the data structures shared by the reconciliation
//! pipeline, the stores and the cookability computation.
//!
//! ## Core Concepts
//!
//! - **CatalogEntry**: a canonical ingredient with the unit all amounts are stored in
//! - **StockEntry**: how much of an ingredient a user holds
//! - **RecipeRequirement**: how much of an ingredient a recipe needs
//! - **CanonicalRow**: one reconciled input, expressed in catalog terms
//!
//! ## Usage
//!
//! ```rust
//! use pantry::model::{CanonicalRow, IngredientInput};
//!
//! let input = IngredientInput::new("tomatoes", "2 kg");
//! let row = CanonicalRow::new(3, 2000.0, "gram");
//! assert_eq!(row.to_string(), "#3: 2000 gram");
//! # let _ = input;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ingredient identifier in the catalog
pub type IngredientId = i32;
/// Recipe identifier
pub type RecipeId = i32;
/// User identifier
pub type UserId = i32;

/// A canonical catalog ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: IngredientId,
    /// Canonical display name (e.g. "Honeydew")
    pub canonical_name: String,
    /// Unit every stock and requirement amount is expressed in
    pub canonical_unit: String,
}

impl CatalogEntry {
    pub fn new(id: IngredientId, canonical_name: &str, canonical_unit: &str) -> Self {
        Self {
            id,
            canonical_name: canonical_name.to_string(),
            canonical_unit: canonical_unit.to_string(),
        }
    }
}

/// A user's holding of one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub user_id: UserId,
    pub ingredient_id: IngredientId,
    /// Always positive; rows at zero or below are deleted
    pub amount: f64,
    pub updated_at: DateTime<Utc>,
}

/// Amount of one ingredient a recipe needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRequirement {
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: f64,
}

impl RecipeRequirement {
    pub fn new(recipe_id: RecipeId, ingredient_id: IngredientId, amount: f64) -> Self {
        Self {
            recipe_id,
            ingredient_id,
            amount,
        }
    }
}

/// A raw entry as typed by a user or produced by fridge-photo detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientInput {
    /// Free-text ingredient name (e.g. "roma tomatos")
    pub ingredient: String,
    /// Free-text quantity (e.g. "2 kg", "1 tbsp")
    pub quantity: String,
}

impl IngredientInput {
    pub fn new(ingredient: &str, quantity: &str) -> Self {
        Self {
            ingredient: ingredient.to_string(),
            quantity: quantity.to_string(),
        }
    }
}

/// One reconciled entry in catalog terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub ingredient_id: IngredientId,
    /// Amount in `unit`, rounded to two decimals
    pub amount: f64,
    /// The catalog's canonical unit for the ingredient
    pub unit: String,
}

impl CanonicalRow {
    pub fn new(ingredient_id: IngredientId, amount: f64, unit: &str) -> Self {
        Self {
            ingredient_id,
            amount,
            unit: unit.to_string(),
        }
    }
}

impl fmt::Display for CanonicalRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {} {}", self.ingredient_id, self.amount, self.unit)
    }
}

/// Short description of a recipe, used when listing cookable recipes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub recipe_id: RecipeId,
    pub recipe_name: String,
    pub dish_type: Option<String>,
    pub calories: Option<f64>,
}

/// A dish type recipes can be filtered by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishType {
    pub dish_type_id: i32,
    pub dish_type_name: String,
}

/// One ingredient line of a recipe, in the ingredient's canonical unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredientLine {
    pub ingredient_id: IngredientId,
    pub ingredient_name: String,
    pub amount: f64,
    pub unit: String,
}

/// One numbered preparation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionStep {
    pub step: i32,
    pub text: String,
}

/// Everything needed to show and cook a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDetail {
    pub recipe: RecipeSummary,
    pub ingredients: Vec<RecipeIngredientLine>,
    pub instructions: Vec<InstructionStep>,
}

/// Round an amount to two decimals, the precision stored amounts carry
pub fn round_amount(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
