//! # Pantry
//!
//! Ingredient reconciliation and cookability tracking for a recipe
//! recommendation service.
//!
//! Raw `(ingredient, quantity)` entries, typed by users or detected in fridge
//! photos, are matched to a canonical ingredient catalog and converted into
//! each ingredient's canonical unit. The resulting rows update a user's stock,
//! and the set of recipes the user can cook is kept in step with that stock.

pub mod catalog;
pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod cookability;
pub mod db;
pub mod errors;
pub mod estimator;
pub mod llm;
pub mod measurement_patterns;
pub mod model;
pub mod pantry;
pub mod pipeline;
pub mod quantity;
pub mod resolver;
pub mod retry;
pub mod units;
