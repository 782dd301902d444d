//! PostgreSQL stores for the catalog, recipes, user stock and the persisted
//! cookable set.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::model::{
    CatalogEntry, DishType, IngredientId, InstructionStep, RecipeDetail, RecipeId,
    RecipeIngredientLine, RecipeRequirement, RecipeSummary, StockEntry, UserId,
};

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ingredients (
            ingredient_id SERIAL PRIMARY KEY,
            ingredient_name TEXT NOT NULL UNIQUE,
            measuring_unit TEXT NOT NULL DEFAULT ''
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create ingredients table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS dish_types (
            dish_type_id SERIAL PRIMARY KEY,
            dish_type_name TEXT NOT NULL UNIQUE
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create dish_types table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recipes (
            recipe_id SERIAL PRIMARY KEY,
            recipe_name TEXT NOT NULL,
            dish_type_id INTEGER REFERENCES dish_types(dish_type_id),
            calories DOUBLE PRECISION
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create recipes table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recipe_ingredients (
            recipe_id INTEGER NOT NULL REFERENCES recipes(recipe_id) ON DELETE CASCADE,
            ingredient_id INTEGER NOT NULL REFERENCES ingredients(ingredient_id) ON DELETE CASCADE,
            amount DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (recipe_id, ingredient_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create recipe_ingredients table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS instructions (
            recipe_id INTEGER NOT NULL REFERENCES recipes(recipe_id) ON DELETE CASCADE,
            step_number INTEGER NOT NULL,
            instruction_text TEXT NOT NULL,
            PRIMARY KEY (recipe_id, step_number)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create instructions table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_ingredients (
            user_id INTEGER NOT NULL,
            ingredient_id INTEGER NOT NULL REFERENCES ingredients(ingredient_id) ON DELETE CASCADE,
            amount DOUBLE PRECISION NOT NULL CHECK (amount > 0),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (user_id, ingredient_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_ingredients table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_cookable_recipes (
            user_id INTEGER NOT NULL,
            recipe_id INTEGER NOT NULL REFERENCES recipes(recipe_id) ON DELETE CASCADE,
            PRIMARY KEY (user_id, recipe_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_cookable_recipes table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Load every catalog entry
pub async fn load_catalog(pool: &PgPool) -> Result<Vec<CatalogEntry>> {
    let rows = sqlx::query(
        "SELECT ingredient_id, ingredient_name, measuring_unit FROM ingredients ORDER BY ingredient_id",
    )
    .fetch_all(pool)
    .await
    .context("Failed to load ingredient catalog")?;

    let entries = rows
        .into_iter()
        .map(|row| CatalogEntry {
            id: row.get(0),
            canonical_name: row.get(1),
            canonical_unit: row.get(2),
        })
        .collect::<Vec<_>>();

    debug!(entries = entries.len(), "Loaded catalog rows");
    Ok(entries)
}

/// Insert a catalog ingredient, or update the unit of an existing one
///
/// Returns the ingredient id.
pub async fn upsert_catalog_entry(pool: &PgPool, name: &str, unit: &str) -> Result<IngredientId> {
    let row = sqlx::query(
        "INSERT INTO ingredients (ingredient_name, measuring_unit) VALUES ($1, $2)
         ON CONFLICT (ingredient_name) DO UPDATE SET measuring_unit = EXCLUDED.measuring_unit
         RETURNING ingredient_id",
    )
    .bind(name)
    .bind(unit)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to upsert catalog entry '{name}'"))?;

    let id: IngredientId = row.get(0);
    info!(ingredient_id = id, name, unit, "Catalog entry saved");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// Return the id of a dish type, creating it if needed
pub async fn get_or_create_dish_type(pool: &PgPool, name: &str) -> Result<i32> {
    let row = sqlx::query(
        "INSERT INTO dish_types (dish_type_name) VALUES ($1)
         ON CONFLICT (dish_type_name) DO UPDATE SET dish_type_name = EXCLUDED.dish_type_name
         RETURNING dish_type_id",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to get or create dish type '{name}'"))?;

    Ok(row.get(0))
}

/// Every dish type, by name
pub async fn list_dish_types(pool: &PgPool) -> Result<Vec<DishType>> {
    let rows = sqlx::query("SELECT dish_type_id, dish_type_name FROM dish_types ORDER BY dish_type_name")
        .fetch_all(pool)
        .await
        .context("Failed to list dish types")?;

    Ok(rows
        .into_iter()
        .map(|row| DishType {
            dish_type_id: row.get(0),
            dish_type_name: row.get(1),
        })
        .collect())
}

/// Create a recipe and return its id
pub async fn create_recipe(
    pool: &PgPool,
    name: &str,
    dish_type: Option<&str>,
    calories: Option<f64>,
) -> Result<RecipeId> {
    let dish_type_id = match dish_type {
        Some(dish_type) => Some(get_or_create_dish_type(pool, dish_type).await?),
        None => None,
    };

    let row = sqlx::query(
        "INSERT INTO recipes (recipe_name, dish_type_id, calories) VALUES ($1, $2, $3)
         RETURNING recipe_id",
    )
    .bind(name)
    .bind(dish_type_id)
    .bind(calories)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to create recipe '{name}'"))?;

    let id: RecipeId = row.get(0);
    info!(recipe_id = id, name, "Recipe created");
    Ok(id)
}

/// Set how much of an ingredient a recipe needs
pub async fn set_recipe_requirement(
    pool: &PgPool,
    recipe_id: RecipeId,
    ingredient_id: IngredientId,
    amount: f64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES ($1, $2, $3)
         ON CONFLICT (recipe_id, ingredient_id) DO UPDATE SET amount = EXCLUDED.amount",
    )
    .bind(recipe_id)
    .bind(ingredient_id)
    .bind(amount)
    .execute(pool)
    .await
    .context("Failed to save recipe requirement")?;

    Ok(())
}

/// Set the text of one preparation step
pub async fn set_instruction(
    pool: &PgPool,
    recipe_id: RecipeId,
    step: i32,
    text: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO instructions (recipe_id, step_number, instruction_text) VALUES ($1, $2, $3)
         ON CONFLICT (recipe_id, step_number) DO UPDATE SET instruction_text = EXCLUDED.instruction_text",
    )
    .bind(recipe_id)
    .bind(step)
    .bind(text)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save step {step} of recipe {recipe_id}"))?;

    Ok(())
}

/// Full recipe with ingredient lines and ordered steps; `None` when unknown
pub async fn get_recipe_detail(pool: &PgPool, recipe_id: RecipeId) -> Result<Option<RecipeDetail>> {
    let Some(row) = sqlx::query(
        "SELECT r.recipe_id, r.recipe_name, d.dish_type_name, r.calories
         FROM recipes r
         LEFT JOIN dish_types d ON d.dish_type_id = r.dish_type_id
         WHERE r.recipe_id = $1",
    )
    .bind(recipe_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to load recipe {recipe_id}"))?
    else {
        return Ok(None);
    };
    let recipe = RecipeSummary {
        recipe_id: row.get(0),
        recipe_name: row.get(1),
        dish_type: row.get(2),
        calories: row.get(3),
    };

    let ingredients = sqlx::query(
        "SELECT i.ingredient_id, i.ingredient_name, ri.amount, i.measuring_unit
         FROM recipe_ingredients ri
         JOIN ingredients i ON i.ingredient_id = ri.ingredient_id
         WHERE ri.recipe_id = $1
         ORDER BY i.ingredient_name",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to load ingredients of recipe {recipe_id}"))?
    .into_iter()
    .map(|row| RecipeIngredientLine {
        ingredient_id: row.get(0),
        ingredient_name: row.get(1),
        amount: row.get(2),
        unit: row.get(3),
    })
    .collect();

    let instructions = sqlx::query(
        "SELECT step_number, instruction_text FROM instructions
         WHERE recipe_id = $1 ORDER BY step_number",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to load instructions of recipe {recipe_id}"))?
    .into_iter()
    .map(|row| InstructionStep {
        step: row.get(0),
        text: row.get(1),
    })
    .collect();

    Ok(Some(RecipeDetail {
        recipe,
        ingredients,
        instructions,
    }))
}

/// Requirements of one recipe; empty for an unknown recipe
pub async fn get_recipe_requirements(
    pool: &PgPool,
    recipe_id: RecipeId,
) -> Result<Vec<RecipeRequirement>> {
    let rows = sqlx::query(
        "SELECT recipe_id, ingredient_id, amount FROM recipe_ingredients WHERE recipe_id = $1",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to load requirements of recipe {recipe_id}"))?;

    Ok(rows.iter().map(requirement_from_row).collect())
}

/// Every requirement row of every recipe
pub async fn get_all_requirements(pool: &PgPool) -> Result<Vec<RecipeRequirement>> {
    let rows = sqlx::query("SELECT recipe_id, ingredient_id, amount FROM recipe_ingredients")
        .fetch_all(pool)
        .await
        .context("Failed to load recipe requirements")?;

    Ok(rows.iter().map(requirement_from_row).collect())
}

/// Ids of every recipe, including those without requirement rows
pub async fn get_all_recipe_ids(pool: &PgPool) -> Result<Vec<RecipeId>> {
    let rows = sqlx::query("SELECT recipe_id FROM recipes ORDER BY recipe_id")
        .fetch_all(pool)
        .await
        .context("Failed to load recipe ids")?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

fn requirement_from_row(row: &sqlx::postgres::PgRow) -> RecipeRequirement {
    RecipeRequirement::new(row.get(0), row.get(1), row.get(2))
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

/// A change to one stock row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StockChange {
    Add(f64),
    Subtract(f64),
    Set(f64),
}

impl StockChange {
    fn apply(self, current: f64) -> f64 {
        match self {
            StockChange::Add(amount) => current + amount,
            StockChange::Subtract(amount) => current - amount,
            StockChange::Set(amount) => amount,
        }
    }
}

/// Stock of one ingredient before and after a change
///
/// A missing row reads as 0, and a row that dropped to 0 or below was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StockUpdate {
    pub ingredient_id: IngredientId,
    pub previous: f64,
    pub current: f64,
}

impl StockUpdate {
    pub fn increased(&self) -> bool {
        self.current > self.previous
    }

    pub fn decreased(&self) -> bool {
        self.current < self.previous
    }
}

/// Apply a change to one (user, ingredient) stock row
///
/// Runs in its own transaction. Concurrent changes to the same (user,
/// ingredient) pair serialize on a transaction-scoped advisory lock, which
/// also covers a row that does not exist yet and so cannot be locked with
/// `SELECT ... FOR UPDATE`.
pub async fn apply_stock_change(
    pool: &PgPool,
    user_id: UserId,
    ingredient_id: IngredientId,
    change: StockChange,
) -> Result<StockUpdate> {
    let mut tx = pool.begin().await.context("Failed to begin stock transaction")?;

    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(user_id)
        .bind(ingredient_id)
        .execute(&mut *tx)
        .await
        .context("Failed to lock stock pair")?;

    let previous: f64 = sqlx::query(
        "SELECT amount FROM user_ingredients WHERE user_id = $1 AND ingredient_id = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(ingredient_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to lock stock row")?
    .map(|row| row.get::<f64, _>(0))
    .unwrap_or(0.0);

    let current = change.apply(previous);

    if current <= 0.0 {
        sqlx::query("DELETE FROM user_ingredients WHERE user_id = $1 AND ingredient_id = $2")
            .bind(user_id)
            .bind(ingredient_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete stock row")?;
    } else {
        sqlx::query(
            "INSERT INTO user_ingredients (user_id, ingredient_id, amount, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (user_id, ingredient_id)
             DO UPDATE SET amount = EXCLUDED.amount, updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id)
        .bind(ingredient_id)
        .bind(current)
        .execute(&mut *tx)
        .await
        .context("Failed to write stock row")?;
    }

    tx.commit().await.context("Failed to commit stock transaction")?;

    let current = current.max(0.0);
    debug!(user_id, ingredient_id, previous, current, ?change, "Stock updated");
    Ok(StockUpdate {
        ingredient_id,
        previous,
        current,
    })
}

pub async fn add_stock(
    pool: &PgPool,
    user_id: UserId,
    ingredient_id: IngredientId,
    amount: f64,
) -> Result<StockUpdate> {
    apply_stock_change(pool, user_id, ingredient_id, StockChange::Add(amount)).await
}

pub async fn reduce_stock(
    pool: &PgPool,
    user_id: UserId,
    ingredient_id: IngredientId,
    amount: f64,
) -> Result<StockUpdate> {
    apply_stock_change(pool, user_id, ingredient_id, StockChange::Subtract(amount)).await
}

pub async fn set_stock(
    pool: &PgPool,
    user_id: UserId,
    ingredient_id: IngredientId,
    amount: f64,
) -> Result<StockUpdate> {
    apply_stock_change(pool, user_id, ingredient_id, StockChange::Set(amount)).await
}

/// All stock rows of a user
pub async fn get_user_stock(pool: &PgPool, user_id: UserId) -> Result<Vec<StockEntry>> {
    let rows = sqlx::query(
        "SELECT user_id, ingredient_id, amount, updated_at FROM user_ingredients
         WHERE user_id = $1 ORDER BY ingredient_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to load stock of user {user_id}"))?;

    Ok(rows
        .into_iter()
        .map(|row| StockEntry {
            user_id: row.get(0),
            ingredient_id: row.get(1),
            amount: row.get(2),
            updated_at: row.get::<DateTime<Utc>, _>(3),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Cookable set
// ---------------------------------------------------------------------------

/// Stored cookable recipe ids of a user
pub async fn get_cookable_set(pool: &PgPool, user_id: UserId) -> Result<BTreeSet<RecipeId>> {
    let rows = sqlx::query("SELECT recipe_id FROM user_cookable_recipes WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to load cookable set of user {user_id}"))?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Replace the stored cookable set of a user
pub async fn replace_cookable_set(
    pool: &PgPool,
    user_id: UserId,
    recipes: &BTreeSet<RecipeId>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin cookable transaction")?;

    sqlx::query("DELETE FROM user_cookable_recipes WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear cookable set")?;

    let ids: Vec<RecipeId> = recipes.iter().copied().collect();
    sqlx::query(
        "INSERT INTO user_cookable_recipes (user_id, recipe_id)
         SELECT $1, UNNEST($2::INTEGER[])",
    )
    .bind(user_id)
    .bind(&ids)
    .execute(&mut *tx)
    .await
    .context("Failed to store cookable set")?;

    tx.commit().await.context("Failed to commit cookable set")?;

    info!(user_id, cookable = ids.len(), "Cookable set replaced");
    Ok(())
}

/// Drop recipes from the stored cookable set of a user
pub async fn remove_cookable(
    pool: &PgPool,
    user_id: UserId,
    recipes: &BTreeSet<RecipeId>,
) -> Result<u64> {
    if recipes.is_empty() {
        return Ok(0);
    }

    let ids: Vec<RecipeId> = recipes.iter().copied().collect();
    let result = sqlx::query(
        "DELETE FROM user_cookable_recipes WHERE user_id = $1 AND recipe_id = ANY($2)",
    )
    .bind(user_id)
    .bind(&ids)
    .execute(pool)
    .await
    .context("Failed to remove cookable recipes")?;

    Ok(result.rows_affected())
}

/// Stored cookable recipes of a user with their summaries
///
/// `dish_type` filters by dish type name; `None` returns everything.
pub async fn list_cookable_summaries(
    pool: &PgPool,
    user_id: UserId,
    dish_type: Option<&str>,
) -> Result<Vec<RecipeSummary>> {
    let rows = sqlx::query(
        "SELECT r.recipe_id, r.recipe_name, d.dish_type_name, r.calories
         FROM user_cookable_recipes c
         JOIN recipes r ON r.recipe_id = c.recipe_id
         LEFT JOIN dish_types d ON d.dish_type_id = r.dish_type_id
         WHERE c.user_id = $1 AND ($2::TEXT IS NULL OR d.dish_type_name = $2)
         ORDER BY r.recipe_id",
    )
    .bind(user_id)
    .bind(dish_type)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to list cookable recipes of user {user_id}"))?;

    Ok(rows
        .into_iter()
        .map(|row| RecipeSummary {
            recipe_id: row.get(0),
            recipe_name: row.get(1),
            dish_type: row.get(2),
            calories: row.get(3),
        })
        .collect())
}
