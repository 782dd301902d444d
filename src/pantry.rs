//! # Pantry Service
//!
//! Ties reconciliation, stock mutation and cookability together.
//!
//! | Flow | Stock | Cookable set |
//! | --- | --- | --- |
//! | [`restock`](PantryService::restock) | add reconciled amounts | full recompute |
//! | [`consume_ingredients`](PantryService::consume_ingredients) | subtract reconciled amounts | incremental retraction |
//! | [`cook_recipe`](PantryService::cook_recipe) | subtract the recipe's requirements | incremental retraction |
//! | [`set_stock`](PantryService::set_stock) | absolute set | recompute on increase, retraction on decrease |
//! | [`recompute`](PantryService::recompute) | unchanged | full recompute |
//!
//! Growing stock can only add recipes, which needs a full recompute. Shrinking
//! stock can only remove recipes, so only recipes using a decreased
//! ingredient are re-checked.

use anyhow::Result;
use serde::Serialize;
use sqlx::postgres::PgPool;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::catalog::{CatalogCache, CatalogSnapshot};
use crate::config::PipelineConfig;
use crate::cookability::{
    compute_cookable, index_requirements, retract_after_decrease, StockLevels,
};
use crate::db::{self, StockUpdate};
use crate::llm::LanguageModel;
use crate::model::{
    DishType, IngredientId, IngredientInput, RecipeDetail, RecipeId, RecipeSummary, UserId,
};
use crate::pipeline::{ReconciliationPipeline, ReconciliationReport};

/// What a stock-changing flow did
#[derive(Debug, Clone, Default, Serialize)]
pub struct StockOutcome {
    /// Reconciliation details, for flows that take raw entries
    pub report: Option<ReconciliationReport>,
    pub updates: Vec<StockUpdate>,
    pub added: BTreeSet<RecipeId>,
    pub removed: BTreeSet<RecipeId>,
}

/// Difference between the stored cookable set and a full recompute
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CookableChange {
    pub added: BTreeSet<RecipeId>,
    pub removed: BTreeSet<RecipeId>,
    pub cookable: BTreeSet<RecipeId>,
}

pub struct PantryService {
    pool: PgPool,
    pipeline: ReconciliationPipeline,
    catalog_cache: CatalogCache,
}

impl PantryService {
    pub fn new(pool: PgPool, model: Arc<dyn LanguageModel>, config: PipelineConfig) -> Self {
        let catalog_cache = CatalogCache::new(Duration::from_secs(config.catalog_cache_ttl_secs));
        Self {
            pool,
            pipeline: ReconciliationPipeline::new(model, config),
            catalog_cache,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Current catalog snapshot, from the cache when it is enabled
    pub async fn catalog(&self) -> Result<Arc<CatalogSnapshot>> {
        self.catalog_cache
            .get_or_load(|| db::load_catalog(&self.pool))
            .await
    }

    /// Add or update a catalog ingredient and drop the cached snapshot
    pub async fn upsert_catalog_entry(&self, name: &str, unit: &str) -> Result<IngredientId> {
        let id = db::upsert_catalog_entry(&self.pool, name, unit).await?;
        self.catalog_cache.invalidate();
        Ok(id)
    }

    /// Reconcile raw entries without touching stock
    pub async fn reconcile(&self, inputs: &[IngredientInput]) -> Result<ReconciliationReport> {
        let catalog = self.catalog().await?;
        Ok(self.pipeline.reconcile(&catalog, inputs).await?)
    }

    /// Add reconciled entries to stock
    #[instrument(skip(self, inputs), fields(entries = inputs.len()))]
    pub async fn restock(&self, user_id: UserId, inputs: &[IngredientInput]) -> Result<StockOutcome> {
        let report = self.reconcile(inputs).await?;

        let mut updates = Vec::new();
        for row in report.rows() {
            updates.push(db::add_stock(&self.pool, user_id, row.ingredient_id, row.amount).await?);
        }

        let change = self.recompute(user_id).await?;
        info!(user_id, rows = updates.len(), added = change.added.len(), "Restocked");

        Ok(StockOutcome {
            report: Some(report),
            updates,
            added: change.added,
            removed: change.removed,
        })
    }

    /// Subtract reconciled entries from stock
    #[instrument(skip(self, inputs), fields(entries = inputs.len()))]
    pub async fn consume_ingredients(
        &self,
        user_id: UserId,
        inputs: &[IngredientInput],
    ) -> Result<StockOutcome> {
        let report = self.reconcile(inputs).await?;

        let mut updates = Vec::new();
        for row in report.rows() {
            updates.push(db::reduce_stock(&self.pool, user_id, row.ingredient_id, row.amount).await?);
        }

        let removed = self.retract(user_id, &updates).await?;
        info!(user_id, rows = updates.len(), removed = removed.len(), "Consumed ingredients");

        Ok(StockOutcome {
            report: Some(report),
            updates,
            added: BTreeSet::new(),
            removed,
        })
    }

    /// Subtract every requirement of a recipe from stock
    ///
    /// An unknown recipe has no requirements, so nothing changes.
    #[instrument(skip(self))]
    pub async fn cook_recipe(&self, user_id: UserId, recipe_id: RecipeId) -> Result<StockOutcome> {
        let requirements = db::get_recipe_requirements(&self.pool, recipe_id).await?;

        let mut updates = Vec::new();
        for req in &requirements {
            updates.push(db::reduce_stock(&self.pool, user_id, req.ingredient_id, req.amount).await?);
        }

        let removed = self.retract(user_id, &updates).await?;
        info!(user_id, recipe_id, removed = removed.len(), "Cooked recipe");

        Ok(StockOutcome {
            report: None,
            updates,
            added: BTreeSet::new(),
            removed,
        })
    }

    /// Set the stock of one ingredient to an absolute amount
    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        user_id: UserId,
        ingredient_id: IngredientId,
        amount: f64,
    ) -> Result<StockOutcome> {
        let update = db::set_stock(&self.pool, user_id, ingredient_id, amount).await?;

        let (added, removed) = if update.increased() {
            let change = self.recompute(user_id).await?;
            (change.added, change.removed)
        } else {
            (BTreeSet::new(), self.retract(user_id, &[update]).await?)
        };

        Ok(StockOutcome {
            report: None,
            updates: vec![update],
            added,
            removed,
        })
    }

    /// Full recompute of a user's cookable set, replacing the stored set
    #[instrument(skip(self))]
    pub async fn recompute(&self, user_id: UserId) -> Result<CookableChange> {
        let stock = self.stock_levels(user_id).await?;
        let recipes = db::get_all_recipe_ids(&self.pool).await?;
        let requirements = index_requirements(db::get_all_requirements(&self.pool).await?);

        let cookable = compute_cookable(&stock, &recipes, &requirements);
        let previous = db::get_cookable_set(&self.pool, user_id).await?;
        db::replace_cookable_set(&self.pool, user_id, &cookable).await?;

        let change = CookableChange {
            added: cookable.difference(&previous).copied().collect(),
            removed: previous.difference(&cookable).copied().collect(),
            cookable,
        };
        info!(
            user_id,
            cookable = change.cookable.len(),
            added = change.added.len(),
            removed = change.removed.len(),
            "Recomputed cookable recipes"
        );
        Ok(change)
    }

    /// Stored cookable recipes, optionally limited to one dish type
    pub async fn cookable_recipes(
        &self,
        user_id: UserId,
        dish_type: Option<&str>,
    ) -> Result<Vec<RecipeSummary>> {
        db::list_cookable_summaries(&self.pool, user_id, dish_type).await
    }

    pub async fn recipe_detail(&self, recipe_id: RecipeId) -> Result<Option<RecipeDetail>> {
        db::get_recipe_detail(&self.pool, recipe_id).await
    }

    pub async fn dish_types(&self) -> Result<Vec<DishType>> {
        db::list_dish_types(&self.pool).await
    }

    async fn stock_levels(&self, user_id: UserId) -> Result<StockLevels> {
        Ok(db::get_user_stock(&self.pool, user_id)
            .await?
            .into_iter()
            .map(|entry| (entry.ingredient_id, entry.amount))
            .collect())
    }

    /// Drop stored recipes that a decrease made uncookable
    async fn retract(&self, user_id: UserId, updates: &[StockUpdate]) -> Result<BTreeSet<RecipeId>> {
        let decreased: BTreeSet<IngredientId> = updates
            .iter()
            .filter(|u| u.decreased())
            .map(|u| u.ingredient_id)
            .collect();
        if decreased.is_empty() {
            return Ok(BTreeSet::new());
        }

        let stock = self.stock_levels(user_id).await?;
        let requirements = index_requirements(db::get_all_requirements(&self.pool).await?);
        let mut cookable = db::get_cookable_set(&self.pool, user_id).await?;

        let mut removed = BTreeSet::new();
        for ingredient in decreased {
            removed.extend(retract_after_decrease(&mut cookable, &stock, &requirements, ingredient));
        }

        db::remove_cookable(&self.pool, user_id, &removed).await?;
        Ok(removed)
    }
}
