//! # Reconciliation Pipeline
//!
//! Turns a batch of raw `(ingredient, quantity)` entries into canonical rows
//! keyed by catalog id and expressed in each ingredient's canonical unit.
//!
//! ## Per-entry flow
//!
//! 1. Optional dish filter ([`classify_food`])
//! 2. Name resolution ([`resolve_ingredient`]); anything but `Resolved` is skipped
//! 3. Quantity parsing ([`parse_quantity`]); unparseable text is skipped
//! 4. Canonical unit lookup in the catalog snapshot
//! 5. Conversion: identity, then the fixed table, then [`estimate_conversion`]
//!
//! The batch is best effort. A skipped entry never aborts the rest and is
//! reported only through its [`EntryOutcome`]. The one exception is a resolved
//! ingredient with no canonical unit, which means the catalog and the resolver
//! disagree and fails the whole run.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::CatalogSnapshot;
use crate::classifier::{classify_food, FoodKind};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::estimator::estimate_conversion;
use crate::llm::LanguageModel;
use crate::model::{round_amount, CanonicalRow, IngredientInput};
use crate::quantity::parse_quantity;
use crate::resolver::{resolve_ingredient, ResolutionResult};
use crate::units::convert_amount;

/// How an amount reached its canonical unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionPath {
    /// Parsed unit already was the canonical unit
    Identity,
    /// Fixed conversion table
    Table,
    /// Inference estimate after guardrails
    Estimated,
}

impl fmt::Display for ConversionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionPath::Identity => write!(f, "identity"),
            ConversionPath::Table => write!(f, "table"),
            ConversionPath::Estimated => write!(f, "estimated"),
        }
    }
}

/// Why an entry produced no row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    Dish,
    Unresolved(ResolutionResult),
    UnparseableQuantity,
}

/// Result of reconciling one input entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EntryOutcome {
    Reconciled {
        row: CanonicalRow,
        path: ConversionPath,
    },
    Skipped {
        input: IngredientInput,
        reason: SkipReason,
    },
}

/// Outcomes of one batch, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub outcomes: Vec<EntryOutcome>,
}

impl ReconciliationReport {
    /// Canonical rows of the reconciled entries
    pub fn rows(&self) -> Vec<CanonicalRow> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                EntryOutcome::Reconciled { row, .. } => Some(row.clone()),
                EntryOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn reconciled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, EntryOutcome::Reconciled { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.reconciled()
    }

    /// Rows whose amount came from the estimating converter
    pub fn estimated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    EntryOutcome::Reconciled {
                        path: ConversionPath::Estimated,
                        ..
                    }
                )
            })
            .count()
    }
}

/// Sequential reconciliation over one catalog snapshot
pub struct ReconciliationPipeline {
    model: Arc<dyn LanguageModel>,
    config: PipelineConfig,
}

impl ReconciliationPipeline {
    pub fn new(model: Arc<dyn LanguageModel>, config: PipelineConfig) -> Self {
        Self { model, config }
    }

    /// Reconcile a batch against `catalog`
    ///
    /// # Errors
    ///
    /// [`PipelineError::CatalogInconsistency`] when a resolved ingredient has
    /// no canonical unit. Every other failure only skips its entry.
    pub async fn reconcile(
        &self,
        catalog: &CatalogSnapshot,
        inputs: &[IngredientInput],
    ) -> Result<ReconciliationReport, PipelineError> {
        let mut report = ReconciliationReport::default();

        for input in inputs {
            let outcome = self.reconcile_entry(catalog, input).await?;
            if let EntryOutcome::Skipped { input, reason } = &outcome {
                debug!(ingredient = %input.ingredient, quantity = %input.quantity, ?reason, "Skipped entry");
            }
            report.outcomes.push(outcome);
        }

        info!(
            inputs = inputs.len(),
            reconciled = report.reconciled(),
            skipped = report.skipped(),
            estimated = report.estimated(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_entry(
        &self,
        catalog: &CatalogSnapshot,
        input: &IngredientInput,
    ) -> Result<EntryOutcome, PipelineError> {
        let model = self.model.as_ref();
        let skip = |reason| EntryOutcome::Skipped {
            input: input.clone(),
            reason,
        };

        if self.config.classify_dishes
            && classify_food(model, &input.ingredient).await == FoodKind::Dish
        {
            return Ok(skip(SkipReason::Dish));
        }

        let (ingredient_id, canonical_name) =
            match resolve_ingredient(model, &input.ingredient, catalog).await {
                ResolutionResult::Resolved {
                    ingredient_id,
                    canonical_name,
                } => (ingredient_id, canonical_name),
                other => return Ok(skip(SkipReason::Unresolved(other))),
            };

        let Some(parsed) = parse_quantity(&input.quantity) else {
            return Ok(skip(SkipReason::UnparseableQuantity));
        };

        let unit = catalog
            .unit_of(ingredient_id)
            .ok_or_else(|| PipelineError::CatalogInconsistency {
                ingredient_id,
                name: canonical_name.clone(),
            })?;

        let (amount, path) = if parsed.unit == unit {
            (parsed.value, ConversionPath::Identity)
        } else if let Some(converted) = convert_amount(parsed.value, &parsed.unit, unit) {
            (converted, ConversionPath::Table)
        } else {
            let estimated =
                estimate_conversion(model, &canonical_name, parsed.value, &parsed.unit, unit)
                    .await;
            (estimated, ConversionPath::Estimated)
        };

        let row = CanonicalRow::new(ingredient_id, round_amount(amount), unit);
        debug!(
            raw = %input.ingredient,
            ingredient = %canonical_name,
            %row,
            %path,
            "Reconciled entry"
        );
        Ok(EntryOutcome::Reconciled { row, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{InferenceTask, ScriptedModel};
    use crate::model::CatalogEntry;

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new(vec![
            CatalogEntry::new(1, "Tomato", "kg"),
            CatalogEntry::new(2, "Sugar", "gram"),
            CatalogEntry::new(3, "Egg", "pcs"),
            CatalogEntry::new(4, "Milk", "ml"),
        ])
    }

    fn no_classification() -> PipelineConfig {
        PipelineConfig {
            classify_dishes: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_identity_and_table_paths() {
        let model = Arc::new(ScriptedModel::new());
        let pipeline = ReconciliationPipeline::new(model.clone(), no_classification());

        let report = pipeline
            .reconcile(
                &catalog(),
                &[
                    IngredientInput::new("tomatoes", "2 kg"),
                    IngredientInput::new("sugar", "1 cup"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            report.rows(),
            vec![CanonicalRow::new(1, 2.0, "kg"), CanonicalRow::new(2, 240.0, "gram")]
        );
        assert_eq!(report.estimated(), 0);
        assert_eq!(model.request_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_entries_are_dropped_without_error() {
        let model = Arc::new(ScriptedModel::new().on(
            InferenceTask::ResolveName,
            "\"unobtainium\"",
            r#"{"status": "UNKNOWN", "ingredient_name": null, "candidates": []}"#,
        ));
        let pipeline = ReconciliationPipeline::new(model, no_classification());

        let report = pipeline
            .reconcile(
                &catalog(),
                &[
                    IngredientInput::new("tomato", "1 kg"),
                    IngredientInput::new("unobtainium", "3 kg"),
                    IngredientInput::new("dragon fruit", "2 pcs"),
                    IngredientInput::new("egg", "a few"),
                    IngredientInput::new("milk", "500 ml"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.rows().len(), 2);
        assert_eq!(report.reconciled(), 2);
        assert_eq!(report.skipped(), 3);
        assert!(matches!(
            &report.outcomes[3],
            EntryOutcome::Skipped {
                reason: SkipReason::UnparseableQuantity,
                ..
            }
        ));
        assert!(matches!(
            &report.outcomes[1],
            EntryOutcome::Skipped {
                reason: SkipReason::Unresolved(ResolutionResult::Unknown),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dishes_are_filtered() {
        let model = Arc::new(
            ScriptedModel::new()
                .on(InferenceTask::ClassifyFood, "lasagna", "DISH")
                .on(InferenceTask::ClassifyFood, "egg", "INGREDIENT"),
        );
        let pipeline = ReconciliationPipeline::new(model.clone(), PipelineConfig::default());

        let report = pipeline
            .reconcile(
                &catalog(),
                &[
                    IngredientInput::new("lasagna", "1 pcs"),
                    IngredientInput::new("eggs", "6 pcs"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.rows(), vec![CanonicalRow::new(3, 6.0, "pcs")]);
        assert!(matches!(
            &report.outcomes[0],
            EntryOutcome::Skipped {
                reason: SkipReason::Dish,
                ..
            }
        ));
        assert_eq!(model.count_for(InferenceTask::ClassifyFood), 2);
    }

    #[tokio::test]
    async fn test_estimated_conversion_is_rounded_and_counted() {
        let model = Arc::new(ScriptedModel::new().on(
            InferenceTask::EstimateConversion,
            "Egg",
            "2.456",
        ));
        let pipeline = ReconciliationPipeline::new(model, no_classification());

        let report = pipeline
            .reconcile(&catalog(), &[IngredientInput::new("egg", "100 gram")])
            .await
            .unwrap();

        assert_eq!(report.rows(), vec![CanonicalRow::new(3, 2.46, "pcs")]);
        assert_eq!(report.estimated(), 1);
    }

    #[tokio::test]
    async fn test_missing_canonical_unit_fails_the_run() {
        let catalog = CatalogSnapshot::new(vec![CatalogEntry::new(7, "Saffron", "")]);
        let pipeline =
            ReconciliationPipeline::new(Arc::new(ScriptedModel::new()), no_classification());

        let err = pipeline
            .reconcile(&catalog, &[IngredientInput::new("saffron", "1 gram")])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PipelineError::CatalogInconsistency {
                ingredient_id: 7,
                name: "Saffron".to_string()
            }
        );
    }
}
