use pantry::catalog::CatalogSnapshot;
use pantry::config::{PipelineConfig, RecoveryConfig};
use pantry::errors::InferenceError;
use pantry::llm::{GuardedModel, InferenceTask, LanguageModel, ScriptedModel};
use pantry::model::{CanonicalRow, CatalogEntry, IngredientInput};
use pantry::pipeline::{ConversionPath, EntryOutcome, ReconciliationPipeline, SkipReason};
use pantry::resolver::ResolutionResult;
use std::sync::Arc;

fn catalog() -> CatalogSnapshot {
    CatalogSnapshot::new(vec![
        CatalogEntry::new(1, "Honey", "Tablespoons"),
        CatalogEntry::new(2, "Honeydew", "pcs"),
        CatalogEntry::new(3, "Tomato", "kg"),
        CatalogEntry::new(4, "Cherry Tomato", "gram"),
        CatalogEntry::new(5, "Flour", "gram"),
        CatalogEntry::new(6, "Butter", "gram"),
        CatalogEntry::new(7, "Milk", "ml"),
    ])
}

fn fast_recovery() -> RecoveryConfig {
    RecoveryConfig {
        max_retries: 1,
        base_retry_delay_ms: 1,
        max_retry_delay_ms: 2,
        operation_timeout_secs: 5,
        circuit_breaker_threshold: 2,
        circuit_breaker_reset_secs: 60,
    }
}

/// Script covering a typical fridge-photo batch
fn fridge_model() -> ScriptedModel {
    ScriptedModel::new()
        .on(InferenceTask::ClassifyFood, "\"leftover lasagna\"", "DISH")
        .on(InferenceTask::ClassifyFood, "", "INGREDIENT")
        .on(
            InferenceTask::ResolveName,
            "\"roma tomatos\"",
            r#"{"status": "RESOLVED", "ingredient_name": "Tomato", "candidates": []}"#,
        )
        .on(
            InferenceTask::ResolveName,
            "\"Honeydew melon\"",
            r#"{"status": "RESOLVED", "ingredient_name": "Honey", "candidates": []}"#,
        )
        .on(
            InferenceTask::ResolveName,
            "\"sweet stuff\"",
            r#"{"status": "AMBIGUOUS", "ingredient_name": null, "candidates": ["Honey", "Honeydew"]}"#,
        )
        .on(
            InferenceTask::ResolveName,
            "\"mystery jar\"",
            "I am not sure what this is.",
        )
        .on(InferenceTask::EstimateConversion, "Ingredient: Butter", "113.4")
}

#[tokio::test]
async fn test_fridge_batch_end_to_end() {
    let model = Arc::new(fridge_model());
    let pipeline = ReconciliationPipeline::new(model.clone(), PipelineConfig::default());

    let inputs = vec![
        IngredientInput::new("roma tomatos", "05 Kg"),
        IngredientInput::new("Honeydew melon", "2 pieces"),
        IngredientInput::new("leftover lasagna", "1 pcs"),
        IngredientInput::new("sweet stuff", "1 tbsp"),
        IngredientInput::new("mystery jar", "1 cup"),
        IngredientInput::new("flour", "2 cups"),
        IngredientInput::new("butter", "1 stick"),
        IngredientInput::new("honey", "3 tsp"),
        IngredientInput::new("milk", "half a glass"),
    ];

    let report = pipeline.reconcile(&catalog(), &inputs).await.unwrap();

    assert_eq!(
        report.rows(),
        vec![
            CanonicalRow::new(3, 5.0, "kg"),
            CanonicalRow::new(2, 2.0, "pcs"),
            CanonicalRow::new(5, 480.0, "gram"),
            CanonicalRow::new(6, 113.4, "gram"),
            // teaspoon -> tablespoon is not in the table; the estimator gets
            // no scripted reply and keeps the amount
            CanonicalRow::new(1, 3.0, "tablespoon"),
        ]
    );
    assert_eq!(report.reconciled(), 5);
    assert_eq!(report.skipped(), 4);
    assert_eq!(report.estimated(), 2);

    match &report.outcomes[3] {
        EntryOutcome::Skipped {
            reason: SkipReason::Unresolved(ResolutionResult::Ambiguous { candidates }),
            ..
        } => assert_eq!(candidates, &vec!["Honeydew".to_string()]),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(matches!(
        &report.outcomes[2],
        EntryOutcome::Skipped {
            reason: SkipReason::Dish,
            ..
        }
    ));
    assert!(matches!(
        &report.outcomes[5],
        EntryOutcome::Reconciled {
            path: ConversionPath::Table,
            ..
        }
    ));

    // only the names without an exact or plural match reach the model, and
    // "Honey" picked for "Honeydew melon" is upgraded to the longer name
    assert_eq!(model.count_for(InferenceTask::ResolveName), 4);
    assert_eq!(model.count_for(InferenceTask::ClassifyFood), inputs.len());
}

#[tokio::test]
async fn test_classification_can_be_disabled() {
    let model = Arc::new(fridge_model());
    let config = PipelineConfig {
        classify_dishes: false,
        ..Default::default()
    };
    let pipeline = ReconciliationPipeline::new(model.clone(), config);

    let report = pipeline
        .reconcile(&catalog(), &[IngredientInput::new("cherry tomatoes", "250 g")])
        .await
        .unwrap();

    assert_eq!(report.rows(), vec![CanonicalRow::new(4, 250.0, "gram")]);
    assert_eq!(model.count_for(InferenceTask::ClassifyFood), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried_through_guard() {
    let scripted = Arc::new(
        ScriptedModel::new()
            .fail_on(
                InferenceTask::ResolveName,
                "\"tomatoe sauce base\"",
                InferenceError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                },
            ),
    );
    let guarded = GuardedModel::new(scripted.clone(), fast_recovery());
    let pipeline = ReconciliationPipeline::new(
        Arc::new(guarded),
        PipelineConfig {
            classify_dishes: false,
            ..Default::default()
        },
    );

    let report = pipeline
        .reconcile(&catalog(), &[IngredientInput::new("tomatoe sauce base", "1 kg")])
        .await
        .unwrap();

    // the failure degrades to an unresolved skip after one retry
    assert!(report.rows().is_empty());
    assert_eq!(scripted.count_for(InferenceTask::ResolveName), 2);
}

#[tokio::test]
async fn test_open_breaker_degrades_every_call() {
    let scripted = Arc::new(ScriptedModel::new().fail_on(
        InferenceTask::ClassifyFood,
        "",
        InferenceError::Status {
            status: 401,
            body: "invalid key".to_string(),
        },
    ));
    let guarded = Arc::new(GuardedModel::new(scripted.clone(), fast_recovery()));
    let pipeline = ReconciliationPipeline::new(guarded.clone(), PipelineConfig::default());

    let inputs = vec![
        IngredientInput::new("flour", "1 cup"),
        IngredientInput::new("milk", "200 ml"),
        IngredientInput::new("butter", "50 g"),
        IngredientInput::new("tomato", "1 kg"),
    ];
    let report = pipeline.reconcile(&catalog(), &inputs).await.unwrap();

    // classification fails open, so every entry still reconciles
    assert_eq!(report.reconciled(), 4);
    assert!(guarded.circuit_breaker().is_open());
    // two permanent failures opened the breaker; later calls never reached the model
    assert_eq!(scripted.count_for(InferenceTask::ClassifyFood), 2);

    let direct = guarded
        .complete(&pantry::llm::InferenceRequest::new(
            InferenceTask::ClassifyFood,
            "anything".to_string(),
        ))
        .await;
    assert_eq!(direct, Err(InferenceError::CircuitOpen));
}
