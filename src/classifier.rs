//! Dish-vs-ingredient filter.
//!
//! Photo detection and free-text entry both produce things like "lasagna"
//! next to "tomato". Prepared dishes are not stock, so the pipeline asks the
//! inference endpoint to label each entry. The call fails open: any reply
//! other than `DISH` keeps the entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::llm::{InferenceRequest, InferenceTask, LanguageModel};

/// Label for one raw entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FoodKind {
    Ingredient,
    Dish,
}

impl FoodKind {
    /// Parse a model reply; `None` for anything but the two labels
    pub fn from_reply(reply: &str) -> Option<Self> {
        match reply.trim().trim_matches(|c: char| c == '.' || c == '"').to_uppercase().as_str() {
            "INGREDIENT" => Some(FoodKind::Ingredient),
            "DISH" => Some(FoodKind::Dish),
            _ => None,
        }
    }
}

impl fmt::Display for FoodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoodKind::Ingredient => write!(f, "INGREDIENT"),
            FoodKind::Dish => write!(f, "DISH"),
        }
    }
}

/// Classify `text` as a raw ingredient or a prepared dish
pub async fn classify_food(model: &dyn LanguageModel, text: &str) -> FoodKind {
    let request = InferenceRequest::new(InferenceTask::ClassifyFood, build_classification_prompt(text));

    match model.complete(&request).await {
        Ok(reply) => match FoodKind::from_reply(&reply) {
            Some(kind) => {
                debug!(text, %kind, "Classified entry");
                kind
            }
            None => {
                warn!(text, reply = %reply.trim(), "Unrecognized classification, keeping entry");
                FoodKind::Ingredient
            }
        },
        Err(err) => {
            warn!(text, error = %err, "Classification call failed, keeping entry");
            FoodKind::Ingredient
        }
    }
}

fn build_classification_prompt(text: &str) -> String {
    format!(
        r#"Classify the following as either:

INGREDIENT -> raw food item
DISH       -> prepared meal or recipe

Text:
"{text}"

Return ONLY one word.
"#
    )
}
