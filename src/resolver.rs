//! # Name Resolver
//!
//! Matches noisy ingredient names ("roma tomatos", "Honeydew melon") to exactly
//! one catalog entry.
//!
//! Resolution runs in two stages:
//!
//! 1. **Local match**: exact, case- and whitespace-insensitive, with a simple
//!    plural fallback. A catalog name merely contained in the raw text is not
//!    enough: "peanut butter" is not "Butter".
//! 2. **Model match**: the raw text and the longest-first catalog name list
//!    go to the inference endpoint, which must answer with a JSON object
//!    `{status, ingredient_name, candidates}`.
//!
//! The model reply is untrusted. It is decoded into [`ResolverReply`] and
//! checked against the catalog before it becomes a [`ResolutionResult`];
//! anything that fails validation becomes [`ResolutionResult::Unknown`].
//!
//! Whenever one candidate name is contained in another, the longer, more
//! specific name wins ("Honeydew" over "Honey").

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::CatalogSnapshot;
use crate::llm::{InferenceRequest, InferenceTask, LanguageModel};
use crate::model::IngredientId;

/// Outcome of resolving one raw name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionResult {
    /// Exactly one catalog entry matched
    Resolved {
        ingredient_id: IngredientId,
        canonical_name: String,
    },
    /// Several catalog entries are plausible
    Ambiguous { candidates: Vec<String> },
    /// Nothing in the catalog matches
    Unknown,
}

impl ResolutionResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionResult::Resolved { .. })
    }
}

/// Status values the model may answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyStatus {
    Resolved,
    Ambiguous,
    Unknown,
}

/// Wire shape of the model's answer, before validation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolverReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub ingredient_name: Option<String>,
    #[serde(default)]
    pub candidates: Vec<String>,
}

/// Resolve `raw_name` against the catalog, asking the model when needed
pub async fn resolve_ingredient(
    model: &dyn LanguageModel,
    raw_name: &str,
    catalog: &CatalogSnapshot,
) -> ResolutionResult {
    if let Some(result) = resolve_locally(raw_name, catalog) {
        debug!(raw = %raw_name, ?result, "Resolved ingredient locally");
        return result;
    }

    let request = InferenceRequest::new(
        InferenceTask::ResolveName,
        build_resolution_prompt(raw_name, catalog.names()),
    );

    match model.complete(&request).await {
        Ok(reply) => interpret_reply(&reply, raw_name, catalog),
        Err(err) => {
            warn!(raw = %raw_name, error = %err, "Name resolution call failed, treating as unknown");
            ResolutionResult::Unknown
        }
    }
}

/// Deterministic resolution; `None` means the model has to decide
///
/// Only exact and plural-stripped matches resolve here.
pub fn resolve_locally(raw_name: &str, catalog: &CatalogSnapshot) -> Option<ResolutionResult> {
    let normalized = normalize_text(raw_name);
    if normalized.is_empty() {
        return Some(ResolutionResult::Unknown);
    }

    singular_variants(&normalized)
        .iter()
        .find_map(|variant| catalog.id_for(variant))
        .map(|id| resolved(id, catalog))
}

/// Turn a raw model reply into a validated result
pub fn interpret_reply(reply: &str, raw_name: &str, catalog: &CatalogSnapshot) -> ResolutionResult {
    let parsed: ResolverReply = match serde_json::from_str(strip_code_fence(reply)) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(raw = %raw_name, error = %err, "Malformed resolver reply, treating as unknown");
            return ResolutionResult::Unknown;
        }
    };

    match parsed.status {
        ReplyStatus::Resolved => {
            let Some(name) = parsed.ingredient_name.as_deref() else {
                warn!(raw = %raw_name, "Resolver reply has no ingredient name");
                return ResolutionResult::Unknown;
            };
            let Some(id) = catalog.id_for(name) else {
                warn!(raw = %raw_name, name, "Resolver picked a name outside the catalog");
                return ResolutionResult::Unknown;
            };
            let id = more_specific_match(id, raw_name, catalog);
            resolved(id, catalog)
        }
        ReplyStatus::Ambiguous => {
            let known: Vec<&str> = parsed
                .candidates
                .iter()
                .filter_map(|c| catalog.id_for(c).and_then(|id| catalog.canonical_name(id)))
                .collect();
            let mut candidates: Vec<String> = Vec::new();
            for name in prefer_longest(&known) {
                if !candidates.iter().any(|c| c == name) {
                    candidates.push(name.to_string());
                }
            }

            if candidates.is_empty() {
                ResolutionResult::Unknown
            } else {
                ResolutionResult::Ambiguous { candidates }
            }
        }
        ReplyStatus::Unknown => ResolutionResult::Unknown,
    }
}

fn resolved(id: IngredientId, catalog: &CatalogSnapshot) -> ResolutionResult {
    ResolutionResult::Resolved {
        ingredient_id: id,
        canonical_name: catalog.canonical_name(id).unwrap_or_default().to_string(),
    }
}

/// Swap a model pick for a longer catalog name that contains it and also
/// occurs in the raw text
fn more_specific_match(id: IngredientId, raw_name: &str, catalog: &CatalogSnapshot) -> IngredientId {
    let Some(picked) = catalog.canonical_name(id).map(normalize_text) else {
        return id;
    };
    let raw = normalize_text(raw_name);

    catalog
        .names()
        .iter()
        .map(|name| normalize_text(name))
        .find(|name| {
            name.len() > picked.len()
                && name.contains(&picked)
                && contains_on_word_boundary(&raw, name)
        })
        .and_then(|name| catalog.id_for(&name))
        .unwrap_or(id)
}

/// Drop every name contained in another name of the list
fn prefer_longest<'a>(names: &[&'a str]) -> Vec<&'a str> {
    names
        .iter()
        .copied()
        .filter(|name| {
            let lowered = name.to_lowercase();
            !names.iter().any(|other| {
                let other = other.to_lowercase();
                other.len() > lowered.len() && other.contains(&lowered)
            })
        })
        .collect()
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn singular_variants(name: &str) -> Vec<String> {
    let mut variants = vec![name.to_string()];
    if let Some(stem) = name.strip_suffix("es") {
        variants.push(stem.to_string());
    }
    if let Some(stem) = name.strip_suffix('s') {
        variants.push(stem.to_string());
    }
    variants
}

fn contains_on_word_boundary(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn build_resolution_prompt(raw_name: &str, catalog_names: &[String]) -> String {
    let allowed = serde_json::to_string(catalog_names).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You are an ingredient normalizer.

Raw ingredient:
"{raw_name}"

Allowed ingredient list (sorted by specificity):
{allowed}

Return EXACTLY this JSON:
{{
  "status": "RESOLVED" | "AMBIGUOUS" | "UNKNOWN",
  "ingredient_name": string | null,
  "candidates": string[]
}}

Rules:
- ingredient_name MUST be from the allowed list
- If one ingredient name is a substring of another,
  ALWAYS choose the LONGER name
- Prefer exact matches over semantic ones
- Do NOT collapse ingredients into more generic ones
- No explanations
"#
    )
}
