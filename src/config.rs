//! # Configuration Module
//!
//! This module defines configuration structures for the pantry service,
//! including inference endpoint settings, recovery settings for inference calls,
//! and reconciliation pipeline options. Values come from the environment
//! (optionally via a `.env` file).

use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;

// Constants for inference configuration
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo-16k";

/// Recovery configuration for inference calls
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single inference attempt in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 1000,  // 1 second
            max_retry_delay_ms: 10000,  // 10 seconds
            operation_timeout_secs: 30, // 30 seconds
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Connection settings for the OpenAI-compatible inference endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// Base URL, without the trailing `/chat/completions`
    pub base_url: String,
    /// Bearer token; `None` for local servers that need no auth
    pub api_key: Option<String>,
    /// Model name sent with every request
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Retry, timeout and circuit breaker settings
    pub recovery: RecoveryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.0,
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Options for the reconciliation pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Drop entries the classifier labels as prepared dishes
    pub classify_dishes: bool,
    /// Catalog cache lifetime in seconds; 0 reloads the catalog on every run
    pub catalog_cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_dishes: true,
            catalog_cache_ttl_secs: 0,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from the process environment
    ///
    /// Reads `.env` first if present. `DATABASE_URL` is required; everything
    /// else falls back to its default.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let defaults = RecoveryConfig::default();
        let recovery = RecoveryConfig {
            max_retries: parse_or(&lookup, "LLM_MAX_RETRIES", defaults.max_retries)?,
            base_retry_delay_ms: parse_or(
                &lookup,
                "LLM_BASE_RETRY_DELAY_MS",
                defaults.base_retry_delay_ms,
            )?,
            max_retry_delay_ms: parse_or(
                &lookup,
                "LLM_MAX_RETRY_DELAY_MS",
                defaults.max_retry_delay_ms,
            )?,
            operation_timeout_secs: parse_or(
                &lookup,
                "LLM_TIMEOUT_SECS",
                defaults.operation_timeout_secs,
            )?,
            circuit_breaker_threshold: parse_or(
                &lookup,
                "LLM_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            )?,
            circuit_breaker_reset_secs: parse_or(
                &lookup,
                "LLM_BREAKER_RESET_SECS",
                defaults.circuit_breaker_reset_secs,
            )?,
        };

        let llm = LlmConfig {
            base_url: lookup("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            api_key: lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")),
            model: lookup("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            temperature: 0.0,
            recovery,
        };

        let pipeline = PipelineConfig {
            classify_dishes: parse_or(&lookup, "CLASSIFY_DISHES", true)?,
            catalog_cache_ttl_secs: parse_or(&lookup, "CATALOG_CACHE_TTL_SECS", 0)?,
        };

        Ok(Self {
            database_url,
            llm,
            pipeline,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}
