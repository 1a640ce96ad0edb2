//! TOML configuration for the orchestrator.

use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root orchestrator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    /// Session budget.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Request routing.
    #[serde(default)]
    pub routing: RoutingSettings,
    /// Prompt filtering.
    #[serde(default)]
    pub security: SecuritySettings,
    /// Task scheduling.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

/// Session budget configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Maximum session cost in USD. None means no cost limit.
    #[serde(default)]
    pub max_cost: Option<f64>,
    /// Maximum session tokens. None means no token limit.
    #[serde(default)]
    pub max_tokens: Option<u64>,
    /// Warning thresholds as percentages of the cost limit.
    #[serde(default = "default_warning_thresholds")]
    pub warning_at_percent: Vec<u8>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self { max_cost: None, max_tokens: None, warning_at_percent: default_warning_thresholds() }
    }
}

impl BudgetConfig {
    /// A budget with only a cost limit.
    #[must_use]
    pub fn with_cost_limit(max_cost: f64) -> Self {
        Self { max_cost: Some(max_cost), ..Self::default() }
    }
}

fn default_warning_thresholds() -> Vec<u8> {
    vec![80, 90]
}

/// Routing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingSettings {
    /// Maximum bundle nesting depth.
    #[serde(default = "default_bundle_depth")]
    pub max_bundle_depth: usize,
    /// Provider tags excluded from every pipeline.
    #[serde(default)]
    pub disabled_providers: Vec<String>,
    /// Pricing overrides.
    #[serde(default)]
    pub pricing: Vec<PricingEntry>,
    /// Optional circuit breaker.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSettings>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            max_bundle_depth: default_bundle_depth(),
            disabled_providers: Vec::new(),
            pricing: Vec::new(),
            circuit_breaker: None,
        }
    }
}

fn default_bundle_depth() -> usize {
    4
}

/// Price of one provider/model pair.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingEntry {
    /// Provider tag.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// USD per 1M input tokens.
    #[serde(default)]
    pub input_per_1m: f64,
    /// USD per 1M output tokens.
    #[serde(default)]
    pub output_per_1m: f64,
    /// Flat USD per request (media generation).
    #[serde(default)]
    pub per_request: f64,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Failure rate (0-1) above which a provider's circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Sliding window for the failure rate.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Time an open circuit waits before a trial request.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Samples required before the circuit may open.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
            min_samples: default_min_samples(),
        }
    }
}

fn default_failure_threshold() -> f64 {
    0.5
}

fn default_window_secs() -> u64 {
    300
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_min_samples() -> usize {
    8
}

/// Prompt filter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    /// Regexes that block a prompt outright.
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    /// Replace credentials found in prompts with placeholders.
    #[serde(default = "default_true")]
    pub redact_credentials: bool,
    /// Maximum prompt length in characters.
    #[serde(default)]
    pub max_prompt_chars: Option<usize>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self { blocked_patterns: Vec::new(), redact_credentials: true, max_prompt_chars: None }
    }
}

fn default_true() -> bool {
    true
}

/// What a rejected task means for the tasks that depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyFailurePolicy {
    /// A rejected dependency still counts as resolved; dependents run.
    #[default]
    Unblock,
    /// Dependents of a rejected task are rejected without running.
    Block,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerSettings {
    /// Failed-dependency policy.
    #[serde(default)]
    pub dependency_failure_policy: DependencyFailurePolicy,
    /// Optional bound on concurrently running tasks per wave.
    #[serde(default)]
    pub max_concurrent_tasks: Option<usize>,
}

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<OrchestratorConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or validated.
    pub fn parse(content: &str) -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    /// Returns error describing the first invalid value.
    pub fn validate(config: &OrchestratorConfig) -> Result<()> {
        if let Some(max_cost) = config.budget.max_cost {
            if !max_cost.is_finite() || max_cost < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "budget.max_cost must be a finite non-negative number, got {}",
                    max_cost
                )));
            }
        }

        for threshold in &config.budget.warning_at_percent {
            if *threshold > 100 {
                return Err(ConfigError::Validation(format!(
                    "budget.warning_at_percent entries must be between 0 and 100, got {}",
                    threshold
                )));
            }
        }

        if config.routing.max_bundle_depth == 0 {
            return Err(ConfigError::Validation(
                "routing.max_bundle_depth must be at least 1".to_string(),
            ));
        }

        for entry in &config.routing.pricing {
            let prices = [entry.input_per_1m, entry.output_per_1m, entry.per_request];
            if prices.iter().any(|price| !price.is_finite() || *price < 0.0) {
                return Err(ConfigError::Validation(format!(
                    "Pricing for '{}:{}' must be finite and non-negative",
                    entry.provider, entry.model
                )));
            }
        }

        if let Some(ref breaker) = config.routing.circuit_breaker {
            if !(0.0..=1.0).contains(&breaker.failure_threshold) {
                return Err(ConfigError::Validation(format!(
                    "routing.circuit_breaker.failure_threshold must be between 0.0 and 1.0, got {}",
                    breaker.failure_threshold
                )));
            }
        }

        for pattern in &config.security.blocked_patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "Invalid blocked pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        if config.scheduler.max_concurrent_tasks == Some(0) {
            return Err(ConfigError::Validation(
                "scheduler.max_concurrent_tasks must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
