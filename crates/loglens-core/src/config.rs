//! Configuration for the loglens orchestrator.
//!
//! Defaults are overridable through `LOGLENS_*` environment variables,
//! read once at startup.

use crate::error::{Error, Result};
use crate::types::LogLevel;
use serde::{Deserialize, Serialize};

/// Default fast-tier score at or above which an anomaly is escalated to
/// the LLM. The single tunable trading LLM cost against recall.
pub const DEFAULT_ESCALATION_THRESHOLD: f64 = 0.7;

/// Default minimum LLM confidence for a confirmed anomaly
pub const DEFAULT_VALIDATION_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Default embedding cache capacity
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default cap on representative log ids stored per cluster
pub const DEFAULT_REPRESENTATIVE_CAP: usize = 20;

/// Default cap on outliers the validation sweep processes per run
pub const DEFAULT_MAX_VALIDATED_OUTLIERS: usize = 50;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Tiered detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Fast score required before the LLM tier runs (see §escalation)
    pub escalation_threshold: f64,
    /// LLM confidence required to confirm an anomaly
    pub validation_confidence_threshold: f64,
    /// Levels that qualify for embedding generation; lower levels are
    /// scored on structured features only
    pub embed_levels: Vec<LogLevel>,
    /// Recent normal logs included in validation prompts
    pub context_logs: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            validation_confidence_threshold: DEFAULT_VALIDATION_CONFIDENCE_THRESHOLD,
            embed_levels: vec![LogLevel::Error, LogLevel::Warn],
            context_logs: 5,
        }
    }
}

/// Daily spending ceiling for metered provider calls
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BudgetConfig {
    /// `None` means unlimited (spend is still tracked)
    pub daily_budget_usd: Option<f64>,
}

/// Embedding cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Batch clustering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    /// Cap on vectors clustered per run; `None` clusters the whole window
    pub sample_size: Option<usize>,
    pub cluster_selection_epsilon: f64,
    /// Cap on representative log ids stored per cluster
    pub representative_cap: usize,
    /// Seed for reproducible window sampling
    pub sampling_seed: u64,
    /// Cap on outliers validated per sweep
    pub max_validated_outliers: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
            sample_size: None,
            cluster_selection_epsilon: 0.0,
            representative_cap: DEFAULT_REPRESENTATIVE_CAP,
            sampling_seed: 42,
            max_validated_outliers: DEFAULT_MAX_VALIDATED_OUTLIERS,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub budget: BudgetConfig,
    pub cache: CacheConfig,
    pub clustering: ClusteringConfig,
}

impl Config {
    /// Load configuration from `LOGLENS_*` environment variables,
    /// falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let daily_budget_usd = std::env::var("LOGLENS_DAILY_BUDGET_USD")
            .ok()
            .and_then(|v| v.parse().ok());

        let sample_size = std::env::var("LOGLENS_SAMPLE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            detection: DetectionConfig {
                escalation_threshold: env_parse(
                    "LOGLENS_ESCALATION_THRESHOLD",
                    defaults.detection.escalation_threshold,
                ),
                validation_confidence_threshold: env_parse(
                    "LOGLENS_VALIDATION_CONFIDENCE_THRESHOLD",
                    defaults.detection.validation_confidence_threshold,
                ),
                embed_levels: defaults.detection.embed_levels,
                context_logs: env_parse("LOGLENS_CONTEXT_LOGS", defaults.detection.context_logs),
            },
            budget: BudgetConfig { daily_budget_usd },
            cache: CacheConfig {
                capacity: env_parse("LOGLENS_CACHE_CAPACITY", defaults.cache.capacity),
            },
            clustering: ClusteringConfig {
                min_cluster_size: env_parse(
                    "LOGLENS_MIN_CLUSTER_SIZE",
                    defaults.clustering.min_cluster_size,
                ),
                min_samples: env_parse("LOGLENS_MIN_SAMPLES", defaults.clustering.min_samples),
                sample_size,
                cluster_selection_epsilon: env_parse(
                    "LOGLENS_CLUSTER_SELECTION_EPSILON",
                    defaults.clustering.cluster_selection_epsilon,
                ),
                representative_cap: env_parse(
                    "LOGLENS_REPRESENTATIVE_CAP",
                    defaults.clustering.representative_cap,
                ),
                sampling_seed: env_parse("LOGLENS_SAMPLING_SEED", defaults.clustering.sampling_seed),
                max_validated_outliers: env_parse(
                    "LOGLENS_MAX_VALIDATED_OUTLIERS",
                    defaults.clustering.max_validated_outliers,
                ),
            },
        }
    }

    /// Reject out-of-range settings before wiring anything up
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection.escalation_threshold) {
            return Err(Error::config(
                "escalation_threshold must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.validation_confidence_threshold) {
            return Err(Error::config(
                "validation_confidence_threshold must be between 0.0 and 1.0",
            ));
        }
        if let Some(limit) = self.budget.daily_budget_usd {
            if limit < 0.0 {
                return Err(Error::config("daily_budget_usd must be non-negative"));
            }
        }
        if self.clustering.min_cluster_size < 2 {
            return Err(Error::config("min_cluster_size must be at least 2"));
        }
        if self.clustering.min_samples == 0 {
            return Err(Error::config("min_samples must be at least 1"));
        }
        if self.cache.capacity == 0 {
            return Err(Error::config("cache capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn default_thresholds() {
        let config = Config::default();
        assert_eq!(config.detection.escalation_threshold, 0.7);
        assert_eq!(config.detection.validation_confidence_threshold, 0.6);
        assert!(config.budget.daily_budget_usd.is_none());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = Config::default();
        config.detection.escalation_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_cluster_size_rejected() {
        let mut config = Config::default();
        config.clustering.min_cluster_size = 1;
        assert!(config.validate().is_err());
    }
}
