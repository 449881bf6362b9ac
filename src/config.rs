//! Detection configuration
//!
//! A single value object built once at the call boundary and threaded
//! through every stage. No stage reads process state on its own.

use crate::error::{FdrError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which scoring strategy the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// Windowed reconstruction-error scoring (autoencoder or linear fallback)
    #[default]
    Reconstruction,
    /// Rolling robust z-score combined with an isolation ensemble, per row
    #[value(name = "robust", alias = "robust-ensemble")]
    RobustEnsemble,
}

impl fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionStrategy::Reconstruction => write!(f, "reconstruction"),
            DetectionStrategy::RobustEnsemble => write!(f, "robust"),
        }
    }
}

impl FromStr for DetectionStrategy {
    type Err = FdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reconstruction" | "autoencoder" | "windowed" => Ok(DetectionStrategy::Reconstruction),
            "robust" | "robust_ensemble" | "robust-ensemble" | "ensemble" => {
                Ok(DetectionStrategy::RobustEnsemble)
            }
            _ => Err(FdrError::invalid_parameter(
                "strategy",
                s,
                "expected 'reconstruction' or 'robust'",
            )),
        }
    }
}

/// Configuration for a detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Name of the column holding the session clock
    pub time_column: String,

    /// Scoring strategy
    pub strategy: DetectionStrategy,

    /// Window length in rows (reconstruction path)
    pub window_size: usize,

    /// Row offset between consecutive windows
    pub stride: usize,

    /// Training epochs for the autoencoder engines
    pub epochs: usize,

    /// Mini-batch size for the autoencoder engines
    pub batch_size: usize,

    /// Optimizer step size for the autoencoder engines
    pub learning_rate: f64,

    /// Percentile of the timeline score used as the anomaly threshold
    pub threshold_percentile: f64,

    /// Percentile separating "med" from "low" severity
    pub medium_percentile: f64,

    /// Maximum time gap (seconds) between anomalous rows of one segment
    pub segment_gap_seconds: f64,

    /// Leading fraction of rows (and windows) used to fit scaling and models
    pub train_fraction: f64,

    /// Drivers kept per segment on the reconstruction path
    pub top_drivers: usize,

    /// Drivers kept per segment on the robust path
    pub robust_top_drivers: usize,

    /// Drivers named in a segment's explanation
    pub explanation_drivers: usize,

    /// Rows listed by the review fallback when nothing is flagged
    pub review_limit: usize,

    /// Columns with a larger missing fraction are not used as features
    pub max_missing_ratio: f64,

    /// Minimum number of distinct values for a feature
    pub min_distinct_values: usize,

    /// Rolling window (rows) for robust z-scores
    pub rolling_window: usize,

    /// Minimum valid observations inside a rolling window
    pub rolling_min_periods: usize,

    /// Robust z-score above which a row is anomalous
    pub robust_z_threshold: f64,

    /// Expected outlier share for the isolation ensemble
    pub iforest_contamination: f64,

    /// Number of isolation trees
    pub iforest_estimators: usize,

    /// Sub-sample size per isolation tree
    pub iforest_max_samples: usize,

    /// Random seed shared by every stochastic component
    pub seed: u64,

    /// Emit `debugInfo` in the report
    pub debug: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            time_column: "Session Time".to_string(),
            strategy: DetectionStrategy::Reconstruction,
            window_size: 60,
            stride: 5,
            epochs: 30,
            batch_size: 128,
            learning_rate: 1e-3,
            threshold_percentile: 97.0,
            medium_percentile: 90.0,
            segment_gap_seconds: 2.0,
            train_fraction: 0.7,
            top_drivers: 5,
            robust_top_drivers: 3,
            explanation_drivers: 3,
            review_limit: 10,
            max_missing_ratio: 0.4,
            min_distinct_values: 10,
            rolling_window: 51,
            rolling_min_periods: 10,
            robust_z_threshold: 8.0,
            iforest_contamination: 0.01,
            iforest_estimators: 200,
            iforest_max_samples: 256,
            seed: 42,
            debug: false,
        }
    }
}

impl DetectionConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the scoring strategy
    pub fn with_strategy(mut self, strategy: DetectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder method to set the time column name
    pub fn with_time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = column.into();
        self
    }

    /// Builder method to set window length and stride
    pub fn with_window(mut self, window_size: usize, stride: usize) -> Self {
        self.window_size = window_size;
        self.stride = stride;
        self
    }

    /// Builder method to set training epochs
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Builder method to set mini-batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set the threshold percentile
    pub fn with_threshold_percentile(mut self, percentile: f64) -> Self {
        self.threshold_percentile = percentile;
        self
    }

    /// Builder method to set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to toggle `debugInfo`
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Check every parameter before a run starts
    pub fn validate(&self) -> Result<()> {
        if self.time_column.trim().is_empty() {
            return Err(FdrError::invalid_parameter(
                "time_column",
                &self.time_column,
                "must not be empty",
            ));
        }

        let positive = [
            ("window_size", self.window_size),
            ("stride", self.stride),
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("rolling_window", self.rolling_window),
            ("iforest_estimators", self.iforest_estimators),
            ("iforest_max_samples", self.iforest_max_samples),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(FdrError::invalid_parameter(name, value, "must be positive"));
            }
        }

        for (name, value) in [
            ("threshold_percentile", self.threshold_percentile),
            ("medium_percentile", self.medium_percentile),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(FdrError::invalid_parameter(name, value, "must be within [0, 100]"));
            }
        }

        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(FdrError::invalid_parameter(
                "train_fraction",
                self.train_fraction,
                "must be within (0, 1]",
            ));
        }

        if !(0.0..=1.0).contains(&self.max_missing_ratio) {
            return Err(FdrError::invalid_parameter(
                "max_missing_ratio",
                self.max_missing_ratio,
                "must be within [0, 1]",
            ));
        }

        if !(self.segment_gap_seconds >= 0.0) {
            return Err(FdrError::invalid_parameter(
                "segment_gap_seconds",
                self.segment_gap_seconds,
                "must be non-negative",
            ));
        }

        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(FdrError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be a positive number",
            ));
        }

        if !(0.0..=0.5).contains(&self.iforest_contamination) {
            return Err(FdrError::invalid_parameter(
                "iforest_contamination",
                self.iforest_contamination,
                "must be within [0, 0.5]",
            ));
        }

        Ok(())
    }

    /// Number of leading units that belong to the training prefix
    pub fn train_len(&self, n_units: usize) -> usize {
        if n_units == 0 {
            return 0;
        }
        ((n_units as f64 * self.train_fraction) as usize).clamp(1, n_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetectionConfig::default();
        assert_eq!(config.window_size, 60);
        assert_eq!(config.stride, 5);
        assert_eq!(config.epochs, 30);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.threshold_percentile, 97.0);
        assert_eq!(config.strategy, DetectionStrategy::Reconstruction);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DetectionConfig::new()
            .with_strategy(DetectionStrategy::RobustEnsemble)
            .with_window(30, 2)
            .with_epochs(5)
            .with_threshold_percentile(95.0)
            .with_debug(true);

        assert_eq!(config.strategy, DetectionStrategy::RobustEnsemble);
        assert_eq!(config.window_size, 30);
        assert_eq!(config.stride, 2);
        assert_eq!(config.epochs, 5);
        assert!(config.debug);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(DetectionConfig::new().with_window(0, 1).validate().is_err());
        assert!(DetectionConfig::new().with_window(10, 0).validate().is_err());
        assert!(DetectionConfig::new().with_threshold_percentile(101.0).validate().is_err());
        assert!(DetectionConfig::new().with_time_column("  ").validate().is_err());

        let config = DetectionConfig {
            train_fraction: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_train_len() {
        let config = DetectionConfig::default();
        assert_eq!(config.train_len(200), 140);
        assert_eq!(config.train_len(1), 1);
        assert_eq!(config.train_len(0), 0);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "robust".parse::<DetectionStrategy>().unwrap(),
            DetectionStrategy::RobustEnsemble
        );
        assert_eq!(
            "Reconstruction".parse::<DetectionStrategy>().unwrap(),
            DetectionStrategy::Reconstruction
        );
        assert!("magic".parse::<DetectionStrategy>().is_err());
    }
}
