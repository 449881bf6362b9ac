//! Feature selection for flight parameters
//!
//! Decides which columns of a [`FlightTable`] become model features:
//! - identifier and clock columns are always excluded
//! - `Strict` keeps populated, varied, non-flag columns (coercing text to numbers)
//! - `NumericOnly` keeps every natively numeric column with any valid value

use crate::data::{FlightTable, RawColumn};
use crate::error::{FdrError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Columns that identify the flight or carry a clock, never used as features
pub const EXCLUDED_COLUMNS: &[&str] = &[
    "Session Time",
    "System Time",
    "GPS Date & Time",
    "Destination Waypoint ID",
    "Transponder Code (octal)",
];

/// Column admission rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Coerce to numbers; require coverage, variety and non-binary values
    Strict,
    /// Natively numeric columns with at least one valid value
    NumericOnly,
}

/// Why a column was or was not admitted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ColumnVerdict {
    Selected,
    Excluded,
    NonNumeric,
    NoValidValues,
    TooSparse { missing_ratio: f64 },
    Constant,
    TooFewDistinct { distinct: usize },
    Binary,
}

impl ColumnVerdict {
    pub fn is_selected(&self) -> bool {
        matches!(self, ColumnVerdict::Selected)
    }
}

/// Selected features as a row-major matrix, `NaN` marking missing values
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }
}

/// Picks model features from a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelector {
    policy: SelectionPolicy,
    max_missing_ratio: f64,
    min_distinct_values: usize,
    excluded: Vec<String>,
}

impl FeatureSelector {
    /// Create a selector with the default thresholds (40% missing, 10 distinct)
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            max_missing_ratio: 0.4,
            min_distinct_values: 10,
            excluded: EXCLUDED_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Set the largest tolerated missing fraction
    pub fn with_max_missing_ratio(mut self, ratio: f64) -> Self {
        self.max_missing_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set the minimum number of distinct values
    pub fn with_min_distinct_values(mut self, n: usize) -> Self {
        self.min_distinct_values = n;
        self
    }

    /// Exclude one more column by name
    pub fn with_excluded(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.excluded.contains(&name) {
            self.excluded.push(name);
        }
        self
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Decide on a single column
    pub fn assess(&self, name: &str, column: &RawColumn) -> ColumnVerdict {
        if self.excluded.iter().any(|e| e == name) {
            return ColumnVerdict::Excluded;
        }

        match self.policy {
            SelectionPolicy::NumericOnly => {
                if !column.is_numeric() {
                    return ColumnVerdict::NonNumeric;
                }
                if column.to_numeric().iter().all(Option::is_none) {
                    return ColumnVerdict::NoValidValues;
                }
                ColumnVerdict::Selected
            }
            SelectionPolicy::Strict => self.assess_strict(&column.to_numeric()),
        }
    }

    fn assess_strict(&self, values: &[Option<f64>]) -> ColumnVerdict {
        let valid: Vec<f64> = values.iter().flatten().copied().collect();
        if valid.is_empty() {
            return ColumnVerdict::NoValidValues;
        }

        let missing_ratio = 1.0 - valid.len() as f64 / values.len() as f64;
        if missing_ratio > self.max_missing_ratio {
            return ColumnVerdict::TooSparse { missing_ratio };
        }

        // -0.0 and 0.0 count as one value
        let distinct: HashSet<u64> = valid.iter().map(|v| (v + 0.0).to_bits()).collect();
        if distinct.len() <= 1 {
            return ColumnVerdict::Constant;
        }
        if distinct.len() < self.min_distinct_values {
            return ColumnVerdict::TooFewDistinct {
                distinct: distinct.len(),
            };
        }
        if valid.iter().all(|&v| v == 0.0 || v == 1.0) {
            return ColumnVerdict::Binary;
        }

        ColumnVerdict::Selected
    }

    /// Every column's verdict, in table order
    pub fn assess_all(&self, table: &FlightTable) -> Vec<(String, ColumnVerdict)> {
        table
            .iter()
            .map(|(name, column)| (name.to_string(), self.assess(name, column)))
            .collect()
    }

    /// Build the feature matrix; fails when no column qualifies
    pub fn select(&self, table: &FlightTable) -> Result<FeatureMatrix> {
        let mut names = Vec::new();
        let mut columns: Vec<Vec<Option<f64>>> = Vec::new();

        for (name, column) in table.iter() {
            let verdict = self.assess(name, column);
            if verdict.is_selected() {
                names.push(name.to_string());
                columns.push(column.to_numeric());
            } else {
                debug!(column = name, verdict = ?verdict, "Column not used as feature");
            }
        }

        if names.is_empty() {
            return Err(FdrError::NoFeatures);
        }

        let n_rows = table.n_rows();
        let values = Array2::from_shape_fn((n_rows, names.len()), |(row, col)| {
            columns[col][row].unwrap_or(f64::NAN)
        });

        info!(
            policy = ?self.policy,
            selected = names.len(),
            candidates = table.n_cols(),
            "Selected features"
        );

        Ok(FeatureMatrix { names, values })
    }
}
