//! Driver attribution
//!
//! Ranks the features behind each segment, renders the explanation text and
//! contrasts segment values against a baseline taken from unflagged rows.

use crate::error::{FdrError, Result};
use crate::utils::stats;
use ndarray::{Array2, Axis};
use regex::Regex;
use serde::{Deserialize, Serialize};

const EXPLANATION: &str =
    "Unusual behavior pattern compared to learned normal behavior for this flight.";
const REVIEW_PREFIX: &str = "Review recommended. ";

/// How per-row feature errors are reduced over a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMetric {
    /// Mean reconstruction error
    MeanError,
    /// Maximum absolute robust z
    MaxRobustZ,
}

/// Magnitude reported for a driver, keyed by its metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMagnitude {
    Error(f64),
    MaxRobustZ(f64),
}

impl DriverMagnitude {
    pub fn value(&self) -> f64 {
        match self {
            DriverMagnitude::Error(v) | DriverMagnitude::MaxRobustZ(v) => *v,
        }
    }
}

/// One ranked contributor to a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub parameter: String,
    #[serde(flatten)]
    pub magnitude: DriverMagnitude,
}

/// 5th/95th percentile and median of a feature over baseline rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub p5: f64,
    pub p95: f64,
    pub median: f64,
}

/// Segment values of a driver next to its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverStats {
    pub param: String,
    /// Empty when the name carries no unit
    pub unit: String,
    pub segment_min: f64,
    pub segment_max: f64,
    pub baseline_p5: Option<f64>,
    pub baseline_p95: Option<f64>,
    pub baseline_median: Option<f64>,
}

/// Ranks drivers and computes baseline comparisons
#[derive(Debug, Clone)]
pub struct DriverAnalyzer {
    metric: DriverMetric,
    top_k: usize,
    explanation_count: usize,
    unit_pattern: Regex,
}

impl DriverAnalyzer {
    pub fn new(metric: DriverMetric, top_k: usize) -> Result<Self> {
        let unit_pattern = Regex::new(r"\(([^)]*)\)")
            .map_err(|e| FdrError::ComputationError(format!("unit pattern: {}", e)))?;
        Ok(Self {
            metric,
            top_k,
            explanation_count: 3,
            unit_pattern,
        })
    }

    /// Number of drivers named in the explanation
    pub fn with_explanation_count(mut self, n: usize) -> Self {
        self.explanation_count = n;
        self
    }

    pub fn metric(&self) -> DriverMetric {
        self.metric
    }

    /// Top drivers over rows `start..=end`
    ///
    /// Sorted by magnitude descending; equal magnitudes keep feature order.
    pub fn rank(
        &self,
        names: &[String],
        feature_errors: &Array2<f64>,
        start: usize,
        end: usize,
    ) -> Result<Vec<Driver>> {
        if names.len() != feature_errors.ncols() {
            return Err(FdrError::ShapeError {
                expected: format!("{} columns", names.len()),
                actual: format!("{} columns", feature_errors.ncols()),
            });
        }
        if start > end || end >= feature_errors.nrows() {
            return Err(FdrError::invalid_parameter(
                "segment",
                format!("{}..={}", start, end),
                format!("outside {} rows", feature_errors.nrows()),
            ));
        }

        let rows = feature_errors.slice(ndarray::s![start..=end, ..]);
        let magnitudes: Vec<f64> = match self.metric {
            DriverMetric::MeanError => rows
                .mean_axis(Axis(0))
                .map(|m| m.to_vec())
                .unwrap_or_else(|| vec![0.0; names.len()]),
            DriverMetric::MaxRobustZ => rows
                .axis_iter(Axis(1))
                .map(|col| col.iter().map(|v| v.abs()).fold(0.0, f64::max))
                .collect(),
        };

        let mut order: Vec<usize> = (0..names.len()).collect();
        order.sort_by(|&a, &b| stats::descending(magnitudes[a], magnitudes[b]));

        Ok(order
            .into_iter()
            .take(self.top_k)
            .map(|j| Driver {
                parameter: names[j].clone(),
                magnitude: match self.metric {
                    DriverMetric::MeanError => DriverMagnitude::Error(magnitudes[j]),
                    DriverMetric::MaxRobustZ => DriverMagnitude::MaxRobustZ(magnitudes[j]),
                },
            })
            .collect())
    }

    /// Human-readable explanation naming the leading drivers
    pub fn explanation(&self, drivers: &[Driver], review: bool) -> String {
        let mut text = String::new();
        if review {
            text.push_str(REVIEW_PREFIX);
        }
        text.push_str(EXPLANATION);

        let named: Vec<&str> = drivers
            .iter()
            .take(self.explanation_count)
            .map(|d| d.parameter.as_str())
            .collect();
        if !named.is_empty() {
            text.push_str(" Top drivers: ");
            text.push_str(&named.join(", "));
            text.push('.');
        }
        text
    }

    /// Physical unit between the first `(` and the next `)`, e.g. `Altitude (ft)`
    pub fn extract_unit(&self, name: &str) -> String {
        self.unit_pattern
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    }

    /// Per-feature baseline over rows not in `flagged`
    ///
    /// Falls back to every row when all rows are flagged. Features without
    /// any finite baseline value get `None`.
    pub fn baselines(&self, values: &Array2<f64>, flagged: &[bool]) -> Result<Vec<Option<Baseline>>> {
        if flagged.len() != values.nrows() {
            return Err(FdrError::ShapeError {
                expected: format!("{} rows", values.nrows()),
                actual: format!("{} flags", flagged.len()),
            });
        }

        let mut rows: Vec<usize> = (0..values.nrows()).filter(|&i| !flagged[i]).collect();
        if rows.is_empty() {
            rows = (0..values.nrows()).collect();
        }

        Ok(values
            .axis_iter(Axis(1))
            .map(|col| {
                let column: Vec<f64> = rows.iter().map(|&i| col[i]).collect();
                match stats::percentiles(&column, &[5.0, 95.0, 50.0]).as_slice() {
                    [Some(p5), Some(p95), Some(median)] => Some(Baseline {
                        p5: *p5,
                        p95: *p95,
                        median: *median,
                    }),
                    _ => None,
                }
            })
            .collect())
    }

    /// Segment min/max of each driver, with its baseline
    ///
    /// `segment_rows` are the rows inside the segment's time range. Drivers
    /// without any finite value there are skipped.
    pub fn driver_stats(
        &self,
        drivers: &[Driver],
        names: &[String],
        values: &Array2<f64>,
        segment_rows: &[usize],
        baselines: &[Option<Baseline>],
    ) -> Vec<DriverStats> {
        drivers
            .iter()
            .filter_map(|driver| {
                let j = names.iter().position(|n| n == &driver.parameter)?;
                let (lo, hi) = segment_rows
                    .iter()
                    .map(|&i| values[[i, j]])
                    .filter(|v| v.is_finite())
                    .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                        None => Some((v, v)),
                    })?;
                let baseline = baselines.get(j).copied().flatten();
                Some(DriverStats {
                    param: driver.parameter.clone(),
                    unit: self.extract_unit(&driver.parameter),
                    segment_min: lo,
                    segment_max: hi,
                    baseline_p5: baseline.map(|b| b.p5),
                    baseline_p95: baseline.map(|b| b.p95),
                    baseline_median: baseline.map(|b| b.median),
                })
            })
            .collect()
    }
}
