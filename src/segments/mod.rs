//! Segment formation and attribution
//!
//! Provides:
//! - Threshold and gap-based grouping with explicit fallback branches
//! - Driver ranking, explanations and baseline comparison
//! - Run-level summary

mod drivers;
mod grouper;
mod summary;

pub use drivers::{Baseline, Driver, DriverAnalyzer, DriverMagnitude, DriverMetric, DriverStats};
pub use grouper::{cluster_rows, GroupingBranch, Grouping, SegmentGrouper, SegmentKind, SegmentSpan, Severity};
pub use summary::{DetectorSettings, ParameterCount, Summary, SummaryBuilder};

use serde::{Deserialize, Serialize};

/// A reported anomalous interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub points: usize,
    pub severity: Severity,
    pub score_peak: f64,
    pub top_drivers: Vec<Driver>,
    pub explanation: String,
    pub driver_stats: Vec<DriverStats>,
}

impl Segment {
    /// Segment for a grouped span; driver stats are attached later
    pub fn from_span(span: &SegmentSpan, timestamps: &[f64], top_drivers: Vec<Driver>, explanation: String) -> Self {
        let start_time = timestamps[span.start_row];
        let end_time = timestamps[span.end_row];
        Self {
            start_time,
            end_time,
            duration: end_time - start_time,
            points: span.points(),
            severity: span.severity,
            score_peak: span.peak_score,
            top_drivers,
            explanation,
            driver_stats: Vec::new(),
        }
    }

    /// Rows whose time falls inside `[start_time, end_time]`
    pub fn rows_in_range(&self, timestamps: &[f64]) -> Vec<usize> {
        timestamps
            .iter()
            .enumerate()
            .filter(|(_, &t)| t >= self.start_time && t <= self.end_time)
            .map(|(i, _)| i)
            .collect()
    }
}
