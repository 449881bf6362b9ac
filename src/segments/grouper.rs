//! Segment grouping
//!
//! Thresholds a timeline score and clusters flagged rows by time gap. The
//! outcome is one of three named branches:
//! - `Thresholded`: at least one cluster was found
//! - `Degenerate`: every score is (numerically) equal, so nothing is flagged
//!   and the highest rows are listed for review
//! - `ReviewFallback`: scores vary but no row was flagged; the highest rows
//!   are listed for review
//!
//! Re-running the grouper on the same timeline yields the same boundaries.

use crate::config::DetectionConfig;
use crate::error::{FdrError, Result};
use crate::utils::stats;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Severity tier of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Med,
    Low,
}

/// How a segment came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Cluster of flagged rows
    Flagged,
    /// Single high-scoring row listed when nothing was flagged
    Review,
}

/// Which grouping policy produced the spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingBranch {
    Thresholded,
    Degenerate,
    ReviewFallback,
}

/// Row range of one segment, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpan {
    pub start_row: usize,
    pub end_row: usize,
    pub peak_score: f64,
    pub severity: Severity,
    pub kind: SegmentKind,
}

impl SegmentSpan {
    pub fn points(&self) -> usize {
        self.end_row - self.start_row + 1
    }
}

/// Result of grouping a timeline
#[derive(Debug, Clone)]
pub struct Grouping {
    pub threshold: f64,
    pub medium_threshold: f64,
    pub degenerate: bool,
    /// Row-level anomaly flags that fed the clustering
    pub flagged: Vec<bool>,
    pub branch: GroupingBranch,
    pub spans: Vec<SegmentSpan>,
}

/// Clusters of flagged rows as inclusive `(first, last)` row pairs
///
/// A flagged row joins the current cluster when its time is within `gap`
/// seconds of the previous flagged row. Every row between the first and last
/// flagged row of a cluster belongs to it.
pub fn cluster_rows(timestamps: &[f64], flagged: &[bool], gap: f64) -> Vec<(usize, usize)> {
    let mut clusters = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (idx, _) in flagged.iter().enumerate().filter(|(_, &f)| f) {
        current = match current {
            Some((start, last)) if timestamps[idx] - timestamps[last] <= gap => Some((start, idx)),
            Some(done) => {
                clusters.push(done);
                Some((idx, idx))
            }
            None => Some((idx, idx)),
        };
    }
    if let Some(done) = current {
        clusters.push(done);
    }
    clusters
}

/// Thresholds timelines and forms segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentGrouper {
    pub threshold_percentile: f64,
    pub medium_percentile: f64,
    pub gap_seconds: f64,
    pub review_limit: usize,
}

impl Default for SegmentGrouper {
    fn default() -> Self {
        Self {
            threshold_percentile: 97.0,
            medium_percentile: 90.0,
            gap_seconds: 2.0,
            review_limit: 10,
        }
    }
}

impl SegmentGrouper {
    pub fn new(threshold_percentile: f64) -> Self {
        Self {
            threshold_percentile,
            ..Default::default()
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            threshold_percentile: config.threshold_percentile,
            medium_percentile: config.medium_percentile,
            gap_seconds: config.segment_gap_seconds,
            review_limit: config.review_limit,
        }
    }

    /// Tier for a segment peak
    pub fn severity(peak: f64, threshold: f64, medium_threshold: f64, degenerate: bool) -> Severity {
        if degenerate {
            Severity::Low
        } else if peak >= threshold {
            Severity::High
        } else if peak >= medium_threshold {
            Severity::Med
        } else {
            Severity::Low
        }
    }

    /// Group a timeline
    ///
    /// With `run_mask` the caller decides which rows are anomalous; otherwise
    /// rows scoring at or above the threshold percentile are flagged.
    pub fn group(
        &self,
        timestamps: &[f64],
        scores: &[f64],
        run_mask: Option<&[bool]>,
    ) -> Result<Grouping> {
        if timestamps.len() != scores.len() || run_mask.is_some_and(|m| m.len() != scores.len()) {
            return Err(FdrError::ShapeError {
                expected: format!("{} rows", timestamps.len()),
                actual: format!("{} scores", scores.len()),
            });
        }
        if scores.is_empty() {
            return Err(FdrError::EmptyInput);
        }

        let threshold = stats::percentile(scores, self.threshold_percentile).unwrap_or(0.0);
        let medium_threshold = stats::percentile(scores, self.medium_percentile).unwrap_or(0.0);
        let degenerate = stats::all_close(scores);

        let flagged: Vec<bool> = match run_mask {
            Some(mask) => mask.to_vec(),
            None if degenerate => vec![false; scores.len()],
            None => scores.iter().map(|&s| s >= threshold).collect(),
        };

        let clusters = cluster_rows(timestamps, &flagged, self.gap_seconds);
        let (branch, spans) = if !clusters.is_empty() {
            let spans = clusters
                .into_iter()
                .map(|(start_row, end_row)| {
                    let peak_score = scores[start_row..=end_row]
                        .iter()
                        .cloned()
                        .fold(f64::NEG_INFINITY, f64::max);
                    SegmentSpan {
                        start_row,
                        end_row,
                        peak_score,
                        severity: Self::severity(peak_score, threshold, medium_threshold, degenerate),
                        kind: SegmentKind::Flagged,
                    }
                })
                .collect();
            (GroupingBranch::Thresholded, spans)
        } else {
            let branch = if degenerate {
                GroupingBranch::Degenerate
            } else {
                GroupingBranch::ReviewFallback
            };
            warn!(branch = ?branch, limit = self.review_limit, "No anomalous rows, listing rows for review");
            (branch, self.review_spans(scores))
        };

        debug!(
            threshold,
            medium_threshold,
            degenerate,
            flagged = flagged.iter().filter(|&&f| f).count(),
            segments = spans.len(),
            "Grouped timeline"
        );

        Ok(Grouping {
            threshold,
            medium_threshold,
            degenerate,
            flagged,
            branch,
            spans,
        })
    }

    /// Highest-scoring distinct rows, ties going to the earlier row
    fn review_spans(&self, scores: &[f64]) -> Vec<SegmentSpan> {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| stats::descending(scores[a], scores[b]));

        order
            .into_iter()
            .take(self.review_limit)
            .map(|row| SegmentSpan {
                start_row: row,
                end_row: row,
                peak_score: scores[row],
                severity: Severity::Low,
                kind: SegmentKind::Review,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_cluster_gap_rule() {
        let times = vec![0.0, 1.0, 3.0, 5.0001, 6.0];
        let flagged = vec![true, false, true, true, false];
        // 0 -> 3 is a 3 s gap, 3 -> 5.0001 exceeds 2 s
        assert_eq!(cluster_rows(&times, &flagged, 2.0), vec![(0, 0), (2, 2), (3, 3)]);

        let times = vec![0.0, 1.0, 2.0];
        let flagged = vec![true, false, true];
        assert_eq!(cluster_rows(&times, &flagged, 2.0), vec![(0, 2)]);
    }

    #[test]
    fn test_thresholded_branch() {
        let mut scores = vec![1.0; 100];
        for s in scores.iter_mut().skip(40).take(5) {
            *s = 50.0;
        }
        let grouping = SegmentGrouper::default()
            .group(&seconds(100), &scores, None)
            .unwrap();

        assert_eq!(grouping.branch, GroupingBranch::Thresholded);
        assert_eq!(grouping.spans.len(), 1);
        let span = grouping.spans[0];
        assert_eq!((span.start_row, span.end_row), (40, 44));
        assert_eq!(span.severity, Severity::High);
        assert_eq!(span.points(), 5);
    }

    #[test]
    fn test_degenerate_branch() {
        let scores = vec![0.25; 30];
        let grouping = SegmentGrouper::default()
            .group(&seconds(30), &scores, None)
            .unwrap();

        assert_eq!(grouping.branch, GroupingBranch::Degenerate);
        assert!(grouping.flagged.iter().all(|&f| !f));
        assert_eq!(grouping.spans.len(), 10);
        assert!(grouping.spans.iter().all(|s| s.severity == Severity::Low));
        // equal scores keep row order
        assert_eq!(grouping.spans[0].start_row, 0);
        assert_eq!(grouping.spans[9].start_row, 9);
    }

    #[test]
    fn test_review_fallback_with_empty_mask() {
        let scores: Vec<f64> = (0..20).map(|i| (i % 4) as f64).collect();
        let mask = vec![false; 20];
        let grouping = SegmentGrouper::default()
            .group(&seconds(20), &scores, Some(&mask))
            .unwrap();

        assert_eq!(grouping.branch, GroupingBranch::ReviewFallback);
        assert_eq!(grouping.spans.len(), 10);
        assert_eq!(grouping.spans[0].start_row, 3);
        assert!(grouping.spans.iter().all(|s| s.kind == SegmentKind::Review));
    }

    #[test]
    fn test_review_order_with_nan_scores() {
        let scores = [1.0, f64::NAN, 5.0, 2.0, f64::NAN];
        let mask = vec![false; 5];
        let grouping = SegmentGrouper::default()
            .group(&seconds(5), &scores, Some(&mask))
            .unwrap();

        let rows: Vec<usize> = grouping.spans.iter().map(|s| s.start_row).collect();
        assert_eq!(rows, vec![2, 3, 0, 1, 4]);
    }

    #[test]
    fn test_short_review_list() {
        let grouping = SegmentGrouper::default()
            .group(&[0.0, 1.0, 2.0], &[1.0, 1.0, 1.0], None)
            .unwrap();
        assert_eq!(grouping.spans.len(), 3);
    }

    #[test]
    fn test_severity_tiers() {
        assert_eq!(SegmentGrouper::severity(5.0, 4.0, 2.0, false), Severity::High);
        assert_eq!(SegmentGrouper::severity(3.0, 4.0, 2.0, false), Severity::Med);
        assert_eq!(SegmentGrouper::severity(1.0, 4.0, 2.0, false), Severity::Low);
        assert_eq!(SegmentGrouper::severity(5.0, 4.0, 2.0, true), Severity::Low);
    }

    #[test]
    fn test_regrouping_is_idempotent() {
        let scores: Vec<f64> = (0..200).map(|i| ((i * 37) % 101) as f64).collect();
        let grouper = SegmentGrouper::default();
        let first = grouper.group(&seconds(200), &scores, None).unwrap();
        let second = grouper.group(&seconds(200), &scores, None).unwrap();
        assert_eq!(first.spans, second.spans);
    }

    #[test]
    fn test_length_mismatch() {
        let err = SegmentGrouper::default().group(&[0.0], &[1.0, 2.0], None);
        assert!(matches!(err, Err(FdrError::ShapeError { .. })));
    }
}
