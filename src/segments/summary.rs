//! Run-level summary: counts, flagged share and recurring drivers

use super::Segment;
use crate::utils::stats::round_to;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How often a parameter appears among segment drivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterCount {
    pub parameter: String,
    pub count: usize,
}

/// Detector settings reported next to the counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectorSettings {
    Windowed {
        window_size: usize,
        stride: usize,
    },
    Robust {
        robust_z_threshold: f64,
        iforest_contamination: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n_rows: usize,
    pub n_params_used: usize,
    pub segments_found: usize,
    pub top_parameters: Vec<ParameterCount>,
    #[serde(rename = "flaggedRowCount")]
    pub flagged_row_count: usize,
    #[serde(rename = "flaggedPercent")]
    pub flagged_percent: f64,
    #[serde(flatten)]
    pub detector: DetectorSettings,
    pub threshold_percentile: f64,
    pub threshold_value: f64,
}

/// Builds the [`Summary`] and the run-level flag mask
#[derive(Debug, Clone, Default)]
pub struct SummaryBuilder;

impl SummaryBuilder {
    /// Row flags unioned with every segment's `[start_time, end_time]` range
    pub fn flagged_mask(timestamps: &[f64], row_flags: &[bool], segments: &[Segment]) -> Vec<bool> {
        timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                row_flags.get(i).copied().unwrap_or(false)
                    || segments
                        .iter()
                        .any(|s| t >= s.start_time && t <= s.end_time)
            })
            .collect()
    }

    /// Driver occurrence counts, most frequent first, ties in first-seen order
    pub fn top_parameters(segments: &[Segment]) -> Vec<ParameterCount> {
        let mut counts: Vec<ParameterCount> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();

        for driver in segments.iter().flat_map(|s| s.top_drivers.iter()) {
            if driver.parameter.is_empty() {
                continue;
            }
            match slots.get(driver.parameter.as_str()) {
                Some(&slot) => counts[slot].count += 1,
                None => {
                    slots.insert(driver.parameter.as_str(), counts.len());
                    counts.push(ParameterCount {
                        parameter: driver.parameter.clone(),
                        count: 1,
                    });
                }
            }
        }

        counts.sort_by(|a, b| b.count.cmp(&a.count));
        counts
    }

    /// Share of flagged rows in percent, 0 for an empty run
    pub fn flagged_percent(flagged_rows: usize, n_rows: usize) -> f64 {
        if n_rows == 0 {
            0.0
        } else {
            round_to(flagged_rows as f64 / n_rows as f64 * 100.0, 4)
        }
    }

    pub fn build(
        n_params_used: usize,
        segments: &[Segment],
        flagged_mask: &[bool],
        detector: DetectorSettings,
        threshold_percentile: f64,
        threshold_value: f64,
    ) -> Summary {
        let n_rows = flagged_mask.len();
        let flagged_row_count = flagged_mask.iter().filter(|&&f| f).count();
        Summary {
            n_rows,
            n_params_used,
            segments_found: segments.len(),
            top_parameters: Self::top_parameters(segments),
            flagged_row_count,
            flagged_percent: Self::flagged_percent(flagged_row_count, n_rows),
            detector,
            threshold_percentile,
            threshold_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::{Driver, DriverMagnitude, Severity};

    fn segment(start: f64, end: f64, drivers: &[&str]) -> Segment {
        Segment {
            start_time: start,
            end_time: end,
            duration: end - start,
            points: 1,
            severity: Severity::High,
            score_peak: 1.0,
            top_drivers: drivers
                .iter()
                .map(|p| Driver {
                    parameter: p.to_string(),
                    magnitude: DriverMagnitude::Error(1.0),
                })
                .collect(),
            explanation: String::new(),
            driver_stats: Vec::new(),
        }
    }

    #[test]
    fn test_flagged_mask_union() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let flags = [true, false, false, false, false, false];
        let segments = vec![segment(2.0, 3.0, &[])];
        let mask = SummaryBuilder::flagged_mask(&times, &flags, &segments);
        assert_eq!(mask, vec![true, false, true, true, false, false]);
    }

    #[test]
    fn test_top_parameters_order() {
        let segments = vec![
            segment(0.0, 1.0, &["b", "a"]),
            segment(5.0, 6.0, &["a", "c"]),
            segment(9.0, 9.0, &["c", "b", "a"]),
        ];
        let top = SummaryBuilder::top_parameters(&segments);
        let names: Vec<(&str, usize)> = top.iter().map(|p| (p.parameter.as_str(), p.count)).collect();
        assert_eq!(names, vec![("a", 3), ("b", 2), ("c", 2)]);
    }

    #[test]
    fn test_flagged_percent() {
        assert_eq!(SummaryBuilder::flagged_percent(0, 10), 0.0);
        assert_eq!(SummaryBuilder::flagged_percent(1, 3), 33.3333);
        assert_eq!(SummaryBuilder::flagged_percent(0, 0), 0.0);
    }

    #[test]
    fn test_summary_json_keys() {
        let segments = vec![segment(0.0, 1.0, &["a"])];
        let mask = vec![true, true, false, false];
        let summary = SummaryBuilder::build(
            2,
            &segments,
            &mask,
            DetectorSettings::Windowed {
                window_size: 60,
                stride: 5,
            },
            97.0,
            0.5,
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["n_rows"], 4);
        assert_eq!(json["flaggedRowCount"], 2);
        assert_eq!(json["flaggedPercent"], 50.0);
        assert_eq!(json["window_size"], 60);
        assert_eq!(json["stride"], 5);
        assert_eq!(json["top_parameters"][0]["parameter"], "a");
        assert!(json.get("detector").is_none());
    }

    #[test]
    fn test_robust_settings_keys() {
        let summary = SummaryBuilder::build(
            1,
            &[],
            &[false],
            DetectorSettings::Robust {
                robust_z_threshold: 8.0,
                iforest_contamination: 0.01,
            },
            97.0,
            1.0,
        );
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["robust_z_threshold"], 8.0);
        assert_eq!(json["segments_found"], 0);
        assert!(json.get("window_size").is_none());
    }
}
