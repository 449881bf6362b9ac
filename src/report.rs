//! Result document of a detection run

use crate::anomaly::{BackendKind, RobustDetail};
use crate::error::Result;
use crate::preprocessing::{Scaler, ScalerType};
use crate::segments::{Segment, Summary};
use crate::utils::stats::round_to;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-row timeline, parallel arrays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Seconds since the first sample, 4 decimals
    pub time: Vec<f64>,
    /// Anomaly score, 6 decimals
    pub score: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robust_z_max: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iforest_score: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anomaly: Option<Vec<bool>>,
}

impl Timeline {
    pub fn new(timestamps: &[f64], scores: &[f64]) -> Self {
        Self {
            time: timestamps.iter().map(|&t| round_to(t, 4)).collect(),
            score: scores.iter().map(|&s| round_to(s, 6)).collect(),
            robust_z_max: None,
            iforest_score: None,
            is_anomaly: None,
        }
    }

    /// Attach the robust ensemble's per-row outputs
    pub fn with_robust_detail(mut self, detail: &RobustDetail) -> Self {
        self.robust_z_max = Some(detail.robust_z_max.iter().map(|&v| round_to(v, 4)).collect());
        self.iforest_score = Some(detail.iforest_score.iter().map(|&v| round_to(v, 4)).collect());
        self.is_anomaly = Some(detail.is_anomaly.clone());
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Scaling statistics keyed by feature name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingStats {
    pub kind: ScalerType,
    /// mean or median
    pub center: BTreeMap<String, f64>,
    /// standard deviation or IQR
    pub spread: BTreeMap<String, f64>,
}

impl From<&Scaler> for ScalingStats {
    fn from(scaler: &Scaler) -> Self {
        Self {
            kind: scaler.scaler_type(),
            center: scaler.center_map(),
            spread: scaler.spread_map(),
        }
    }
}

/// Diagnostics emitted on request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub columns_used: Vec<String>,
    pub threshold: f64,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<usize>,
    pub backend: BackendKind,
    pub scaling: ScalingStats,
}

/// Complete output of [`crate::pipeline::AnomalyPipeline::run`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub summary: Summary,
    pub segments: Vec<Segment>,
    pub timeline: Timeline,
    #[serde(rename = "debugInfo", default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

impl DetectionReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
