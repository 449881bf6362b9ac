//! End-to-end detection pipeline
//!
//! Stages run strictly forward:
//! 1. time resolution and row ordering
//! 2. feature selection (policy depends on the strategy)
//! 3. fitting a [`TrainedDetector`] (scaling statistics plus backend)
//! 4. scoring every row
//! 5. segment grouping, driver attribution and the summary
//!
//! A [`TrainedDetector`] scores through `&self`, so it can be shared across
//! threads once fitted.

use crate::anomaly::{build_backend, select_backend, BackendKind, RobustDetail, RuntimeCapabilities, ScoringBackend};
use crate::config::{DetectionConfig, DetectionStrategy};
use crate::data::{FlightTable, TimeInterpretation, TimeResolver};
use crate::error::{FdrError, Result};
use crate::preprocessing::{FeatureSelector, Imputer, Scaler, ScalerType, SelectionPolicy};
use crate::report::{DebugInfo, DetectionReport, ScalingStats, Timeline};
use crate::segments::{
    DetectorSettings, DriverAnalyzer, DriverMetric, Segment, SegmentGrouper, SegmentKind, SummaryBuilder,
};
use crate::timeseries::{ScoreMapper, WindowPlan, Windower};
use crate::utils::stats;
use ndarray::Array2;
use tracing::{debug, info};

/// Time-ordered feature values ready for fitting
#[derive(Debug, Clone)]
pub struct PreparedSeries {
    pub timestamps: Vec<f64>,
    pub names: Vec<String>,
    /// Raw feature values; gap-filled on the reconstruction path
    pub values: Array2<f64>,
    pub interpretation: TimeInterpretation,
}

impl PreparedSeries {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }
}

/// Row-level output of a fitted detector
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    pub scores: Vec<f64>,
    /// Shape `(n_rows, n_features)`: squared error or |robust z|
    pub feature_errors: Array2<f64>,
    pub detail: Option<RobustDetail>,
}

/// Scaling statistics and a fitted backend
#[derive(Debug)]
pub struct TrainedDetector {
    strategy: DetectionStrategy,
    names: Vec<String>,
    /// Present on the reconstruction path
    scaler: Option<Scaler>,
    plan: Option<WindowPlan>,
    backend: Box<dyn ScoringBackend>,
}

impl TrainedDetector {
    pub fn strategy(&self) -> DetectionStrategy {
        self.strategy
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn window_plan(&self) -> Option<WindowPlan> {
        self.plan
    }

    pub fn scaling(&self) -> Option<&Scaler> {
        self.scaler.as_ref().or_else(|| self.backend.scaling())
    }

    /// Score rows of feature values laid out like the training series
    pub fn score(&self, values: &Array2<f64>) -> Result<DetectorOutput> {
        if values.ncols() != self.names.len() {
            return Err(FdrError::ShapeError {
                expected: format!("{} features", self.names.len()),
                actual: format!("{} features", values.ncols()),
            });
        }

        match (&self.scaler, self.plan) {
            (Some(scaler), Some(plan)) => {
                let standardized = scaler.transform(values)?;
                let batch = Windower::new(plan).build(&standardized)?;
                let scored = self.backend.score(&batch.flat)?;
                let window_errors = batch.fold_feature_errors(&scored.feature_errors)?;
                let timeline = ScoreMapper::map(
                    values.nrows(),
                    plan.window_size,
                    &batch.starts,
                    &scored.scores,
                    &window_errors,
                )?;
                Ok(DetectorOutput {
                    scores: timeline.scores,
                    feature_errors: timeline.feature_errors,
                    detail: None,
                })
            }
            _ => {
                let scored = self.backend.score(values)?;
                Ok(DetectorOutput {
                    scores: scored.scores.to_vec(),
                    feature_errors: scored.feature_errors,
                    detail: scored.detail,
                })
            }
        }
    }
}

/// Runs a detection over a flight table
#[derive(Debug, Clone)]
pub struct AnomalyPipeline {
    config: DetectionConfig,
    capabilities: RuntimeCapabilities,
}

impl AnomalyPipeline {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            capabilities: RuntimeCapabilities::probe(),
        }
    }

    /// Override the probed runtime capabilities
    pub fn with_capabilities(mut self, capabilities: RuntimeCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn capabilities(&self) -> RuntimeCapabilities {
        self.capabilities
    }

    /// Backend the configured strategy will use
    pub fn selected_backend(&self) -> BackendKind {
        match self.config.strategy {
            DetectionStrategy::Reconstruction => select_backend(&self.capabilities),
            DetectionStrategy::RobustEnsemble => BackendKind::RobustEnsemble,
        }
    }

    /// Resolve time, order rows and select features
    pub fn prepare(&self, table: &FlightTable) -> Result<PreparedSeries> {
        self.config.validate()?;
        let series = TimeResolver::new(self.config.time_column.as_str())?.resolve(table)?;

        let policy = match self.config.strategy {
            DetectionStrategy::Reconstruction => SelectionPolicy::Strict,
            DetectionStrategy::RobustEnsemble => SelectionPolicy::NumericOnly,
        };
        let features = FeatureSelector::new(policy)
            .with_max_missing_ratio(self.config.max_missing_ratio)
            .with_min_distinct_values(self.config.min_distinct_values)
            .with_excluded(self.config.time_column.as_str())
            .select(&series.table)?;

        let values = match self.config.strategy {
            DetectionStrategy::Reconstruction => Imputer::forward_backward().transform(&features.values),
            DetectionStrategy::RobustEnsemble => features.values,
        };
        if values.nrows() == 0 {
            return Err(FdrError::EmptyInput);
        }

        Ok(PreparedSeries {
            timestamps: series.timestamps,
            names: features.names,
            values,
            interpretation: series.interpretation,
        })
    }

    /// Fit scaling and the scoring backend
    pub fn fit(&self, prepared: &PreparedSeries) -> Result<TrainedDetector> {
        let kind = self.selected_backend();
        let mut backend = build_backend(kind, &self.config);
        let n_rows = prepared.n_rows();

        match self.config.strategy {
            DetectionStrategy::Reconstruction => {
                let plan = WindowPlan::for_rows(n_rows, self.config.window_size, self.config.stride);
                let mut scaler = Scaler::new(ScalerType::Standard);
                let standardized =
                    scaler.fit_transform(&prepared.names, &prepared.values, self.config.train_len(n_rows))?;

                let batch = Windower::new(plan).build(&standardized)?;
                let train_windows = self.config.train_len(batch.n_windows());
                backend.fit(&batch.head(train_windows).to_owned())?;

                info!(
                    backend = %kind,
                    n_windows = batch.n_windows(),
                    train_windows,
                    window_size = plan.window_size,
                    stride = plan.stride,
                    "Fitted reconstruction detector"
                );

                Ok(TrainedDetector {
                    strategy: self.config.strategy,
                    names: prepared.names.clone(),
                    scaler: Some(scaler),
                    plan: Some(plan),
                    backend,
                })
            }
            DetectionStrategy::RobustEnsemble => {
                backend.set_feature_names(&prepared.names);
                backend.fit(&prepared.values)?;
                info!(backend = %kind, n_rows, "Fitted robust detector");

                Ok(TrainedDetector {
                    strategy: self.config.strategy,
                    names: prepared.names.clone(),
                    scaler: None,
                    plan: None,
                    backend,
                })
            }
        }
    }

    /// Full run: prepare, fit, score and report
    pub fn run(&self, table: &FlightTable) -> Result<DetectionReport> {
        let prepared = self.prepare(table)?;
        let detector = self.fit(&prepared)?;
        let output = detector.score(&prepared.values)?;
        self.report(&prepared, &detector, output)
    }

    /// Group, attribute and summarize a scored series
    pub fn report(
        &self,
        prepared: &PreparedSeries,
        detector: &TrainedDetector,
        output: DetectorOutput,
    ) -> Result<DetectionReport> {
        let config = &self.config;
        let timestamps = &prepared.timestamps;

        let run_mask = output.detail.as_ref().map(|d| d.is_anomaly.as_slice());
        let grouping = SegmentGrouper::from_config(config).group(timestamps, &output.scores, run_mask)?;

        let (metric, top_k) = match detector.strategy() {
            DetectionStrategy::Reconstruction => (DriverMetric::MeanError, config.top_drivers),
            DetectionStrategy::RobustEnsemble => (DriverMetric::MaxRobustZ, config.robust_top_drivers),
        };
        let analyzer = DriverAnalyzer::new(metric, top_k)?.with_explanation_count(config.explanation_drivers);

        let mut segments = grouping
            .spans
            .iter()
            .map(|span| -> Result<Segment> {
                let drivers = analyzer.rank(&prepared.names, &output.feature_errors, span.start_row, span.end_row)?;
                let explanation = analyzer.explanation(&drivers, span.kind == SegmentKind::Review);
                Ok(Segment::from_span(span, timestamps, drivers, explanation))
            })
            .collect::<Result<Vec<_>>>()?;

        let flagged_mask = SummaryBuilder::flagged_mask(timestamps, &grouping.flagged, &segments);
        let baselines = analyzer.baselines(&prepared.values, &flagged_mask)?;
        for segment in segments.iter_mut() {
            let rows = segment.rows_in_range(timestamps);
            segment.driver_stats =
                analyzer.driver_stats(&segment.top_drivers, &prepared.names, &prepared.values, &rows, &baselines);
        }

        let detector_settings = match detector.window_plan() {
            Some(plan) => DetectorSettings::Windowed {
                window_size: plan.window_size,
                stride: plan.stride,
            },
            None => DetectorSettings::Robust {
                robust_z_threshold: config.robust_z_threshold,
                iforest_contamination: config.iforest_contamination,
            },
        };
        let summary = SummaryBuilder::build(
            prepared.names.len(),
            &segments,
            &flagged_mask,
            detector_settings,
            config.threshold_percentile,
            grouping.threshold,
        );

        let mut timeline = Timeline::new(timestamps, &output.scores);
        if let Some(detail) = &output.detail {
            timeline = timeline.with_robust_detail(detail);
        }

        let debug_info = if config.debug {
            let scaling = detector.scaling().ok_or(FdrError::ModelNotFitted)?;
            let plan = detector.window_plan();
            Some(DebugInfo {
                columns_used: prepared.names.clone(),
                threshold: grouping.threshold,
                max_score: stats::nan_max(&output.scores).unwrap_or(0.0),
                window_size: plan.map(|p| p.window_size),
                stride: plan.map(|p| p.stride),
                epochs: plan.map(|_| config.epochs),
                backend: detector.backend_kind(),
                scaling: ScalingStats::from(scaling),
            })
        } else {
            None
        };

        debug!(
            branch = ?grouping.branch,
            degenerate = grouping.degenerate,
            threshold = grouping.threshold,
            "Grouping finished"
        );
        info!(
            rows = summary.n_rows,
            features = summary.n_params_used,
            segments = summary.segments_found,
            flagged_percent = summary.flagged_percent,
            "Detection finished"
        );

        Ok(DetectionReport {
            summary,
            segments,
            timeline,
            debug_info,
        })
    }
}
