//! Robust ensemble scorer
//!
//! Row-level scoring that needs no windows:
//! - centered rolling MAD z-scores per feature, reduced to the max |z| per row
//! - an isolation forest on median/IQR-scaled features (missing values as 0)
//!
//! The combined score is `max|z| + iforest score`. A row is anomalous when
//! its max |z| exceeds the z threshold or the forest marks it an outlier.

use super::{BackendKind, BackendScores, IsolationForest, RobustDetail, ScoringBackend};
use crate::config::DetectionConfig;
use crate::error::{FdrError, Result};
use crate::preprocessing::{ImputeStrategy, Imputer, Scaler, ScalerType};
use crate::timeseries::RollingWindow;
use ndarray::{Array1, Array2, Axis};
use tracing::debug;

/// Rolling-z plus isolation-forest backend
#[derive(Debug, Clone)]
pub struct RobustEnsembleScorer {
    rolling: RollingWindow,
    z_threshold: f64,
    train_fraction: f64,
    feature_names: Vec<String>,
    scaler: Scaler,
    forest: IsolationForest,
    is_fitted: bool,
}

impl RobustEnsembleScorer {
    pub fn new(rolling: RollingWindow, z_threshold: f64, forest: IsolationForest) -> Self {
        Self {
            rolling,
            z_threshold,
            train_fraction: 0.7,
            feature_names: Vec::new(),
            scaler: Scaler::new(ScalerType::Robust),
            forest,
            is_fitted: false,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        let forest = IsolationForest::new()
            .with_n_estimators(config.iforest_estimators)
            .with_max_samples(config.iforest_max_samples)
            .with_contamination(config.iforest_contamination)
            .with_seed(config.seed);
        let mut scorer = Self::new(
            RollingWindow::new(config.rolling_window, config.rolling_min_periods),
            config.robust_z_threshold,
            forest,
        );
        scorer.train_fraction = config.train_fraction;
        scorer
    }

    /// Leading share of rows that fits the median/IQR scaling
    pub fn with_train_fraction(mut self, fraction: f64) -> Self {
        self.train_fraction = fraction.clamp(f64::MIN_POSITIVE, 1.0);
        self
    }

    /// Name the input columns so the fitted scaling is keyed by parameter
    pub fn with_feature_names(mut self, names: &[String]) -> Self {
        self.feature_names = names.to_vec();
        self
    }

    pub fn z_threshold(&self) -> f64 {
        self.z_threshold
    }

    /// Robust-scale and zero-fill features for the forest
    fn forest_input(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut scaled = self.scaler.transform(x)?;
        Imputer::new(ImputeStrategy::Constant(0.0)).transform_inplace(&mut scaled);
        Ok(scaled)
    }
}

impl ScoringBackend for RobustEnsembleScorer {
    fn kind(&self) -> BackendKind {
        BackendKind::RobustEnsemble
    }

    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(FdrError::EmptyInput);
        }

        let train_end = ((n as f64 * self.train_fraction) as usize).max(1);
        if self.feature_names.len() != d {
            return Err(FdrError::ShapeError {
                expected: format!("{} named features", d),
                actual: format!("{} names", self.feature_names.len()),
            });
        }
        self.scaler.fit(&self.feature_names, x, train_end)?;

        let input = self.forest_input(x)?;
        self.forest.fit(&input)?;
        self.is_fitted = true;

        debug!(rows = n, features = d, train_end, "Fitted robust ensemble");
        Ok(())
    }

    fn score(&self, x: &Array2<f64>) -> Result<BackendScores> {
        if !self.is_fitted {
            return Err(FdrError::ModelNotFitted);
        }

        let z = self.rolling.robust_z_matrix(x);
        let feature_errors = z.mapv(f64::abs);
        let robust_z_max: Array1<f64> =
            feature_errors.map_axis(Axis(1), |row| row.iter().cloned().fold(0.0, f64::max));

        let input = self.forest_input(x)?;
        let iforest_score = self.forest.score_samples(&input)?;
        let outliers = self.forest.predict(&input)?;

        let scores = &robust_z_max + &iforest_score;
        let is_anomaly: Vec<bool> = robust_z_max
            .iter()
            .zip(outliers.iter())
            .map(|(&z, &outlier)| z > self.z_threshold || outlier)
            .collect();

        debug!(
            rows = x.nrows(),
            anomalies = is_anomaly.iter().filter(|&&a| a).count(),
            "Scored robust ensemble"
        );

        Ok(BackendScores {
            scores,
            feature_errors,
            detail: Some(RobustDetail {
                robust_z_max: robust_z_max.to_vec(),
                iforest_score: iforest_score.to_vec(),
                is_anomaly,
            }),
        })
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    fn set_feature_names(&mut self, names: &[String]) {
        self.feature_names = names.to_vec();
    }

    fn scaling(&self) -> Option<&Scaler> {
        self.is_fitted.then_some(&self.scaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wavy(n: usize, d: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, d), |(i, j)| ((i * (j + 3)) % 7) as f64 + j as f64)
    }

    fn names(d: usize) -> Vec<String> {
        (0..d).map(|j| format!("Param {}", j)).collect()
    }

    fn scorer(d: usize) -> RobustEnsembleScorer {
        let config = DetectionConfig {
            iforest_estimators: 50,
            ..Default::default()
        };
        RobustEnsembleScorer::from_config(&config).with_feature_names(&names(d))
    }

    #[test]
    fn test_spike_is_anomalous() {
        let mut x = wavy(200, 3);
        x[[120, 1]] = 500.0;

        let mut model = scorer(3);
        let scores = model.fit_score(&x, &x).unwrap();
        let detail = scores.detail.unwrap();

        assert!(detail.robust_z_max[120] > 8.0);
        assert!(detail.is_anomaly[120]);
        assert_eq!(scores.feature_errors.dim(), (200, 3));
        assert!(
            (scores.scores[120] - detail.robust_z_max[120] - detail.iforest_score[120]).abs() < 1e-12
        );
    }

    #[test]
    fn test_constant_input_has_no_anomalies() {
        let x = Array2::from_elem((60, 2), 4.0);
        let mut model = scorer(2);
        let scores = model.fit_score(&x, &x).unwrap();
        let detail = scores.detail.unwrap();
        assert!(detail.robust_z_max.iter().all(|&z| z == 0.0));
        assert!(detail.is_anomaly.iter().all(|&a| !a));
    }

    #[test]
    fn test_missing_values_tolerated() {
        let mut x = wavy(80, 2);
        x[[10, 0]] = f64::NAN;
        x[[11, 1]] = f64::NAN;
        let mut model = scorer(2);
        let scores = model.fit_score(&x, &x).unwrap();
        assert!(scores.scores.iter().all(|s| s.is_finite()));
        assert!(model.scaling().is_some());
    }

    #[test]
    fn test_scaling_keyed_by_feature_names() {
        let x = wavy(50, 2);
        let mut model = scorer(2);
        model.fit(&x).unwrap();
        let center = model.scaling().unwrap().center_map();
        assert_eq!(center.keys().cloned().collect::<Vec<_>>(), names(2));
    }

    #[test]
    fn test_fit_without_names_is_shape_error() {
        let config = DetectionConfig {
            iforest_estimators: 10,
            ..Default::default()
        };
        let mut model = RobustEnsembleScorer::from_config(&config);
        assert!(matches!(model.fit(&wavy(30, 2)), Err(FdrError::ShapeError { .. })));
    }
}
