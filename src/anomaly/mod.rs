//! Anomaly scoring backends
//!
//! Every backend is fitted on training units (flattened windows or rows) and
//! then scores all units, returning a scalar score and an error vector per
//! unit:
//! - Neural autoencoders (native and tensor-graph engines)
//! - Linear (principal subspace) reconstructor
//! - Robust ensemble: rolling MAD z-scores plus an isolation forest

mod autoencoder;
mod capability;
mod isolation_forest;
mod linear;
mod robust;

pub use autoencoder::{Autoencoder, AutoencoderConfig, WeightInit};
pub use capability::{select_backend, RuntimeCapabilities};
pub use isolation_forest::{IsolationForest, IsolationTree};
pub use linear::LinearReconstructor;
pub use robust::RobustEnsembleScorer;

use crate::config::DetectionConfig;
use crate::error::{FdrError, Result};
use crate::preprocessing::Scaler;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a scoring engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    NeuralAutoencoder,
    GraphAutoencoder,
    LinearReconstructor,
    RobustEnsemble,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::NeuralAutoencoder => "neural-autoencoder",
            BackendKind::GraphAutoencoder => "graph-autoencoder",
            BackendKind::LinearReconstructor => "linear-reconstructor",
            BackendKind::RobustEnsemble => "robust-ensemble",
        };
        f.write_str(name)
    }
}

/// Per-row outputs specific to the robust ensemble
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobustDetail {
    pub robust_z_max: Vec<f64>,
    pub iforest_score: Vec<f64>,
    pub is_anomaly: Vec<bool>,
}

/// Scores for every unit passed to [`ScoringBackend::score`]
#[derive(Debug, Clone)]
pub struct BackendScores {
    /// One scalar per unit, higher is more anomalous
    pub scores: Array1<f64>,
    /// Error contribution per unit and input column
    pub feature_errors: Array2<f64>,
    /// Present for backends that decide anomalies themselves
    pub detail: Option<RobustDetail>,
}

/// Trait for scoring backends
///
/// Scoring takes `&self`, so a fitted backend can be shared between threads.
pub trait ScoringBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Fit on training units
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Score units with the fitted model
    fn score(&self, x: &Array2<f64>) -> Result<BackendScores>;

    fn is_fitted(&self) -> bool;

    /// Column names for statistics the backend keeps per input column
    fn set_feature_names(&mut self, _names: &[String]) {}

    /// Scaling fitted inside the backend, if it keeps its own
    fn scaling(&self) -> Option<&Scaler> {
        None
    }

    /// Fit and score in one step
    fn fit_score(&mut self, train: &Array2<f64>, all: &Array2<f64>) -> Result<BackendScores> {
        self.fit(train)?;
        self.score(all)
    }
}

/// Squared reconstruction error per element and its row mean
pub(crate) fn reconstruction_scores(
    x: &Array2<f64>,
    reconstructed: &Array2<f64>,
) -> Result<BackendScores> {
    if x.dim() != reconstructed.dim() {
        return Err(FdrError::ShapeError {
            expected: format!("{:?}", x.dim()),
            actual: format!("{:?}", reconstructed.dim()),
        });
    }

    let element_errors = (x - reconstructed).mapv(|v| v * v);
    let scores = element_errors
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(x.nrows()));

    Ok(BackendScores {
        scores,
        feature_errors: element_errors,
        detail: None,
    })
}

/// Construct an unfitted backend of the given kind
pub fn build_backend(kind: BackendKind, config: &DetectionConfig) -> Box<dyn ScoringBackend> {
    match kind {
        BackendKind::NeuralAutoencoder => Box::new(Autoencoder::new(
            AutoencoderConfig::from_detection(config).with_init(WeightInit::FanIn),
        )),
        BackendKind::GraphAutoencoder => Box::new(Autoencoder::new(
            AutoencoderConfig::from_detection(config).with_init(WeightInit::Glorot),
        )),
        BackendKind::LinearReconstructor => Box::new(LinearReconstructor::new(config.seed)),
        BackendKind::RobustEnsemble => Box::new(RobustEnsembleScorer::from_config(config)),
    }
}
