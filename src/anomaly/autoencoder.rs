//! Feed-forward autoencoder
//!
//! A symmetric encoder/decoder (128 → 64 → 32 → 64 → 128 by default) with ReLU
//! hidden layers and a linear output, trained to reproduce its input under
//! mean-squared error with Adam on shuffled mini-batches.
//!
//! Two engines share this implementation and differ only in how weights start:
//! - `FanIn`: weights and biases uniform in ±1/√fan_in (native engine)
//! - `Glorot`: weights uniform in ±√(6/(fan_in + fan_out)), zero biases
//!   (tensor-graph engine)

use super::{reconstruction_scores, BackendKind, BackendScores, ScoringBackend};
use crate::config::DetectionConfig;
use crate::error::{FdrError, Result};
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// Weight initialization scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightInit {
    FanIn,
    Glorot,
}

/// Autoencoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    /// Hidden layer sizes, encoder then decoder
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub init: WeightInit,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![128, 64, 32, 64, 128],
            epochs: 30,
            batch_size: 128,
            learning_rate: 1e-3,
            init: WeightInit::FanIn,
            random_state: Some(42),
        }
    }
}

impl AutoencoderConfig {
    /// Training parameters taken from a detection run
    pub fn from_detection(config: &DetectionConfig) -> Self {
        Self {
            epochs: config.epochs,
            batch_size: config.batch_size,
            learning_rate: config.learning_rate,
            random_state: Some(config.seed),
            ..Default::default()
        }
    }

    pub fn with_init(mut self, init: WeightInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_hidden_layers(mut self, layers: Vec<usize>) -> Self {
        self.hidden_layers = layers;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// First and second moment estimates for one layer
#[derive(Debug, Clone)]
struct Moments {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl Moments {
    fn for_layer(layer: &Dense) -> Self {
        Self {
            m_w: Array2::zeros(layer.weights.raw_dim()),
            v_w: Array2::zeros(layer.weights.raw_dim()),
            m_b: Array1::zeros(layer.bias.raw_dim()),
            v_b: Array1::zeros(layer.bias.raw_dim()),
        }
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    learning_rate: f64,
    step: i32,
) {
    let bias1 = 1.0 - BETA1.powi(step);
    let bias2 = 1.0 - BETA2.powi(step);
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= learning_rate * (*m / bias1) / ((*v / bias2).sqrt() + EPSILON);
        });
}

/// Autoencoder scoring backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Autoencoder {
    config: AutoencoderConfig,
    layers: Vec<Dense>,
    n_inputs: usize,
    loss_history: Vec<f64>,
    is_fitted: bool,
}

impl Autoencoder {
    pub fn new(config: AutoencoderConfig) -> Self {
        Self {
            config,
            layers: Vec::new(),
            n_inputs: 0,
            loss_history: Vec::new(),
            is_fitted: false,
        }
    }

    /// Mean training loss per epoch
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Reconstruct every row of `x`
    pub fn reconstruct(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(FdrError::ModelNotFitted);
        }
        if x.ncols() != self.n_inputs {
            return Err(FdrError::ShapeError {
                expected: format!("{} columns", self.n_inputs),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let mut activations = self.forward(x);
        activations
            .pop()
            .ok_or_else(|| FdrError::ComputationError("network has no layers".to_string()))
    }

    fn initialize(&mut self, n_inputs: usize, rng: &mut Xoshiro256PlusPlus) {
        let mut sizes = vec![n_inputs];
        sizes.extend(&self.config.hidden_layers);
        sizes.push(n_inputs);

        self.layers = sizes
            .windows(2)
            .map(|pair| {
                let (n_in, n_out) = (pair[0], pair[1]);
                match self.config.init {
                    WeightInit::FanIn => {
                        let bound = 1.0 / (n_in as f64).sqrt();
                        Dense {
                            weights: Array2::from_shape_fn((n_in, n_out), |_| {
                                rng.gen_range(-bound..bound)
                            }),
                            bias: Array1::from_shape_fn(n_out, |_| rng.gen_range(-bound..bound)),
                        }
                    }
                    WeightInit::Glorot => {
                        let bound = (6.0 / (n_in + n_out) as f64).sqrt();
                        Dense {
                            weights: Array2::from_shape_fn((n_in, n_out), |_| {
                                rng.gen_range(-bound..bound)
                            }),
                            bias: Array1::zeros(n_out),
                        }
                    }
                }
            })
            .collect();
        self.n_inputs = n_inputs;
    }

    /// Activations of every layer, input first
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(x.to_owned());

        let last = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.weights) + &layer.bias;
            let a = if i < last { z.mapv(|v| v.max(0.0)) } else { z };
            activations.push(a);
        }
        activations
    }

    /// One optimizer step on a mini-batch; returns the batch loss
    fn train_batch(&mut self, batch: &Array2<f64>, moments: &mut [Moments], step: i32) -> f64 {
        let activations = self.forward(batch);
        let Some(output) = activations.last() else {
            return 0.0;
        };

        let diff = output - batch;
        let n_elements = diff.len().max(1) as f64;
        let loss = diff.iter().map(|d| d * d).sum::<f64>() / n_elements;
        let mut delta = diff * (2.0 / n_elements);

        for i in (0..self.layers.len()).rev() {
            let grad_w = activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));

            if i > 0 {
                let mut upstream = delta.dot(&self.layers[i].weights.t());
                Zip::from(&mut upstream)
                    .and(&activations[i])
                    .for_each(|d, &a| {
                        if a <= 0.0 {
                            *d = 0.0;
                        }
                    });
                delta = upstream;
            }

            let layer = &mut self.layers[i];
            let state = &mut moments[i];
            let lr = self.config.learning_rate;
            adam_update(&mut layer.weights, &grad_w, &mut state.m_w, &mut state.v_w, lr, step);
            adam_update(&mut layer.bias, &grad_b, &mut state.m_b, &mut state.v_b, lr, step);
        }

        loss
    }
}

impl ScoringBackend for Autoencoder {
    fn kind(&self) -> BackendKind {
        match self.config.init {
            WeightInit::FanIn => BackendKind::NeuralAutoencoder,
            WeightInit::Glorot => BackendKind::GraphAutoencoder,
        }
    }

    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 || x.ncols() == 0 {
            return Err(FdrError::EmptyInput);
        }

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.initialize(x.ncols(), &mut rng);
        let mut moments: Vec<Moments> = self.layers.iter().map(Moments::for_layer).collect();
        self.loss_history.clear();

        let batch_size = self.config.batch_size.max(1);
        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut step = 0i32;

        for epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            let mut n_batches = 0usize;
            for batch_indices in indices.chunks(batch_size) {
                let batch = x.select(Axis(0), batch_indices);
                step = step.saturating_add(1);
                epoch_loss += self.train_batch(&batch, &mut moments, step);
                n_batches += 1;
            }

            let mean_loss = epoch_loss / n_batches.max(1) as f64;
            debug!(epoch, loss = mean_loss, "Autoencoder epoch");
            self.loss_history.push(mean_loss);
        }

        self.is_fitted = true;
        Ok(())
    }

    fn score(&self, x: &Array2<f64>) -> Result<BackendScores> {
        let reconstructed = self.reconstruct(x)?;
        reconstruction_scores(x, &reconstructed)
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_data(n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 4), |(i, j)| {
            let a = -1.0 + 2.0 * i as f64 / (n - 1) as f64;
            a * [1.0, 2.0, -1.0, 0.5][j]
        })
    }

    fn small_config() -> AutoencoderConfig {
        AutoencoderConfig::default()
            .with_hidden_layers(vec![16, 2, 16])
            .with_epochs(300)
            .with_learning_rate(0.01)
    }

    #[test]
    fn test_training_reduces_loss() {
        let x = line_data(64);
        let mut model = Autoencoder::new(small_config());
        model.fit(&x).unwrap();

        let history = model.loss_history();
        assert_eq!(history.len(), 300);
        assert!(history[history.len() - 1] < history[0]);
    }

    #[test]
    fn test_off_manifold_point_scores_higher() {
        let x = line_data(64);
        let mut model = Autoencoder::new(small_config());
        model.fit(&x).unwrap();

        let probe = ndarray::array![[0.5, 1.0, -0.5, 0.25], [1.0, -1.0, 1.0, -1.0]];
        let scores = model.score(&probe).unwrap();
        assert!(scores.scores[1] > scores.scores[0]);
        assert_eq!(scores.feature_errors.dim(), (2, 4));
    }

    #[test]
    fn test_seeded_training_is_deterministic() {
        let x = line_data(32);
        let config = small_config().with_epochs(20).with_init(WeightInit::Glorot);

        let mut a = Autoencoder::new(config.clone());
        let mut b = Autoencoder::new(config);
        a.fit(&x).unwrap();
        b.fit(&x).unwrap();

        assert_eq!(a.kind(), BackendKind::GraphAutoencoder);
        assert_eq!(a.score(&x).unwrap().scores, b.score(&x).unwrap().scores);
    }

    #[test]
    fn test_unfitted_and_shape_errors() {
        let model = Autoencoder::new(AutoencoderConfig::default());
        assert!(matches!(model.reconstruct(&line_data(4)), Err(FdrError::ModelNotFitted)));

        let mut model = Autoencoder::new(small_config().with_epochs(1));
        model.fit(&line_data(8)).unwrap();
        assert!(model.score(&Array2::zeros((2, 3))).is_err());
    }
}
