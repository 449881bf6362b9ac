//! Linear reconstructor
//!
//! Projects each unit onto the leading principal directions of the training
//! units and back. Directions come from power iteration with deflation on the
//! covariance matrix, or on the Gram matrix when there are fewer training
//! units than columns.

use super::{reconstruction_scores, BackendKind, BackendScores, ScoringBackend};
use crate::error::{FdrError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-10;
/// Directions with less variance than this are discarded
const MIN_EIGENVALUE: f64 = 1e-12;

/// Principal-subspace reconstruction backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearReconstructor {
    n_components: Option<usize>,
    random_state: u64,
    mean: Option<Array1<f64>>,
    /// Shape `(k, width)`, orthonormal rows
    components: Option<Array2<f64>>,
    eigenvalues: Vec<f64>,
}

impl LinearReconstructor {
    pub fn new(random_state: u64) -> Self {
        Self {
            n_components: None,
            random_state,
            mean: None,
            components: None,
            eigenvalues: Vec::new(),
        }
    }

    /// Fix the component count instead of deriving it from the width
    pub fn with_n_components(mut self, k: usize) -> Self {
        self.n_components = Some(k.max(1));
        self
    }

    /// Default component count for an input width: `clamp(width / 2, 2, 32)`
    pub fn component_count(width: usize) -> usize {
        (width / 2).clamp(2, 32)
    }

    /// Variance captured by each retained direction
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    pub fn reconstruct(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (mean, components) = match (&self.mean, &self.components) {
            (Some(m), Some(c)) => (m, c),
            _ => return Err(FdrError::ModelNotFitted),
        };
        if x.ncols() != mean.len() {
            return Err(FdrError::ShapeError {
                expected: format!("{} columns", mean.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let centered = x - mean;
        let projected = centered.dot(&components.t());
        Ok(projected.dot(components) + mean)
    }

    /// Leading eigenpairs of a symmetric positive semi-definite matrix
    fn power_iteration(&self, matrix: &Array2<f64>, k: usize) -> Vec<(f64, Array1<f64>)> {
        let d = matrix.nrows();
        let mut work = matrix.to_owned();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut pairs = Vec::with_capacity(k);

        for _ in 0..k {
            let mut v = Array1::from_shape_fn(d, |_| rng.gen_range(-1.0f64..1.0));
            let norm = v.dot(&v).sqrt().max(MIN_EIGENVALUE);
            v /= norm;

            let mut eigenvalue = 0.0;
            for _ in 0..MAX_ITER {
                let w = work.dot(&v);
                let next_value = v.dot(&w);
                let w_norm = w.dot(&w).sqrt();
                if w_norm < MIN_EIGENVALUE {
                    eigenvalue = 0.0;
                    break;
                }
                let next = w / w_norm;
                let diff = (&next - &v).mapv(|x| x * x).sum().sqrt();
                v = next;
                eigenvalue = next_value;
                if diff < TOLERANCE {
                    break;
                }
            }

            if eigenvalue <= MIN_EIGENVALUE {
                break;
            }

            // A = A - λ v vᵀ
            let outer = v
                .view()
                .insert_axis(Axis(1))
                .dot(&v.view().insert_axis(Axis(0)));
            work.scaled_add(-eigenvalue, &outer);
            pairs.push((eigenvalue, v));
        }

        pairs
    }
}

impl ScoringBackend for LinearReconstructor {
    fn kind(&self) -> BackendKind {
        BackendKind::LinearReconstructor
    }

    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(FdrError::EmptyInput);
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| FdrError::ComputationError("empty training set".to_string()))?;
        let centered = x - &mean;
        let k = self
            .n_components
            .unwrap_or_else(|| Self::component_count(d))
            .min(n)
            .min(d);

        let directions: Vec<(f64, Array1<f64>)> = if n < d {
            // Eigenvectors of X Xᵀ mapped through Xᵀ are eigenvectors of Xᵀ X
            let gram = centered.dot(&centered.t());
            self.power_iteration(&gram, k)
                .into_iter()
                .filter_map(|(value, u)| {
                    let v = centered.t().dot(&u);
                    let norm = v.dot(&v).sqrt();
                    (norm > MIN_EIGENVALUE).then(|| (value / (n.max(2) - 1) as f64, v / norm))
                })
                .collect()
        } else {
            let cov = centered.t().dot(&centered) / (n.max(2) - 1) as f64;
            self.power_iteration(&cov, k)
        };

        let mut components = Array2::zeros((directions.len(), d));
        for (mut row, (_, v)) in components.axis_iter_mut(Axis(0)).zip(directions.iter()) {
            row.assign(v);
        }

        debug!(
            requested = k,
            retained = directions.len(),
            width = d,
            gram = n < d,
            "Fitted linear reconstructor"
        );

        self.eigenvalues = directions.iter().map(|(value, _)| *value).collect();
        self.mean = Some(mean);
        self.components = Some(components);
        Ok(())
    }

    fn score(&self, x: &Array2<f64>) -> Result<BackendScores> {
        let reconstructed = self.reconstruct(x)?;
        reconstruction_scores(x, &reconstructed)
    }

    fn is_fitted(&self) -> bool {
        self.components.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn planar(n: usize) -> Array2<f64> {
        // points on the plane spanned by (1, 1, 0, 0) and (0, 0, 1, -1)
        Array2::from_shape_fn((n, 4), |(i, j)| {
            let a = i as f64;
            let b = ((i * 7) % 5) as f64;
            [a, a, b, -b][j]
        })
    }

    #[test]
    fn test_component_count() {
        assert_eq!(LinearReconstructor::component_count(2), 2);
        assert_eq!(LinearReconstructor::component_count(20), 10);
        assert_eq!(LinearReconstructor::component_count(600), 32);
    }

    #[test]
    fn test_in_subspace_reconstructs_exactly() {
        let x = planar(20);
        let mut model = LinearReconstructor::new(42).with_n_components(2);
        model.fit(&x).unwrap();

        let scores = model.score(&x).unwrap();
        assert!(scores.scores.iter().all(|&s| s < 1e-8));

        let off = array![[0.0, 10.0, 0.0, 0.0]];
        assert!(model.score(&off).unwrap().scores[0] > 1.0);
    }

    #[test]
    fn test_gram_path_matches_subspace() {
        // three units, six columns
        let x = array![
            [1.0, 2.0, 0.0, 0.0, 1.0, 0.0],
            [2.0, 4.0, 0.0, 0.0, 2.0, 0.0],
            [3.0, 6.0, 0.0, 0.0, 3.0, 0.0],
        ];
        let mut model = LinearReconstructor::new(7);
        model.fit(&x).unwrap();

        assert_eq!(model.eigenvalues().len(), 1);
        let scores = model.score(&x).unwrap();
        assert!(scores.scores.iter().all(|&s| s < 1e-8));
    }

    #[test]
    fn test_constant_training_set() {
        let x = Array2::from_elem((10, 4), 3.0);
        let mut model = LinearReconstructor::new(42);
        model.fit(&x).unwrap();
        assert!(model.eigenvalues().is_empty());

        let scores = model.score(&array![[3.0, 3.0, 3.0, 4.0]]).unwrap();
        assert!((scores.scores[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_not_fitted() {
        let model = LinearReconstructor::new(1);
        assert!(!model.is_fitted());
        assert!(matches!(model.score(&array![[1.0]]), Err(FdrError::ModelNotFitted)));
    }
}
