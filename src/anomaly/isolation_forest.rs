//! Isolation Forest
//!
//! Each tree isolates a random sub-sample (drawn without replacement) by
//! recursive random splits up to depth `ceil(log2(sub-sample))`. Points that
//! isolate in few splits score close to 1.

use crate::error::{FdrError, Result};
use crate::utils::stats;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand::seq::index;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Isolation Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IsolationTree {
    /// Internal node with split
    Internal {
        feature: usize,
        threshold: f64,
        /// values < threshold
        left: Box<IsolationTree>,
        /// values >= threshold
        right: Box<IsolationTree>,
    },
    /// External (leaf) node
    External { size: usize },
}

impl IsolationTree {
    /// Build an isolation tree over the rows in `indices`
    pub fn build(
        x: &Array2<f64>,
        indices: &[usize],
        height: usize,
        max_height: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let n_samples = indices.len();
        if height >= max_height || n_samples <= 1 {
            return IsolationTree::External { size: n_samples };
        }

        // Try features in random order until one can be split
        let mut features: Vec<usize> = (0..x.ncols()).collect();
        features.shuffle(rng);

        for feature in features {
            let (min_val, max_val) = indices.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &i| (lo.min(x[[i, feature]]), hi.max(x[[i, feature]])),
            );
            if !(max_val - min_val > 1e-10) {
                continue;
            }

            let threshold = rng.gen_range(min_val..max_val);
            let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, feature]] < threshold);

            if left_indices.is_empty() || right_indices.is_empty() {
                return IsolationTree::External { size: n_samples };
            }

            let left = Box::new(Self::build(x, &left_indices, height + 1, max_height, rng));
            let right = Box::new(Self::build(x, &right_indices, height + 1, max_height, rng));
            return IsolationTree::Internal {
                feature,
                threshold,
                left,
                right,
            };
        }

        IsolationTree::External { size: n_samples }
    }

    /// Path length for a sample, with the usual correction at leaves
    pub fn path_length(&self, sample: &[f64], current_height: usize) -> f64 {
        match self {
            IsolationTree::External { size } => current_height as f64 + Self::c(*size),
            IsolationTree::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, current_height + 1)
                } else {
                    right.path_length(sample, current_height + 1)
                }
            }
        }
    }

    /// Average path length of an unsuccessful search in a BST of `n` nodes
    fn c(n: usize) -> f64 {
        if n <= 1 {
            0.0
        } else if n == 2 {
            1.0
        } else {
            let n_f = n as f64;
            2.0 * ((n_f - 1.0).ln() + EULER_GAMMA) - 2.0 * (n_f - 1.0) / n_f
        }
    }
}

/// Isolation Forest anomaly detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    /// Expected proportion of outliers
    contamination: f64,
    seed: Option<u64>,
    trees: Option<Vec<IsolationTree>>,
    /// Scores above this are outliers
    threshold: Option<f64>,
    /// Sub-sample size used per tree
    n_samples: Option<usize>,
}

impl IsolationForest {
    pub fn new() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: None,
            trees: None,
            threshold: None,
            n_samples: None,
        }
    }

    /// Set number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    /// Set maximum samples per tree
    pub fn with_max_samples(mut self, n: usize) -> Self {
        self.max_samples = n.max(1);
        self
    }

    /// Set contamination ratio
    pub fn with_contamination(mut self, c: f64) -> Self {
        self.contamination = c.clamp(0.0, 0.5);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.trees.is_some()
    }

    /// Decision threshold on the anomaly score
    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 || x.ncols() == 0 {
            return Err(FdrError::EmptyInput);
        }

        let samples_per_tree = self.max_samples.min(n_samples);
        let max_height = (samples_per_tree as f64).log2().ceil().max(0.0) as usize;
        let base_seed = match self.seed {
            Some(seed) => seed,
            None => rand::thread_rng().gen(),
        };

        let trees: Vec<IsolationTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(base_seed.wrapping_add(t as u64));
                let indices = index::sample(&mut rng, n_samples, samples_per_tree).into_vec();
                IsolationTree::build(x, &indices, 0, max_height, &mut rng)
            })
            .collect();

        self.trees = Some(trees);
        self.n_samples = Some(samples_per_tree);

        let scores = self.score_samples(x)?;
        let q = 100.0 * (1.0 - self.contamination);
        self.threshold = stats::percentile(&scores.to_vec(), q);

        Ok(())
    }

    /// Anomaly score `2^(-E[h(x)] / c(n))` in (0, 1], higher is more anomalous
    pub fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let trees = self.trees.as_ref().ok_or(FdrError::ModelNotFitted)?;
        let c_n = IsolationTree::c(self.n_samples.unwrap_or(256)).max(f64::MIN_POSITIVE);

        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|row| row.to_vec()).collect();
        let scores: Vec<f64> = rows
            .par_iter()
            .map(|sample| {
                let avg_path_length = trees
                    .iter()
                    .map(|tree| tree.path_length(sample, 0))
                    .sum::<f64>()
                    / trees.len() as f64;
                2.0_f64.powf(-avg_path_length / c_n)
            })
            .collect();

        Ok(Array1::from_vec(scores))
    }

    /// Outlier flags: score strictly above the fitted threshold
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<bool>> {
        let scores = self.score_samples(x)?;
        let threshold = self.threshold.ok_or(FdrError::ModelNotFitted)?;
        Ok(scores.iter().map(|&s| s > threshold).collect())
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new()
    }
}
