//! Sliding windows over a standardized series and the way back to rows
//!
//! A window starting at row `s` covers rows `[s, s + L)` and is flattened
//! time-major, so element `t * F + f` holds feature `f` at offset `t`.

use crate::error::{FdrError, Result};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Smallest window used when a series is shorter than the requested length
pub const MIN_WINDOW_SIZE: usize = 5;

/// Window length and stride actually used for a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlan {
    pub window_size: usize,
    pub stride: usize,
    /// True when the requested length did not fit and was reduced
    pub shrunk: bool,
}

impl WindowPlan {
    /// Plan windows for `n_rows`, shrinking to `max(5, n_rows)` with stride 1
    /// when the series is shorter than `window_size`
    pub fn for_rows(n_rows: usize, window_size: usize, stride: usize) -> Self {
        if n_rows < window_size {
            let plan = Self {
                window_size: MIN_WINDOW_SIZE.max(n_rows),
                stride: 1,
                shrunk: true,
            };
            warn!(
                n_rows,
                requested = window_size,
                window_size = plan.window_size,
                "Series shorter than window, shrinking"
            );
            plan
        } else {
            Self {
                window_size,
                stride: stride.max(1),
                shrunk: false,
            }
        }
    }

    /// `floor((n - L) / S) + 1`, or 0 when the window does not fit
    pub fn n_windows(&self, n_rows: usize) -> usize {
        if self.window_size == 0 || n_rows < self.window_size {
            0
        } else {
            (n_rows - self.window_size) / self.stride.max(1) + 1
        }
    }

    pub fn starts(&self, n_rows: usize) -> Vec<usize> {
        (0..self.n_windows(n_rows))
            .map(|i| i * self.stride.max(1))
            .collect()
    }
}

/// Flattened windows ready for a reconstruction backend
#[derive(Debug, Clone)]
pub struct WindowBatch {
    pub starts: Vec<usize>,
    pub window_size: usize,
    pub n_features: usize,
    /// Shape `(n_windows, window_size * n_features)`
    pub flat: Array2<f64>,
}

impl WindowBatch {
    pub fn n_windows(&self) -> usize {
        self.starts.len()
    }

    pub fn width(&self) -> usize {
        self.window_size * self.n_features
    }

    /// The first `n` windows
    pub fn head(&self, n: usize) -> ArrayView2<'_, f64> {
        let n = n.min(self.n_windows());
        self.flat.slice(s![..n, ..])
    }

    /// Fold per-element errors `(n_windows, L * F)` into per-feature means `(n_windows, F)`
    pub fn fold_feature_errors(&self, element_errors: &Array2<f64>) -> Result<Array2<f64>> {
        if element_errors.dim() != self.flat.dim() {
            return Err(FdrError::ShapeError {
                expected: format!("{:?}", self.flat.dim()),
                actual: format!("{:?}", element_errors.dim()),
            });
        }

        let cube = element_errors
            .to_owned()
            .into_shape_with_order((self.n_windows(), self.window_size, self.n_features))?;
        cube.mean_axis(Axis(1)).ok_or_else(|| {
            FdrError::ComputationError("empty window while folding errors".to_string())
        })
    }
}

/// Slices a standardized matrix into windows
#[derive(Debug, Clone)]
pub struct Windower {
    plan: WindowPlan,
}

impl Windower {
    pub fn new(plan: WindowPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> WindowPlan {
        self.plan
    }

    pub fn build(&self, values: &Array2<f64>) -> Result<WindowBatch> {
        let (n_rows, n_features) = values.dim();
        let starts = self.plan.starts(n_rows);
        if starts.is_empty() {
            return Err(FdrError::InsufficientData {
                rows: n_rows,
                window: self.plan.window_size,
            });
        }

        let length = self.plan.window_size;
        let width = length * n_features;
        let mut flat = Array2::zeros((starts.len(), width));
        for (mut row, &start) in flat.axis_iter_mut(Axis(0)).zip(starts.iter()) {
            let window = values.slice(s![start..start + length, ..]);
            for (dst, src) in row.iter_mut().zip(window.iter()) {
                *dst = *src;
            }
        }

        debug!(
            n_windows = starts.len(),
            window_size = length,
            stride = self.plan.stride,
            width,
            "Built windows"
        );

        Ok(WindowBatch {
            starts,
            window_size: length,
            n_features,
            flat,
        })
    }
}

/// Row-level scores folded back from windows
#[derive(Debug, Clone)]
pub struct TimelineScores {
    pub scores: Vec<f64>,
    /// Shape `(n_rows, n_features)`
    pub feature_errors: Array2<f64>,
}

/// Maps window scores onto rows by taking the maximum over covering windows
///
/// Rows not covered by any window keep a score of zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreMapper;

impl ScoreMapper {
    pub fn map(
        n_rows: usize,
        window_size: usize,
        starts: &[usize],
        window_scores: &Array1<f64>,
        window_feature_errors: &Array2<f64>,
    ) -> Result<TimelineScores> {
        if window_scores.len() != starts.len() || window_feature_errors.nrows() != starts.len() {
            return Err(FdrError::ShapeError {
                expected: format!("{} windows", starts.len()),
                actual: format!(
                    "{} scores, {} feature rows",
                    window_scores.len(),
                    window_feature_errors.nrows()
                ),
            });
        }

        let n_features = window_feature_errors.ncols();
        let mut scores = vec![0.0_f64; n_rows];
        let mut feature_errors = Array2::zeros((n_rows, n_features));

        for (idx, &start) in starts.iter().enumerate() {
            let end = (start + window_size).min(n_rows);
            let score = window_scores[idx];
            let errors = window_feature_errors.row(idx);
            for row in start..end {
                scores[row] = scores[row].max(score);
                for (cell, &err) in feature_errors.row_mut(row).iter_mut().zip(errors.iter()) {
                    *cell = f64::max(*cell, err);
                }
            }
        }

        Ok(TimelineScores {
            scores,
            feature_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_window_count() {
        let plan = WindowPlan::for_rows(100, 60, 5);
        assert_eq!(plan.n_windows(100), 9);
        assert_eq!(plan.starts(100).last(), Some(&40));
        assert!(!plan.shrunk);
    }

    #[test]
    fn test_shrink_policy() {
        let plan = WindowPlan::for_rows(12, 60, 5);
        assert_eq!(plan, WindowPlan { window_size: 12, stride: 1, shrunk: true });
        assert_eq!(plan.n_windows(12), 1);

        let tiny = WindowPlan::for_rows(3, 60, 5);
        assert_eq!(tiny.window_size, 5);
        assert_eq!(tiny.n_windows(3), 0);
    }

    #[test]
    fn test_build_flattens_time_major() {
        let values = array![[0.0, 10.0], [1.0, 11.0], [2.0, 12.0], [3.0, 13.0]];
        let batch = Windower::new(WindowPlan::for_rows(4, 2, 2)).build(&values).unwrap();
        assert_eq!(batch.starts, vec![0, 2]);
        assert_eq!(batch.flat.row(1).to_vec(), vec![2.0, 12.0, 3.0, 13.0]);
    }

    #[test]
    fn test_insufficient_data() {
        let values = Array2::zeros((3, 2));
        let err = Windower::new(WindowPlan::for_rows(3, 60, 5)).build(&values);
        assert!(matches!(err, Err(FdrError::InsufficientData { rows: 3, window: 5 })));
    }

    #[test]
    fn test_fold_feature_errors() {
        let values = Array2::zeros((2, 2));
        let batch = Windower::new(WindowPlan::for_rows(2, 2, 1)).build(&values).unwrap();
        let errors = array![[1.0, 10.0, 3.0, 30.0]];
        let folded = batch.fold_feature_errors(&errors).unwrap();
        assert_eq!(folded, array![[2.0, 20.0]]);
    }

    #[test]
    fn test_score_mapper_takes_max() {
        let starts = vec![0, 2];
        let scores = array![1.0, 5.0];
        let features = array![[1.0, 0.0], [0.5, 2.0]];
        let timeline = ScoreMapper::map(6, 3, &starts, &scores, &features).unwrap();

        assert_eq!(timeline.scores, vec![1.0, 1.0, 5.0, 5.0, 5.0, 0.0]);
        assert_eq!(timeline.feature_errors.row(2).to_vec(), vec![1.0, 2.0]);
        assert_eq!(timeline.feature_errors.row(5).to_vec(), vec![0.0, 0.0]);
    }
}
