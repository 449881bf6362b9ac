//! Rolling robust statistics
//!
//! Window bounds follow the usual labelling: a trailing window ends at the
//! current row, a centered window ends `window / 2` rows after it. Only
//! finite values count toward `min_periods`.

use crate::utils::stats;
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Consistency constant turning a MAD into a normal-equivalent deviation
pub const MAD_SCALE: f64 = 0.6745;

/// Rolling window configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    /// Window size in rows
    pub window: usize,
    /// Minimum finite values for a result
    pub min_periods: usize,
    /// Center the window on the current row
    pub center: bool,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self {
            window: 51,
            min_periods: 10,
            center: true,
        }
    }
}

impl RollingWindow {
    pub fn new(window: usize, min_periods: usize) -> Self {
        Self {
            window: window.max(1),
            min_periods,
            center: true,
        }
    }

    /// Use a trailing window instead of a centered one
    pub fn trailing(mut self) -> Self {
        self.center = false;
        self
    }

    /// Row range `[start, end)` covered at position `i`
    fn bounds(&self, i: usize, n: usize) -> (usize, usize) {
        let last = if self.center { i + self.window / 2 } else { i };
        let start = (last + 1).saturating_sub(self.window);
        (start, (last + 1).min(n))
    }

    /// Rolling median; `NaN` where fewer than `min_periods` finite values
    pub fn median(&self, series: &[f64]) -> Vec<f64> {
        let n = series.len();
        let min_periods = self.min_periods.max(1);
        (0..n)
            .map(|i| {
                let (start, end) = self.bounds(i, n);
                let window = &series[start..end];
                let count = window.iter().filter(|v| v.is_finite()).count();
                if count >= min_periods {
                    stats::median(window).unwrap_or(f64::NAN)
                } else {
                    f64::NAN
                }
            })
            .collect()
    }

    /// Robust z-score `0.6745 * (x - median) / MAD` over rolling windows
    ///
    /// Zero MAD, missing inputs and non-finite results all map to 0.
    pub fn robust_z(&self, series: &[f64]) -> Vec<f64> {
        let center = self.median(series);
        let deviation: Vec<f64> = series
            .iter()
            .zip(center.iter())
            .map(|(v, m)| (v - m).abs())
            .collect();
        let mad = self.median(&deviation);

        series
            .iter()
            .zip(center.iter().zip(mad.iter()))
            .map(|(&v, (&m, &d))| {
                if d == 0.0 {
                    return 0.0;
                }
                let z = MAD_SCALE * (v - m) / d;
                if z.is_finite() {
                    z
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Robust z-scores for every column, computed in parallel
    pub fn robust_z_matrix(&self, values: &Array2<f64>) -> Array2<f64> {
        let raw: Vec<Vec<f64>> = values.axis_iter(Axis(1)).map(|c| c.to_vec()).collect();
        let columns: Vec<Vec<f64>> = raw.par_iter().map(|column| self.robust_z(column)).collect();

        let n_rows = values.nrows();
        Array2::from_shape_fn((n_rows, columns.len()), |(row, col)| columns[col][row])
    }
}
