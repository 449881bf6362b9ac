//! Feature scaling fitted on a leading training slice

use crate::error::{FdrError, Result};
use crate::utils::stats;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spreads below this are treated as zero
const MIN_SPREAD: f64 = 1e-12;

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalerType {
    /// (x - mean) / std, with sample std (ddof = 1)
    Standard,
    /// (x - median) / IQR
    Robust,
}

/// Parameters for one fitted feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    /// mean or median
    pub center: f64,
    /// std or IQR, never zero
    pub scale: f64,
}

/// Per-feature affine scaler
///
/// Statistics come only from the first `train_end` rows; the transform is
/// then applied to every row, the training rows included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    names: Vec<String>,
    params: Vec<ScalerParams>,
    train_rows: usize,
    is_fitted: bool,
}

impl Scaler {
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            names: Vec::new(),
            params: Vec::new(),
            train_rows: 0,
            is_fitted: false,
        }
    }

    /// Fit on rows `[0, train_end)` of `values`
    pub fn fit(&mut self, names: &[String], values: &Array2<f64>, train_end: usize) -> Result<&mut Self> {
        if names.len() != values.ncols() {
            return Err(FdrError::ShapeError {
                expected: format!("{} columns", names.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        if values.nrows() == 0 {
            return Err(FdrError::EmptyInput);
        }

        let train_end = train_end.clamp(1, values.nrows());
        let train = values.slice(ndarray::s![..train_end, ..]);

        let params: Vec<ScalerParams> = train
            .axis_iter(Axis(1))
            .map(|column| self.compute_params(&column.to_vec()))
            .collect();
        self.params = params;
        self.names = names.to_vec();
        self.train_rows = train_end;
        self.is_fitted = true;
        Ok(self)
    }

    /// Apply the fitted transform to every row
    pub fn transform(&self, values: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(FdrError::ModelNotFitted);
        }
        if values.ncols() != self.params.len() {
            return Err(FdrError::ShapeError {
                expected: format!("{} columns", self.params.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }

        let mut out = values.clone();
        for (mut column, params) in out.axis_iter_mut(Axis(1)).zip(self.params.iter()) {
            column.mapv_inplace(|v| (v - params.center) / params.scale);
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(
        &mut self,
        names: &[String],
        values: &Array2<f64>,
        train_end: usize,
    ) -> Result<Array2<f64>> {
        self.fit(names, values, train_end)?;
        self.transform(values)
    }

    pub fn scaler_type(&self) -> ScalerType {
        self.scaler_type
    }

    pub fn params(&self) -> &[ScalerParams] {
        &self.params
    }

    pub fn train_rows(&self) -> usize {
        self.train_rows
    }

    /// Center per feature name (mean or median)
    pub fn center_map(&self) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .cloned()
            .zip(self.params.iter().map(|p| p.center))
            .collect()
    }

    /// Spread per feature name (std or IQR)
    pub fn spread_map(&self) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .cloned()
            .zip(self.params.iter().map(|p| p.scale))
            .collect()
    }

    fn compute_params(&self, column: &[f64]) -> ScalerParams {
        let (center, spread) = match self.scaler_type {
            ScalerType::Standard => (stats::nan_mean(column), stats::nan_std(column, 1)),
            ScalerType::Robust => {
                let q = stats::percentiles(column, &[25.0, 50.0, 75.0]);
                let iqr = match (q[0], q[2]) {
                    (Some(q1), Some(q3)) => Some(q3 - q1),
                    _ => None,
                };
                (q[1], iqr)
            }
        };

        ScalerParams {
            center: center.unwrap_or(0.0),
            scale: match spread {
                Some(s) if s.is_finite() && s.abs() >= MIN_SPREAD => s,
                _ => 1.0,
            },
        }
    }
}
