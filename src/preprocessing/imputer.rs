//! Missing value imputation over feature matrices

use ndarray::{Array2, ArrayViewMut1};
use serde::{Deserialize, Serialize};

/// Strategy for imputing missing (`NaN`) values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    /// Carry the last valid value forward in time
    ForwardFill,
    /// Carry the next valid value backward in time
    BackwardFill,
    /// Replace with a constant
    Constant(f64),
}

/// Applies a sequence of strategies column by column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    steps: Vec<ImputeStrategy>,
}

impl Imputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            steps: vec![strategy],
        }
    }

    /// Forward fill, then backward fill the leading gap
    pub fn forward_backward() -> Self {
        Self::new(ImputeStrategy::ForwardFill).then(ImputeStrategy::BackwardFill)
    }

    /// Append a strategy for values still missing after the previous steps
    pub fn then(mut self, strategy: ImputeStrategy) -> Self {
        self.steps.push(strategy);
        self
    }

    /// Fill missing values in place
    pub fn transform_inplace(&self, values: &mut Array2<f64>) {
        for mut column in values.columns_mut() {
            for step in &self.steps {
                Self::fill_column(&mut column, step);
            }
        }
    }

    /// Return a filled copy
    pub fn transform(&self, values: &Array2<f64>) -> Array2<f64> {
        let mut out = values.clone();
        self.transform_inplace(&mut out);
        out
    }

    fn fill_column(column: &mut ArrayViewMut1<f64>, strategy: &ImputeStrategy) {
        match strategy {
            ImputeStrategy::ForwardFill => {
                let mut last = None;
                for v in column.iter_mut() {
                    if v.is_nan() {
                        if let Some(prev) = last {
                            *v = prev;
                        }
                    } else {
                        last = Some(*v);
                    }
                }
            }
            ImputeStrategy::BackwardFill => {
                let mut next = None;
                for v in column.iter_mut().rev() {
                    if v.is_nan() {
                        if let Some(following) = next {
                            *v = following;
                        }
                    } else {
                        next = Some(*v);
                    }
                }
            }
            ImputeStrategy::Constant(fill) => {
                column.mapv_inplace(|v| if v.is_nan() { *fill } else { v });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_forward_backward_fill() {
        let nan = f64::NAN;
        let values = array![[nan, 1.0], [2.0, nan], [nan, nan], [4.0, 3.0]];
        let filled = Imputer::forward_backward().transform(&values);
        assert_eq!(filled, array![[2.0, 1.0], [2.0, 1.0], [2.0, 1.0], [4.0, 3.0]]);
    }

    #[test]
    fn test_constant_fill() {
        let mut values = array![[f64::NAN, 1.0], [2.0, f64::NAN]];
        Imputer::new(ImputeStrategy::Constant(0.0)).transform_inplace(&mut values);
        assert_eq!(values, array![[0.0, 1.0], [2.0, 0.0]]);
    }

    #[test]
    fn test_all_missing_column_stays_missing() {
        let values = array![[f64::NAN], [f64::NAN]];
        let filled = Imputer::forward_backward().transform(&values);
        assert!(filled.iter().all(|v| v.is_nan()));
    }
}
