//! Data preprocessing module
//!
//! Turns a time-ordered flight table into model-ready numbers:
//! - Feature selection (identifier exclusion, coverage and variety rules)
//! - Missing value imputation (forward/backward fill, constant)
//! - Feature scaling fitted on a leading training slice (standard, robust)

pub mod feature_selection;
mod imputer;
mod scaler;

pub use feature_selection::{
    ColumnVerdict, FeatureMatrix, FeatureSelector, SelectionPolicy, EXCLUDED_COLUMNS,
};
pub use imputer::{ImputeStrategy, Imputer};
pub use scaler::{Scaler, ScalerParams, ScalerType};
