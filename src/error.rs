//! Error types for the FDR anomaly pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, FdrError>;

/// Main error type for the pipeline
///
/// Every stage returns these synchronously; the pipeline never hands back a
/// partial result alongside an error.
#[derive(Error, Debug)]
pub enum FdrError {
    #[error("Input file must include a '{0}' column.")]
    MissingTimeColumn(String),

    #[error("Unable to parse {0} column to numeric seconds.")]
    TimeParse(String),

    #[error("No numeric parameters available for anomaly detection.")]
    NoFeatures,

    #[error("No rows available for anomaly detection.")]
    EmptyInput,

    #[error("Unable to build windows for anomaly detection ({rows} rows, window {window}).")]
    InsufficientData { rows: usize, window: usize },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FdrError {
    pub(crate) fn invalid_parameter(
        name: &str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        FdrError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for FdrError {
    fn from(err: polars::error::PolarsError) -> Self {
        FdrError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for FdrError {
    fn from(err: serde_json::Error) -> Self {
        FdrError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for FdrError {
    fn from(err: ndarray::ShapeError) -> Self {
        FdrError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
