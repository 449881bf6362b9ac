//! FDR Anomaly - unsupervised anomaly detection for flight data recorder logs
//!
//! This crate scores every sample of a flight against the flight's own
//! learned normal behavior, groups anomalous samples into segments and
//! explains each segment by its driving parameters.
//!
//! # Modules
//!
//! ## Input
//! - [`data`] - Typed flight table and time-column resolution
//! - [`preprocessing`] - Feature selection, gap filling, scaling
//!
//! ## Scoring
//! - [`timeseries`] - Sliding windows, window-to-row mapping, rolling statistics
//! - [`anomaly`] - Scoring backends (autoencoders, linear reconstructor, robust ensemble)
//!
//! ## Output
//! - [`segments`] - Segment grouping, driver attribution, summary
//! - [`report`] - Result document
//! - [`pipeline`] - End-to-end detection
//!
//! ## Services
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use fdr_anomaly::prelude::*;
//!
//! let table = fdr_anomaly::cli::load_table(std::path::Path::new("flight.csv"))?;
//! let report = AnomalyPipeline::new(DetectionConfig::default()).run(&table)?;
//! println!("{} segments", report.summary.segments_found);
//! # Ok::<(), fdr_anomaly::FdrError>(())
//! ```

// Core error handling and configuration
pub mod config;
pub mod error;

// Input
pub mod data;
pub mod preprocessing;

// Scoring
pub mod anomaly;
pub mod timeseries;

// Output
pub mod pipeline;
pub mod report;
pub mod segments;

// Utilities
pub mod utils;

// Services
pub mod cli;

pub use error::{FdrError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling and configuration
    pub use crate::config::{DetectionConfig, DetectionStrategy};
    pub use crate::error::{FdrError, Result};

    // Input
    pub use crate::data::{FlightTable, RawColumn, TimeResolver};
    pub use crate::preprocessing::{FeatureSelector, Imputer, Scaler, ScalerType, SelectionPolicy};

    // Scoring
    pub use crate::anomaly::{
        build_backend, select_backend, BackendKind, RuntimeCapabilities, ScoringBackend,
    };
    pub use crate::timeseries::{ScoreMapper, WindowPlan, Windower};

    // Output
    pub use crate::pipeline::{AnomalyPipeline, TrainedDetector};
    pub use crate::report::{DetectionReport, Timeline};
    pub use crate::segments::{Segment, SegmentGrouper, Severity, Summary};
}
