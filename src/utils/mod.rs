//! Utility functions and types

pub mod stats;

pub use stats::{all_close, median, nan_max, nan_mean, nan_std, percentile, percentiles, round_to};
