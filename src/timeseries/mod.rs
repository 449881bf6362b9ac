//! Time series module
//!
//! - Sliding windows over a standardized matrix and score folding back to rows
//! - Rolling median / MAD robust z-scores

mod rolling;
mod windows;

pub use rolling::{RollingWindow, MAD_SCALE};
pub use windows::{ScoreMapper, TimelineScores, WindowBatch, WindowPlan, Windower, MIN_WINDOW_SIZE};
