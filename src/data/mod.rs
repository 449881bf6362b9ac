//! Input data model
//!
//! - [`FlightTable`]: typed columns produced by a loader
//! - [`TimeResolver`]: session clock parsing and row ordering

pub mod table;
pub mod time;

pub use table::{FlightTable, RawColumn};
pub use time::{TimeInterpretation, TimeResolver, TimeSeries};
