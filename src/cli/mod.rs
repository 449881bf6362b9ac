//! Command-line surface
//!
//! Parses arguments (with environment-variable defaults), loads the flight
//! file through polars and renders the report as JSON.

use clap::Parser;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::config::{DetectionConfig, DetectionStrategy};
use crate::data::FlightTable;
use crate::error::{FdrError, Result};
use crate::pipeline::AnomalyPipeline;

#[derive(Parser, Debug, Clone)]
#[command(name = "fdr-anomaly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Anomaly scoring and segmentation for flight data recorder logs")]
#[command(long_about = None)]
pub struct Cli {
    /// Flight data file (.csv or .json)
    pub path: PathBuf,

    /// Scoring strategy
    #[arg(long, value_enum, default_value_t = DetectionStrategy::Reconstruction)]
    pub strategy: DetectionStrategy,

    /// Window length in rows
    #[arg(long, env = "FDR_WINDOW_SIZE", default_value_t = 60)]
    pub window_size: usize,

    /// Row offset between windows
    #[arg(long, env = "FDR_WINDOW_STRIDE", default_value_t = 5)]
    pub stride: usize,

    /// Autoencoder training epochs
    #[arg(long, env = "FDR_EPOCHS", default_value_t = 30)]
    pub epochs: usize,

    /// Autoencoder mini-batch size
    #[arg(long, env = "FDR_BATCH_SIZE", default_value_t = 128)]
    pub batch_size: usize,

    /// Score percentile used as the anomaly threshold
    #[arg(long, env = "FDR_THRESHOLD_PERCENTILE", default_value_t = 97.0)]
    pub threshold_percentile: f64,

    /// Name of the session clock column
    #[arg(long, default_value = "Session Time")]
    pub time_column: String,

    /// Include debugInfo in the output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Detection configuration described by the arguments
    pub fn to_config(&self) -> Result<DetectionConfig> {
        let config = DetectionConfig::default()
            .with_strategy(self.strategy)
            .with_time_column(self.time_column.as_str())
            .with_window(self.window_size, self.stride)
            .with_epochs(self.epochs)
            .with_batch_size(self.batch_size)
            .with_threshold_percentile(self.threshold_percentile)
            .with_debug(self.debug);
        config.validate()?;
        Ok(config)
    }
}

/// Load a `.csv` or `.json` flight file
pub fn load_table(path: &Path) -> Result<FlightTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let df = match ext.as_str() {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(None)
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "json" => JsonReader::new(std::fs::File::open(path)?).finish()?,
        _ => {
            return Err(FdrError::DataError(format!(
                "Unsupported file format: '{}' (expected .csv or .json)",
                ext
            )))
        }
    };

    info!(path = %path.display(), rows = df.height(), columns = df.width(), "Loaded flight file");
    FlightTable::from_dataframe(&df)
}

/// Run a detection for the parsed arguments and return pretty JSON
pub fn cmd_detect(cli: &Cli) -> Result<String> {
    let start = Instant::now();
    let config = cli.to_config()?;
    let table = load_table(&cli.path)?;

    let pipeline = AnomalyPipeline::new(config);
    info!(strategy = %pipeline.config().strategy, backend = %pipeline.selected_backend(), "Starting detection");
    let report = pipeline.run(&table)?;

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Detection complete");
    report.to_json_pretty()
}
