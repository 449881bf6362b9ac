//! FDR anomaly detection - command-line entry point
//!
//! Prints the detection report as JSON on stdout. Logs go to stderr.

use clap::Parser;
use fdr_anomaly::cli::{cmd_detect, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fdr_anomaly=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    Ok(cmd_detect(cli)?)
}
