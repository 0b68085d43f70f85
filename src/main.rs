//! Emotion Sliders - Experiment Flattener & Slider Chart Generator
//!
//! Scans a directory of emotion-rating experiment files, flattens their
//! per-round slider readings into one table, exports it as CSV and JSON and
//! draws one chart per user.

mod charts;
mod config;
mod data;
mod export;
mod logging;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use config::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(&cli.log_level)?;

    let config = cli.into_run_config();
    tracing::info!(
        "Emotion Sliders v{} ({:?} form, {:?} fields)",
        env!("CARGO_PKG_VERSION"),
        config.variant,
        config.policy
    );

    let summary = pipeline::run(&config)
        .with_context(|| format!("batch run over {} failed", config.source_dir.display()))?;
    summary.log();

    Ok(())
}
