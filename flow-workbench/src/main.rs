use crate::config::cli::CliOpt;
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::EnvFilter;

mod config;
mod generation;
mod util;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = CliOpt::parse();

    // Ctrl+C stops generation at the next tick, keeping the files written so far intact
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))
        .context("failed to register SIGINT handler")?;

    let result = generation::run_and_report_stats(&options, stop);
    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }

    result
}
