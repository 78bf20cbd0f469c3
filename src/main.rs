//! extpack - bundle and package a browser extension.

mod archive;
mod build;
mod cli;
mod compiler;
mod config;
mod error;
mod layout;
mod manifest;
mod utils;
mod watch;

use anyhow::{Context, Result, anyhow};
use build::Pipeline;
use clap::Parser;
use cli::Cli;
use config::PackConfig;
use utils::cancel::CancelToken;
use watch::watch_for_changes_blocking;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PackConfig::load(&cli)?;

    let cancel = CancelToken::new();
    let signal = cancel.clone();
    ctrlc::set_handler(move || {
        log!("build"; "cancelling...");
        signal.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    if cli.is_watch() {
        return watch_for_changes_blocking(&cli, config, &cancel);
    }

    let mode = cli.mode();
    Pipeline::from_config(&config)
        .run(mode, &cancel)
        .map(|_| ())
        // Details were logged when the run failed.
        .map_err(|e| anyhow!("{mode} build failed ({} error)", e.kind()))
}
