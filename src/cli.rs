//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use crate::compiler::BuildMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// extpack - bundle and package a browser extension
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Source directory path (relative to project root)
    #[arg(short, long)]
    pub src: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file name (default: extpack.toml)
    #[arg(short = 'C', long, default_value = "extpack.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build a minified, map-free archive once
    Prod,

    /// Build with source maps and rebuild on every source change
    Dev {
        /// Build once and exit instead of watching
        #[arg(long)]
        no_watch: bool,
    },

    /// Build once in the given mode
    Build {
        #[arg(short, long, value_enum, default_value_t = BuildMode::Prod)]
        mode: BuildMode,
    },
}

impl Cli {
    /// Mode of the run(s) this invocation performs.
    pub const fn mode(&self) -> BuildMode {
        match self.command {
            Commands::Prod => BuildMode::Prod,
            Commands::Dev { .. } => BuildMode::Dev,
            Commands::Build { mode } => mode,
        }
    }

    /// Whether this invocation enters the watch loop.
    pub const fn is_watch(&self) -> bool {
        matches!(self.command, Commands::Dev { no_watch: false })
    }
}
