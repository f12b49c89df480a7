//! Command-line interface for hbscope.
//!
//! # Available Commands
//!
//! - `render` - Compile a template and render it with JSON data, optionally staging
//!   capture blocks (`--capture-out`) or restoring them (`--parent-context`)
//! - `deps` - Show the partial closure of a template as a tree or JSON
//! - `check` - Compile template files and report failures
//!
//! # Global Options
//!
//! - `--verbose` - Debug logging
//! - `--quiet` - Errors only
//! - `--config` - Path to an `hbscope.toml` file
//!
//! Without `--verbose`/`--quiet`, `RUST_LOG` selects the log level (default `warn`).
//! Logs go to stderr so rendered output on stdout stays clean.
//!
//! # Example
//!
//! ```bash
//! hbscope render page.hbs --data page.json --partial header=header.hbs
//! hbscope deps page.hbs --format json
//! hbscope check templates/
//! ```

pub mod check;
pub mod common;
pub mod deps;
pub mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use common::CommandContext;

#[derive(Parser, Debug)]
#[command(
    name = "hbscope",
    about = "Compile and render mustache-style templates with scoped, remotely resolved partials",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file (defaults to HBSCOPE_CONFIG or ./hbscope.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile and render a template
    Render(render::RenderCommand),
    /// Show the partials a template depends on
    Deps(deps::DepsCommand),
    /// Compile template files and report failures
    Check(check::CheckCommand),
}

impl Cli {
    /// The log filter selected by the global flags.
    pub fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    }

    /// Installs the stderr tracing subscriber. Safe to call more than once.
    pub fn init_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .try_init();
    }

    pub async fn execute(self) -> Result<()> {
        let ctx = CommandContext::new(self.config);
        match self.command {
            Commands::Render(cmd) => cmd.execute(&ctx).await,
            Commands::Deps(cmd) => cmd.execute(&ctx).await,
            Commands::Check(cmd) => cmd.execute(&ctx).await,
        }
    }
}
