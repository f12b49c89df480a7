//! hbscope CLI entry point
//!
//! Parses arguments, installs logging, runs the command and prints failures
//! through [`user_friendly_error`].

use anyhow::Result;
use clap::Parser;
use hbscope::cli;
use hbscope::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.init_logging();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
