//! Compile template files and report failures.
//!
//! Directories are walked recursively; only files with the configured template
//! extension are checked. Exits non-zero when any template fails.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use walkdir::WalkDir;

use super::common::{CommandContext, build_scope, read_template};
use crate::core::{HbscopeError, user_friendly_error};
use crate::scope::TemplateScope;

#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Template files or directories
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Register a partial from a file (repeatable)
    #[arg(short, long = "partial", value_name = "NAME=FILE")]
    pub partials: Vec<String>,

    /// Only print failures
    #[arg(long)]
    pub failures_only: bool,
}

impl CheckCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let config = ctx.load_config().await?;
        let scope = build_scope(&config, &self.partials).await?;
        let files = collect_templates(&self.paths, &config.remote.extension);

        let mut failed = 0;
        for file in &files {
            match check_file(&scope, file).await {
                Ok(partials) => {
                    if !self.failures_only {
                        println!("{} {} ({} partials)", "✓".green(), file.display(), partials);
                    }
                }
                Err(e) => {
                    failed += 1;
                    println!("{} {}", "✗".red(), file.display());
                    println!("  {}", user_friendly_error(e).error);
                }
            }
        }

        if failed > 0 {
            return Err(HbscopeError::CheckFailed {
                failed,
                total: files.len(),
            }
            .into());
        }
        if !self.failures_only {
            println!("{} {} template(s) compiled", "✓".green(), files.len());
        }
        Ok(())
    }
}

async fn check_file(scope: &TemplateScope, path: &Path) -> Result<usize> {
    let source = read_template(path).await?;
    let closure = scope.resolve_dependencies(&source).await?;
    tracing::debug!(
        target: "hbscope::cli",
        path = %path.display(),
        partials = closure.partials.len(),
        unresolved = ?closure.unresolved,
        "Checked template"
    );
    Ok(closure.partials.len())
}

/// Expands directories into the template files below them, sorted per directory.
/// Explicit file arguments are kept regardless of their extension.
pub fn collect_templates(paths: &[PathBuf], extension: &str) -> Vec<PathBuf> {
    let extension = extension.trim_start_matches('.');
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == extension))
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}
