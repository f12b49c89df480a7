//! Compile and render a template.
//!
//! ```bash
//! # Render with data
//! hbscope render page.hbs --data page.json
//!
//! # First pass: stage capture blocks and save their bindings
//! hbscope render page.hbs --data page.json --output staged.hbs --capture-out ctx.json
//!
//! # Second pass: restore the bindings while rendering the staged output
//! hbscope render staged.hbs --data other.json --parent-context ctx.json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::common::{CommandContext, read_data, read_json, read_template, write_output};
use crate::templating::{CapturedContext, ContextCapturer, RenderOptions};

#[derive(Args, Debug)]
pub struct RenderCommand {
    /// Template file ('-' reads stdin)
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// JSON data to render with
    #[arg(short, long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Register a partial from a file (repeatable)
    #[arg(short, long = "partial", value_name = "NAME=FILE")]
    pub partials: Vec<String>,

    /// Write the captured context of this pass as JSON
    #[arg(long, value_name = "FILE")]
    pub capture_out: Option<PathBuf>,

    /// Restore bindings from a captured context written by an earlier pass
    #[arg(long, value_name = "FILE")]
    pub parent_context: Option<PathBuf>,

    /// Write the rendered output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl RenderCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let scope = ctx.load_scope(&self.partials).await?;
        let source = read_template(&self.template).await?;
        let template = scope.compile(source.as_str()).await?;

        let data = read_data(self.data.as_deref()).await?;
        let parent: Option<CapturedContext> = match &self.parent_context {
            Some(path) => Some(read_json(path).await?),
            None => None,
        };

        let capturer = self.capture_out.as_ref().map(|_| match &parent {
            Some(parent) => ContextCapturer::inherit_and_capture(parent),
            None => ContextCapturer::new(),
        });

        let mut options = RenderOptions::new();
        if let Some(capturer) = &capturer {
            options = options.with_capturer(capturer);
        }
        if let Some(parent) = &parent {
            options = options.with_parent_context(parent);
        }

        let output = template.render_with(&data, options)?;
        write_output(self.output.as_deref(), &output).await?;

        if let (Some(path), Some(capturer)) = (&self.capture_out, &capturer) {
            let captured = capturer.get_result();
            tracing::info!(
                target: "hbscope::cli",
                scopes = capturer.captured_scopes(),
                path = %path.display(),
                "Writing captured context"
            );
            write_output(Some(path), &serde_json::to_string_pretty(&captured)?).await?;
        }
        Ok(())
    }
}
