//! Show the partials a template pulls in.
//!
//! ```bash
//! hbscope deps page.hbs
//! hbscope deps page.hbs --format json
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde_json::json;

use super::common::{CommandContext, read_template};
use crate::constants::ROOT_TEMPLATE_NAME;
use crate::scope::{PartialOrigin, ResolvedClosure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Tree,
    Json,
}

#[derive(Args, Debug)]
pub struct DepsCommand {
    /// Template file ('-' reads stdin)
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Register a partial from a file (repeatable)
    #[arg(short, long = "partial", value_name = "NAME=FILE")]
    pub partials: Vec<String>,

    #[arg(long, value_enum, default_value = "tree")]
    pub format: OutputFormat,
}

impl DepsCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let scope = ctx.load_scope(&self.partials).await?;
        let source = read_template(&self.template).await?;
        let closure = scope.resolve_dependencies(&source).await?;

        match self.format {
            OutputFormat::Tree => print!("{}", render_tree(&closure, &self.template.display().to_string())),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&to_json(&closure))?),
        }
        Ok(())
    }
}

/// Text tree of the closure. Partials already shown on the current branch are
/// marked `(recursive)` instead of being expanded again.
pub fn render_tree(closure: &ResolvedClosure, label: &str) -> String {
    let mut out = format!("{}\n", label.bold());
    let mut branch = HashSet::new();
    branch.insert(ROOT_TEMPLATE_NAME.to_string());
    write_children(closure, ROOT_TEMPLATE_NAME, "", &mut branch, &mut out);
    out
}

fn write_children(
    closure: &ResolvedClosure,
    name: &str,
    prefix: &str,
    branch: &mut HashSet<String>,
    out: &mut String,
) {
    let references = closure.references_of(name);
    for (i, reference) in references.iter().enumerate() {
        let last = i == references.len() - 1;
        let connector = if last { "└── " } else { "├── " };
        let label = match closure.get(reference) {
            Some(partial) => match partial.origin {
                PartialOrigin::Local => format!("{} {}", reference, "(local)".dimmed()),
                PartialOrigin::Remote => format!("{} {}", reference.cyan(), "(remote)".dimmed()),
            },
            None => format!("{} {}", reference.yellow(), "(render-time)".dimmed()),
        };

        if branch.contains(reference) {
            out.push_str(&format!("{prefix}{connector}{label} {}\n", "(recursive)".dimmed()));
            continue;
        }
        out.push_str(&format!("{prefix}{connector}{label}\n"));

        if closure.get(reference).is_some() {
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            branch.insert(reference.clone());
            write_children(closure, reference, &child_prefix, branch, out);
            branch.remove(reference);
        }
    }
}

pub fn to_json(closure: &ResolvedClosure) -> serde_json::Value {
    let partials: Vec<_> = closure
        .partials
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "origin": p.origin,
                "referrer": p.referrer,
                "references": p.references(),
            })
        })
        .collect();
    json!({
        "references": closure.root.references,
        "partials": partials,
        "unresolved": closure.unresolved,
    })
}
