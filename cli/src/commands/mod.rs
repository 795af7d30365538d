//! Command handlers: load the context, drive the planner, render reports.

mod generate;
mod init;
mod introspect;
mod migrate;
mod push;
mod status;
mod transfer;

pub use generate::generate;
pub use init::init;
pub use introspect::introspect;
pub use migrate::{migrate, rollback, seed};
pub use push::{pull, push};
pub use status::{diff, status, validate};
pub use transfer::{export, import};

use std::fmt;
use std::path::Path;

use anyhow::Result;
use colored::*;
use relq_core::config::Config;
use relq_core::dialect::{Finding, Severity};
use relq_core::diff::Summary;
use relq_core::emit::is_comment_only;
use relq_core::plan::Context;

use crate::driver::PgAdapter;

/// Configuration from `--config` or the nearest `relq.toml`, plus ignore patterns.
pub fn load_context(config: Option<&Path>) -> Result<Context> {
    let config = match config {
        Some(path) => Config::load(path)?,
        None => Config::discover(&std::env::current_dir()?)?,
    };
    Ok(Context::load(config)?)
}

/// A command outcome that is a failure without being an error, e.g. an invalid schema.
#[derive(Debug)]
pub struct Failed(pub String);

impl fmt::Display for Failed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Failed {}

/// Connect with the configured or environment connection settings.
pub async fn connect(ctx: &Context) -> Result<PgAdapter> {
    open(ctx, true).await
}

/// Connect without printing, for machine-readable output.
pub async fn open(ctx: &Context, announce: bool) -> Result<PgAdapter> {
    let connection = ctx
        .config
        .resolve_connection(|name| std::env::var(name).ok())?;
    if announce {
        println!(
            "{} {}",
            "→ Connecting to:".dimmed(),
            connection.redacted().yellow()
        );
    }
    let hidden = vec![
        ctx.config.migrations.table.clone(),
        ctx.config.repository.commits_table.clone(),
    ];
    Ok(PgAdapter::connect(&connection, hidden).await?)
}

pub(crate) fn print_summary(summary: &Summary) {
    if summary.entries.is_empty() {
        println!("  {}", "no changes".dimmed());
        return;
    }
    for line in summary.to_string().lines() {
        println!("  {} {}", "•".cyan(), line);
    }
}

pub(crate) fn print_statements(title: &str, statements: &[String]) {
    println!("{}", title.cyan().bold());
    for statement in statements {
        if is_comment_only(statement) {
            println!("  {}", statement.dimmed());
        } else {
            println!("  {}", statement);
        }
    }
}

pub(crate) fn print_findings(findings: &[Finding]) {
    for finding in findings {
        let marker = match finding.severity {
            Severity::Error => "✗".red(),
            Severity::Warning => "!".yellow(),
            Severity::Info => "i".dimmed(),
        };
        println!("  {} {}", marker, finding);
    }
}
