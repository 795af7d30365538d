//! Read-only reports: status, diff and validate

use std::path::PathBuf;

use anyhow::Result;
use colored::*;
use relq_core::RelqError;
use relq_core::dialect::Dialect;
use relq_core::plan::{Context, Planner, StatusReport};
use tracing::debug;

use super::{Failed, open, print_findings, print_statements, print_summary};
use crate::prompt::TerminalPrompt;

const RECENT_COMMITS: usize = 5;

pub async fn status(ctx: &Context, json: bool, verbose: bool) -> Result<()> {
    let planner = Planner::new(ctx, TerminalPrompt::stdin());

    // Pending migrations need a database; without one the report is local only.
    let mut db = match open(ctx, !json).await {
        Ok(db) => Some(db),
        Err(e) => {
            debug!(error = %e, "status without a database");
            None
        }
    };
    let recent = if verbose { RECENT_COMMITS * 4 } else { RECENT_COMMITS };
    let report = planner.status(db.as_mut(), recent).await?;
    if let Some(db) = db {
        db.close().await;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_status(&report, verbose);
    Ok(())
}

fn print_status(report: &StatusReport, verbose: bool) {
    println!("{}", "relq status".cyan().bold());
    println!();

    let schema = report.schema_path.display().to_string();
    if report.schema_exists {
        println!("  Schema:     {}", schema.yellow());
    } else {
        println!("  Schema:     {} {}", schema.yellow(), "(missing)".red());
    }
    match report.snapshot_taken {
        Some(taken) => println!(
            "  Snapshot:   {} objects, taken {}",
            report.snapshot_objects,
            taken.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("  Snapshot:   {}", "none (run `relq pull` or `relq push`)".dimmed()),
    }
    match &report.head {
        Some(head) => println!(
            "  HEAD:       {} {} {}",
            head.hash.yellow(),
            head.message,
            format!("({})", head.source).dimmed()
        ),
        None => println!("  HEAD:       {}", "no commits".dimmed()),
    }
    println!(
        "  Commits:    {} ({} not mirrored)",
        report.commits, report.unmirrored
    );
    println!("  Migrations: {} file(s)", report.migration_files);

    println!();
    match &report.local_changes {
        Some(summary) if summary.entries.is_empty() => {
            println!("{}", "✓ Schema source matches the snapshot".green())
        }
        Some(summary) => {
            println!("{}", "Local changes since the snapshot:".yellow());
            print_summary(summary);
        }
        None => println!("{}", "○ Nothing to compare yet".dimmed()),
    }

    match &report.pending_migrations {
        Some(pending) if pending.is_empty() => {
            println!("{}", "✓ No pending migrations".green())
        }
        Some(pending) => {
            println!("{} {}", "Pending migrations:".yellow(), pending.len());
            for name in pending {
                println!("  {} {}", "○".dimmed(), name);
            }
        }
        None => println!("{}", "○ Database not reachable; pending migrations unknown".dimmed()),
    }

    if verbose && !report.recent.is_empty() {
        println!();
        println!("{}", "Recent commits:".cyan());
        for commit in &report.recent {
            let mirrored = if commit.mirrored { "✓".green() } else { "○".dimmed() };
            println!(
                "  {} {} {} {} {}",
                mirrored,
                commit.hash.yellow(),
                commit.created_at.format("%Y-%m-%d %H:%M"),
                commit.message,
                format!("({})", commit.source).dimmed()
            );
        }
    }
}

pub async fn diff(ctx: &Context, sql: bool, json: bool) -> Result<()> {
    let planner = Planner::new(ctx, TerminalPrompt::stdin());
    let mut db = open(ctx, !json).await?;
    let report = planner.diff(&mut db).await;
    db.close().await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if report.push.is_empty() && report.pull.is_empty() {
        println!("{}", "✓ Database matches the schema source".green().bold());
        return Ok(());
    }
    println!("{}", "push would change the database:".cyan().bold());
    print_summary(&report.push.summary());
    println!("{}", "pull would change the schema source:".cyan().bold());
    print_summary(&report.pull.summary());
    if sql {
        println!();
        print_statements("-- UP", &report.sql.up());
        println!();
        print_statements("-- DOWN", &report.sql.down());
    }
    Ok(())
}

pub fn validate(
    ctx: &Context,
    schema: Option<PathBuf>,
    dialect: Option<&str>,
    strict: bool,
    json: bool,
) -> Result<()> {
    let dialect = match dialect {
        Some(name) => Some(
            Dialect::parse(name)
                .ok_or_else(|| RelqError::Config(format!("unknown dialect '{name}'")))?,
        ),
        None => ctx.config.database.dialect.as_deref().and_then(Dialect::parse),
    };
    let planner = Planner::new(ctx, TerminalPrompt::stdin());
    let report = planner.validate(schema, dialect)?;
    let valid = report.is_valid(strict);

    if json {
        let mut value = serde_json::to_value(&report)?;
        value["valid"] = serde_json::Value::Bool(valid);
        value["skipped"] = report
            .skipped
            .iter()
            .map(|s| serde_json::json!({ "line": s.line, "statement": s.statement }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "{} {}",
            "Validating".cyan().bold(),
            report.path.display().to_string().yellow()
        );
        println!("  {} object(s)", report.objects);
        for skipped in &report.skipped {
            println!(
                "  {} line {}: not understood, left out: {}",
                "!".yellow(),
                skipped.line,
                skipped.statement.dimmed()
            );
        }
        for violation in &report.violations {
            println!("  {} {}", "✗".red(), violation);
        }
        for warning in &report.ignore_warnings {
            println!("  {} {}", "!".yellow(), warning);
        }
        print_findings(&report.findings);
        if valid {
            println!("{}", "✓ Schema is valid".green().bold());
        } else {
            println!("{}", "✗ Schema is invalid".red().bold());
        }
    }

    if valid {
        Ok(())
    } else {
        Err(Failed(format!("{} failed validation", report.path.display())).into())
    }
}
