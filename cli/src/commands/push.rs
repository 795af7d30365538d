//! Push the schema source to the database, or pull the database into it

use anyhow::Result;
use colored::*;
use relq_core::plan::{Context, Planner, PushOptions, PushReport};

use super::{connect, print_findings, print_statements, print_summary};
use crate::prompt::TerminalPrompt;

pub async fn push(ctx: &Context, options: &PushOptions) -> Result<()> {
    let mut db = connect(ctx).await?;
    let mut planner = Planner::new(ctx, TerminalPrompt::stdin());
    let report = planner.push(&mut db, options).await;
    db.close().await;
    let report = report?;
    print_push(&report, options.dry_run);
    Ok(())
}

pub(crate) fn print_push(report: &PushReport, dry_run: bool) {
    if report.is_empty() {
        println!("{}", "✓ Database is up to date".green().bold());
        return;
    }
    println!("{}", "Changes:".cyan().bold());
    print_summary(&report.summary);
    if report.stripped {
        println!("  {}", "destructive changes left out".yellow());
    }
    if !report.warnings.is_empty() {
        println!("{}", "Dialect warnings:".yellow());
        print_findings(&report.warnings);
    }

    if dry_run {
        println!();
        print_statements("-- UP", &report.up);
        println!();
        print_statements("-- DOWN", &report.down);
        println!();
        println!("{}", "Dry run: nothing was executed.".dimmed());
        return;
    }
    if !report.applied {
        return;
    }

    let mode = if report.transactional {
        "in a transaction"
    } else {
        "statement by statement"
    };
    println!(
        "{}",
        format!(
            "✓ Applied {} statement(s) {} ({}ms)",
            report.up.len(),
            mode,
            report.execution_time_ms
        )
        .green()
        .bold()
    );
    if let Some(commit) = &report.commit {
        println!("  {} {}", "commit".dimmed(), commit.yellow());
    }
    if !report.snapshot_saved {
        println!(
            "  {}",
            "Snapshot not updated; run `relq pull` to resync.".yellow()
        );
    }
}

pub async fn pull(ctx: &Context) -> Result<()> {
    let mut db = connect(ctx).await?;
    let mut planner = Planner::new(ctx, TerminalPrompt::stdin());
    let report = planner.pull(&mut db).await;
    db.close().await;
    let report = report?;

    println!(
        "{}",
        format!("✓ Schema pulled to {}", report.path.display())
            .green()
            .bold()
    );
    println!("  Objects:      {}", report.objects);
    println!("  New IDs:      {}", report.ids_assigned);
    if let Some(commit) = &report.commit {
        println!("  Commit:       {}", commit.yellow());
    }
    Ok(())
}
