//! Migration file operations: migrate, rollback and seed

use anyhow::Result;
use colored::*;
use relq_core::plan::{Context, MigrateOptions, Planner, RollbackOptions, SeedOptions};

use super::{connect, print_findings, print_statements};
use crate::prompt::TerminalPrompt;

pub async fn migrate(ctx: &Context, options: &MigrateOptions) -> Result<()> {
    let mut db = connect(ctx).await?;
    let mut planner = Planner::new(ctx, TerminalPrompt::stdin());
    let report = planner.migrate(&mut db, options).await;
    db.close().await;
    let report = report?;

    if report.migrations.is_empty() {
        println!("{}", "✓ No pending migrations".green().bold());
        return Ok(());
    }
    if !report.warnings.is_empty() {
        println!("{}", "Dialect warnings:".yellow());
        print_findings(&report.warnings);
    }

    if options.dry_run {
        println!(
            "{} {}",
            "Would apply batch".cyan().bold(),
            report.batch.to_string().yellow()
        );
        for migration in &report.migrations {
            print_statements(&format!("-- {}", migration.name), &migration.statements);
        }
        println!("{}", "Dry run: nothing was executed.".dimmed());
        return Ok(());
    }

    for migration in &report.migrations {
        println!(
            "  {} {} {}",
            "✓".green(),
            migration.name,
            format!("({}ms)", migration.execution_time_ms).dimmed()
        );
    }
    println!(
        "{}",
        format!(
            "✓ Applied {} migration(s) in batch {}",
            report.migrations.len(),
            report.batch
        )
        .green()
        .bold()
    );
    Ok(())
}

pub async fn rollback(ctx: &Context, options: &RollbackOptions) -> Result<()> {
    let mut db = connect(ctx).await?;
    let mut planner = Planner::new(ctx, TerminalPrompt::stdin());
    let report = planner.rollback(&mut db, options).await;
    db.close().await;
    let report = report?;

    if report.entries.is_empty() {
        println!("{}", "○ Nothing to roll back".dimmed());
        return Ok(());
    }
    if options.dry_run {
        println!("{}", "Would roll back:".cyan().bold());
        for entry in &report.entries {
            print_statements(
                &format!("-- {} ({})", entry.name, entry.source),
                &entry.statements,
            );
        }
        println!("{}", "Dry run: nothing was executed.".dimmed());
        return Ok(());
    }

    for entry in &report.entries {
        println!(
            "  {} {} {}",
            "↩".yellow(),
            entry.name,
            format!("({})", entry.source).dimmed()
        );
    }
    println!(
        "{}",
        format!("✓ Rolled back {} entr(ies)", report.entries.len())
            .green()
            .bold()
    );
    Ok(())
}

pub async fn seed(ctx: &Context, options: &SeedOptions) -> Result<()> {
    let mut db = connect(ctx).await?;
    let mut planner = Planner::new(ctx, TerminalPrompt::stdin());
    let report = planner.seed(&mut db, options).await;
    db.close().await;
    let report = report?;

    if report.files.is_empty() {
        println!("{}", "○ No seed files".dimmed());
        return Ok(());
    }
    for (name, statements) in &report.files {
        let marker = if report.applied { "✓".green() } else { "○".dimmed() };
        println!("  {} {} {}", marker, name, format!("({statements} statements)").dimmed());
    }
    if report.applied {
        println!(
            "{}",
            format!("✓ Seeded {} file(s)", report.files.len()).green().bold()
        );
    } else {
        println!("{}", "Dry run: nothing was executed.".dimmed());
    }
    Ok(())
}
