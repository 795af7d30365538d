//! SQL dump import and schema export

use std::path::Path;

use anyhow::Result;
use colored::*;
use relq_core::plan::{Context, ExportOptions, ImportOptions, Planner, PushOptions};

use super::{connect, open};
use super::push::print_push;
use crate::prompt::TerminalPrompt;

/// Import a dump as the schema source; with `push_after`, apply it too.
pub async fn import(ctx: &Context, options: &ImportOptions, push_after: bool) -> Result<()> {
    // The planner holds the stdin lock; release it before a push asks again.
    let report = Planner::new(ctx, TerminalPrompt::stdin()).import(options)?;

    println!(
        "{} {}",
        "Importing".cyan().bold(),
        options.file.display().to_string().yellow()
    );
    println!("  Objects:  {}", report.objects);
    println!("  New IDs:  {}", report.ids_assigned);
    if report.skipped > 0 {
        println!(
            "  {} {} statement(s) not understood and left out",
            "!".yellow(),
            report.skipped
        );
    }

    if options.dry_run {
        println!();
        print!("{}", report.sql);
        println!("{}", "Dry run: nothing was written.".dimmed());
        return Ok(());
    }
    println!(
        "{}",
        format!("✓ Wrote {}", report.path.display()).green().bold()
    );

    if push_after {
        let mut target = ctx.clone();
        target.config.schema.path = if report.path.is_absolute() {
            report.path.clone()
        } else {
            std::env::current_dir()?.join(&report.path)
        };
        let mut db = connect(&target).await?;
        let mut planner = Planner::new(&target, TerminalPrompt::stdin());
        let options = PushOptions {
            message: Some(format!("Import {}", options.file.display())),
            ..PushOptions::default()
        };
        let pushed = planner.push(&mut db, &options).await;
        db.close().await;
        print_push(&pushed?, false);
    }
    Ok(())
}

pub async fn export(
    ctx: &Context,
    options: &ExportOptions,
    output: Option<&Path>,
    from_database: bool,
) -> Result<()> {
    let planner = Planner::new(ctx, TerminalPrompt::stdin());
    let sql = if from_database {
        // Without --output the SQL goes to stdout, so stay quiet.
        let mut db = open(ctx, output.is_some()).await?;
        let sql = planner.export_database(&mut db, options).await;
        db.close().await;
        sql?
    } else {
        planner.export_snapshot(options)?
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &sql)?;
            eprintln!(
                "{}",
                format!("✓ Exported to {}", path.display()).green().bold()
            );
        }
        None => print!("{sql}"),
    }
    Ok(())
}
