//! Migration file generation

use anyhow::Result;
use colored::*;
use relq_core::plan::{Context, GenerateOptions, Planner};

use super::print_summary;
use crate::prompt::TerminalPrompt;

pub fn generate(ctx: &Context, options: &GenerateOptions) -> Result<()> {
    let mut planner = Planner::new(ctx, TerminalPrompt::stdin());
    let report = planner.generate(options)?;

    let Some(path) = &report.path else {
        println!("{}", "✓ No changes since the snapshot".green().bold());
        println!("  Use --empty to write a blank migration.");
        return Ok(());
    };

    if !options.empty {
        println!("{}", "Changes:".cyan().bold());
        print_summary(&report.summary);
        if report.stripped {
            println!("  {}", "destructive changes left out".yellow());
        }
    }

    if options.dry_run {
        println!("{} {}", "Would write".cyan().bold(), path.display().to_string().yellow());
        println!();
        if let Some(content) = &report.content {
            print!("{content}");
        }
        return Ok(());
    }

    println!(
        "{}",
        format!("✓ Created {}", path.display()).green().bold()
    );
    if !options.empty {
        println!("  Snapshot advanced; run `relq migrate` to apply.");
    }
    Ok(())
}
