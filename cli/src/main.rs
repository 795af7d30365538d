//! relq CLI - declarative schema management for PostgreSQL.

mod commands;
mod driver;
mod introspection;
mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::*;
use relq_core::RelqError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relq")]
#[command(about = "Declarative schema management for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to relq.toml (default: searched upwards from the working directory)
    #[arg(short, long, global = true, env = "RELQ_CONFIG")]
    config: Option<PathBuf>,

    /// Show more detail and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create relq.toml, the schema source and the .relq repository
    Init,

    /// Show repository, snapshot and migration state
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare the database with the schema source
    Diff {
        /// Print the SQL push would run
        #[arg(long)]
        sql: bool,

        /// Print the change sets as JSON
        #[arg(long)]
        json: bool,
    },

    /// Make the database the schema source
    Pull,

    /// Apply the schema source to the database
    Push {
        /// Show the plan without executing it
        #[arg(long)]
        dry_run: bool,

        /// Apply destructive changes without asking
        #[arg(long)]
        force: bool,

        /// Include functions and triggers
        #[arg(long)]
        full: bool,

        /// Answer yes to every question
        #[arg(short, long)]
        yes: bool,

        /// Commit message (default: the change summary)
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Write a migration file from the schema source and the snapshot
    Generate {
        /// Migration name
        name: Option<String>,

        /// Write empty UP/DOWN sections
        #[arg(long)]
        empty: bool,

        /// Leave out the DOWN section
        #[arg(long)]
        no_down: bool,

        /// Print the file instead of writing it
        #[arg(long)]
        dry_run: bool,

        /// Include destructive changes without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Apply pending migration files
    Migrate {
        /// Show what would run
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation and accept edited files
        #[arg(long)]
        force: bool,

        /// Answer yes to every question
        #[arg(short, long)]
        yes: bool,

        #[command(flatten)]
        range: Range,
    },

    /// Revert applied pushes and migrations
    Rollback {
        #[command(flatten)]
        range: Range,

        /// Show what would run
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation
        #[arg(long)]
        force: bool,
    },

    /// Turn a SQL dump into the schema source
    Import {
        /// SQL file to import
        file: PathBuf,

        /// Write here instead of the configured schema path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Push the imported schema to the database afterwards
        #[arg(long)]
        db: bool,

        /// Overwrite without asking
        #[arg(long)]
        force: bool,

        /// Print the result instead of writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the snapshot (or the live database) as SQL
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export the live database instead of the snapshot
        #[arg(long)]
        db: bool,

        #[arg(long)]
        include_functions: bool,

        #[arg(long)]
        include_triggers: bool,
    },

    /// Check a schema source without touching the database
    Validate {
        /// Schema file (default: the configured schema path)
        schema: Option<PathBuf>,

        /// Fail on warnings and skipped statements too
        #[arg(long)]
        strict: bool,

        /// Check the generated SQL against this dialect
        #[arg(long, env = "RELQ_DIALECT")]
        dialect: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run seed files
    Seed {
        /// Run this file instead of the seeds directory
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation
        #[arg(long)]
        force: bool,
    },

    /// Print Rust schema-builder code for a SQL schema
    Introspect {
        /// SQL file (default: the configured schema path)
        #[arg(long, conflicts_with = "stdin")]
        file: Option<PathBuf>,

        /// Read SQL from stdin
        #[arg(long)]
        stdin: bool,
    },
}

#[derive(Args)]
struct Range {
    /// Number of entries
    #[arg(long)]
    step: Option<usize>,

    /// Stop at this migration
    #[arg(long)]
    to: Option<String>,
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("RELQ_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "relq=debug,relq_core=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(e),
    }
}

/// Print an error and map it to the exit code.
fn report(err: anyhow::Error) -> ExitCode {
    if let Some(failed) = err.downcast_ref::<commands::Failed>() {
        eprintln!("{} {}", "error:".red().bold(), failed);
        return ExitCode::from(1);
    }
    match err.downcast_ref::<RelqError>() {
        Some(RelqError::UserCancel) => {
            println!("{}", "Cancelled.".yellow());
            ExitCode::SUCCESS
        }
        Some(relq) => {
            eprintln!("{} {}", "error:".red().bold(), relq.format_detailed());
            if let Some(hint) = relq.hint() {
                eprintln!("  {} {}", "hint:".cyan(), hint);
            }
            ExitCode::from(relq.exit_code())
        }
        None => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    use commands::*;

    if let Commands::Init = cli.command {
        return init(cli.config.as_deref());
    }
    let ctx = load_context(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Status { json } => status(&ctx, json, cli.verbose).await,
        Commands::Diff { sql, json } => diff(&ctx, sql, json).await,
        Commands::Pull => pull(&ctx).await,
        Commands::Push {
            dry_run,
            force,
            full,
            yes,
            message,
        } => {
            let options = relq_core::plan::PushOptions {
                dry_run,
                force,
                full,
                yes,
                message,
            };
            push(&ctx, &options).await
        }
        Commands::Generate {
            name,
            empty,
            no_down,
            dry_run,
            yes,
        } => generate(
            &ctx,
            &relq_core::plan::GenerateOptions {
                name,
                empty,
                no_down,
                dry_run,
                yes,
            },
        ),
        Commands::Migrate {
            dry_run,
            force,
            yes,
            range,
        } => {
            let options = relq_core::plan::MigrateOptions {
                dry_run,
                force,
                yes,
                step: range.step,
                to: range.to,
            };
            migrate(&ctx, &options).await
        }
        Commands::Rollback {
            range,
            dry_run,
            force,
        } => {
            let options = relq_core::plan::RollbackOptions {
                step: range.step,
                to: range.to,
                dry_run,
                force,
            };
            rollback(&ctx, &options).await
        }
        Commands::Import {
            file,
            output,
            db,
            force,
            dry_run,
        } => {
            let options = relq_core::plan::ImportOptions {
                file,
                output,
                force,
                dry_run,
            };
            import(&ctx, &options, db).await
        }
        Commands::Export {
            output,
            db,
            include_functions,
            include_triggers,
        } => {
            let options = relq_core::plan::ExportOptions {
                include_functions,
                include_triggers,
            };
            export(&ctx, &options, output.as_deref(), db).await
        }
        Commands::Validate {
            schema,
            strict,
            dialect,
            json,
        } => validate(&ctx, schema, dialect.as_deref(), strict, json),
        Commands::Seed {
            file,
            dry_run,
            force,
        } => seed(&ctx, &relq_core::plan::SeedOptions { file, dry_run, force }).await,
        Commands::Introspect { file, stdin } => introspect(&ctx, file, stdin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_push_flags() {
        let cli = Cli::try_parse_from(["relq", "push", "--dry-run", "--force", "-y"]).unwrap();
        match cli.command {
            Commands::Push {
                dry_run,
                force,
                yes,
                full,
                ..
            } => assert!(dry_run && force && yes && !full),
            _ => panic!("expected push"),
        }
    }

    #[test]
    fn test_parse_rollback_range() {
        let cli = Cli::try_parse_from(["relq", "rollback", "--step", "2"]).unwrap();
        match cli.command {
            Commands::Rollback { range, .. } => {
                assert_eq!(range.step, Some(2));
                assert_eq!(range.to, None);
            }
            _ => panic!("expected rollback"),
        }
    }

    #[test]
    fn test_introspect_file_and_stdin_conflict() {
        assert!(Cli::try_parse_from(["relq", "introspect", "--file", "a.sql", "--stdin"]).is_err());
    }
}
