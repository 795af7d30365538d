//! Project scaffolding

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::*;
use relq_core::config::{CONFIG_FILE, Config, DEFAULT_CONFIG};
use relq_core::ignore::IGNORE_FILE;

const IGNORE_TEMPLATE: &str = "# Objects relq leaves alone, one pattern per line:
#   [!][TYPE:][parent.]glob
# Internal tables (_relq_*, pg_*, tmp_*) are ignored by default.
#
# audit_*
# COLUMN:users.legacy_*
";

const SCHEMA_TEMPLATE: &str = "-- Desired schema. Edit this file, then run `relq push` or `relq generate`.
-- Tracking IDs (-- @id ...) are added by `relq pull`; keep them when renaming.
";

/// Write `content` to `path` unless it exists. Returns whether it was written.
fn create(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        println!("  {} {} {}", "○".dimmed(), path.display(), "(exists)".dimmed());
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    println!("  {} {}", "✓".green(), path.display());
    Ok(true)
}

fn create_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        println!("  {} {}/", "✓".green(), path.display());
    }
    Ok(())
}

pub fn init(config: Option<&Path>) -> Result<()> {
    let config_path = match config {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?.join(CONFIG_FILE),
    };
    let root: PathBuf = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    println!("{} {}", "Initializing relq in".cyan().bold(), root.display().to_string().yellow());
    create(&config_path, DEFAULT_CONFIG)?;

    let config = Config::load(&config_path)?;
    create(&root.join(IGNORE_FILE), IGNORE_TEMPLATE)?;
    create(&config.schema_path(), SCHEMA_TEMPLATE)?;
    create_dir(&config.migrations_dir())?;
    create_dir(&config.seeds_dir())?;
    create_dir(&config.repository_dir())?;

    println!();
    println!("{}", "✓ Ready".green().bold());
    println!("  Set DATABASE_URL (or [database].url in {CONFIG_FILE}), then run `relq pull` or `relq push`.");
    Ok(())
}
