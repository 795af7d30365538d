//! `migrate` applies pending migration files; `seed` runs seed scripts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use super::{Planner, begin, check_dialect, finish, run};
use crate::adapter::Adapter;
use crate::dialect::Finding;
use crate::emit::split_statements;
use crate::error::{RelqError, Result};
use crate::migration::{
    MigrationFile, MigrationRecord, insert_migration_sql, list_migrations,
    migrations_table_ddl, next_batch,
};
use crate::prompt::Prompt;

static DESTRUCTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(DROP\s+(TABLE|TYPE|SEQUENCE|MATERIALIZED\s+VIEW)|DROP\s+COLUMN|TRUNCATE)\b")
        .expect("destructive statement pattern")
});

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    pub dry_run: bool,
    /// Skip the confirmation and accept edited files.
    pub force: bool,
    pub yes: bool,
    /// Apply at most this many files.
    pub step: Option<usize>,
    /// Apply up to and including this migration.
    pub to: Option<String>,
}

/// One applied (or, in a dry run, planned) file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub name: String,
    pub statements: Vec<String>,
    pub execution_time_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateReport {
    pub batch: i32,
    pub migrations: Vec<MigrationOutcome>,
    pub warnings: Vec<Finding>,
    pub applied: bool,
}

/// Whether `file` is selected by `--to NAME`.
pub(crate) fn matches_name(file: &MigrationFile, name: &str) -> bool {
    file.record_name() == name || file.filename == name || file.name == name || file.version == name
}

/// Executable statements of a file section.
pub(crate) fn statements_of(section: &str) -> Vec<String> {
    split_statements(section)
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("{};", s.trim_end_matches(';')))
        .collect()
}

impl<P: Prompt> Planner<'_, P> {
    /// Files not yet recorded in the bookkeeping table, in order.
    pub async fn pending_migrations<A: Adapter>(
        &self,
        db: &mut A,
        force: bool,
    ) -> Result<Vec<MigrationFile>> {
        let files = list_migrations(&self.config().migrations_dir())?;
        let table = &self.config().migrations.table;
        let applied = db.applied_migrations(table).await?;
        let recorded: HashMap<&str, &str> = applied
            .iter()
            .map(|m| (m.name.as_str(), m.hash.as_str()))
            .collect();

        let mut pending = Vec::new();
        for file in files {
            match recorded.get(file.record_name()) {
                Some(hash) if *hash != file.hash => {
                    if !force {
                        return Err(RelqError::Config(format!(
                            "{} was edited after it was applied; restore it or use --force",
                            file.filename
                        )));
                    }
                    warn!(file = %file.filename, "applied migration was edited");
                }
                Some(_) => {}
                None => pending.push(file),
            }
        }
        Ok(pending)
    }

    pub async fn migrate<A: Adapter>(&mut self, db: &mut A, options: &MigrateOptions) -> Result<MigrateReport> {
        let table = self.config().migrations.table.clone();
        if !options.dry_run {
            db.execute(&migrations_table_ddl(&table)).await?;
        }
        let mut pending = self.pending_migrations(db, options.force).await?;
        if let Some(to) = &options.to {
            let end = pending
                .iter()
                .position(|f| matches_name(f, to))
                .ok_or_else(|| RelqError::Config(format!("no pending migration named {to}")))?;
            pending.truncate(end + 1);
        }
        if let Some(step) = options.step {
            pending.truncate(step);
        }

        let applied = db.applied_migrations(&table).await?;
        let mut report = MigrateReport {
            batch: next_batch(&applied),
            ..MigrateReport::default()
        };
        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(report);
        }

        let dialect = db.dialect();
        let mut planned = Vec::new();
        for file in &pending {
            let (statements, warnings) = check_dialect(dialect, &statements_of(&file.sections.up), None)?;
            report.warnings.extend(warnings);
            planned.push((file, statements));
        }

        let destructive: Vec<String> = planned
            .iter()
            .filter(|(_, statements)| statements.iter().any(|s| DESTRUCTIVE.is_match(s)))
            .map(|(file, _)| file.filename.clone())
            .collect();
        if !destructive.is_empty() && !options.force && !options.yes && !options.dry_run {
            let question = format!("{} migration(s) drop data. Apply them?", destructive.len());
            if !self.prompt.confirm(&question, &destructive)? {
                return Err(RelqError::UserCancel);
            }
        }

        if options.dry_run {
            report.migrations = planned
                .into_iter()
                .map(|(file, statements)| MigrationOutcome {
                    name: file.record_name().to_string(),
                    statements,
                    execution_time_ms: 0,
                })
                .collect();
            return Ok(report);
        }

        for (file, statements) in planned {
            let started = Instant::now();
            let transactional = begin(db).await?;
            let executed = run(db, &statements, transactional, 0).await?;
            let elapsed = started.elapsed().as_millis() as i64;
            let record = MigrationRecord {
                name: file.record_name().to_string(),
                filename: Some(file.filename.clone()),
                hash: file.hash.clone(),
                batch: report.batch,
                execution_time_ms: elapsed,
                metadata: serde_json::json!({ "statements": executed, "dialect": dialect.name() }),
                sql_up: Some(file.sections.up.clone()),
                sql_down: file.sections.down.clone(),
                source: "generate".to_string(),
            };
            run(db, &[insert_migration_sql(&table, &record)], transactional, statements.len()).await?;
            finish(db, transactional).await?;
            info!(migration = %record.name, executed, "migration applied");
            report.migrations.push(MigrationOutcome {
                name: record.name,
                statements,
                execution_time_ms: elapsed,
            });
        }
        report.applied = true;
        self.record_applied(db).await;
        Ok(report)
    }

    /// Refresh the snapshot's list of applied migrations.
    pub(crate) async fn record_applied<A: Adapter>(&self, db: &mut A) {
        if let Err(e) = self.refresh_applied(db).await {
            warn!(error = %e, "snapshot not updated");
        }
    }

    async fn refresh_applied<A: Adapter>(&self, db: &mut A) -> Result<()> {
        let Some(mut snapshot) = self.ctx.load_snapshot()? else {
            return Ok(());
        };
        let applied = db.applied_migrations(&self.config().migrations.table).await?;
        snapshot.applied_migrations = applied.into_iter().map(|m| m.name).collect();
        snapshot.save(&self.config().snapshot_path())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeedOptions {
    /// Run this file instead of the seeds directory.
    pub file: Option<PathBuf>,
    pub dry_run: bool,
    /// Skip the confirmation.
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub files: Vec<(String, usize)>,
    pub applied: bool,
}

impl<P: Prompt> Planner<'_, P> {
    pub async fn seed<A: Adapter>(&mut self, db: &mut A, options: &SeedOptions) -> Result<SeedReport> {
        let paths = match &options.file {
            Some(file) => vec![file.clone()],
            None => {
                let dir = self.config().seeds_dir();
                if !dir.exists() {
                    return Err(RelqError::Config(format!(
                        "seeds directory {} not found",
                        dir.display()
                    )));
                }
                let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "sql"))
                    .collect();
                paths.sort();
                paths
            }
        };

        let mut scripts = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            let statements = statements_of(&std::fs::read_to_string(&path)?);
            scripts.push((name, statements));
        }
        let mut report = SeedReport {
            files: scripts.iter().map(|(n, s)| (n.clone(), s.len())).collect(),
            applied: false,
        };
        if options.dry_run || scripts.is_empty() {
            return Ok(report);
        }
        if !options.force {
            let names: Vec<String> = scripts.iter().map(|(n, _)| n.clone()).collect();
            let question = format!("Run {} seed file(s)?", names.len());
            if !self.prompt.confirm(&question, &names)? {
                return Err(RelqError::UserCancel);
            }
        }

        for (name, statements) in &scripts {
            let transactional = begin(db).await?;
            let executed = run(db, statements, transactional, 0).await?;
            finish(db, transactional).await?;
            info!(file = %name, executed, "seed applied");
        }
        report.applied = true;
        Ok(report)
    }
}
