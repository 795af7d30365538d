//! `rollback`: revert recorded migrations, newest first.

use serde::Serialize;
use tracing::{info, warn};

use super::migrate::statements_of;
use super::{Planner, begin, check_dialect, finish, run};
use crate::adapter::Adapter;
use crate::error::{RelqError, Result};
use crate::migration::{AppliedMigration, MigrationFile, delete_migration_sql};
use crate::prompt::Prompt;
use crate::schema::tracking::merge_tracking_ids;

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    /// Number of entries to revert; defaults to one.
    pub step: Option<usize>,
    /// Revert everything recorded after this entry.
    pub to: Option<String>,
    pub dry_run: bool,
    /// Skip the confirmation.
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolledBack {
    pub name: String,
    pub source: String,
    pub statements: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub entries: Vec<RolledBack>,
    pub applied: bool,
}

impl<P: Prompt> Planner<'_, P> {
    pub async fn rollback<A: Adapter>(&mut self, db: &mut A, options: &RollbackOptions) -> Result<RollbackReport> {
        let table = self.config().migrations.table.clone();
        let mut newest_first = db.applied_migrations(&table).await?;
        newest_first.reverse();

        let targets: Vec<AppliedMigration> = match &options.to {
            Some(to) => {
                let keep = newest_first
                    .iter()
                    .position(|m| &m.name == to || m.filename.as_deref() == Some(to.as_str()))
                    .ok_or_else(|| RelqError::Config(format!("no applied migration named {to}")))?;
                newest_first.into_iter().take(keep).collect()
            }
            None => newest_first
                .into_iter()
                .take(options.step.unwrap_or(1))
                .collect(),
        };
        let mut report = RollbackReport::default();
        if targets.is_empty() {
            info!("nothing to roll back");
            return Ok(report);
        }

        let dialect = db.dialect();
        let mut planned = Vec::new();
        for row in targets {
            let down = self.down_for(&row)?.ok_or_else(|| {
                RelqError::Config(format!("{} has no DOWN section to roll back with", row.name))
            })?;
            let statements = if row.source == "generate" {
                check_dialect(dialect, &statements_of(&down), None)?.0
            } else {
                statements_of(&down)
            };
            planned.push((row, statements));
        }
        report.entries = planned
            .iter()
            .map(|(row, statements)| RolledBack {
                name: row.name.clone(),
                source: row.source.clone(),
                statements: statements.clone(),
            })
            .collect();
        if options.dry_run {
            return Ok(report);
        }
        if !options.force {
            let names: Vec<String> = planned.iter().map(|(row, _)| row.name.clone()).collect();
            let question = format!("Roll back {} migration(s)?", names.len());
            if !self.prompt.confirm(&question, &names)? {
                return Err(RelqError::UserCancel);
            }
        }

        for (row, statements) in &planned {
            let transactional = begin(db).await?;
            run(db, statements, transactional, 0).await?;
            run(db, &[delete_migration_sql(&table, row.id)], transactional, statements.len()).await?;
            finish(db, transactional).await?;
            info!(migration = %row.name, "rolled back");
        }
        report.applied = true;

        if let Err(e) = self.resync_snapshot(db).await {
            warn!(error = %e, "database rolled back but the snapshot was not; run `relq pull`");
        }
        Ok(report)
    }

    /// DOWN SQL of a recorded entry: the file's section for generated
    /// migrations, the stored text otherwise.
    fn down_for(&self, row: &AppliedMigration) -> Result<Option<String>> {
        if row.source == "generate" {
            let filename = row
                .filename
                .clone()
                .unwrap_or_else(|| format!("{}.sql", row.name));
            let path = self.config().migrations_dir().join(filename);
            if path.exists() {
                return Ok(MigrationFile::load(&path)?.sections.down);
            }
            warn!(file = %path.display(), "migration file missing, using the recorded DOWN");
        }
        Ok(row.sql_down.clone().filter(|d| !d.trim().is_empty()))
    }

    async fn resync_snapshot<A: Adapter>(&self, db: &mut A) -> Result<()> {
        let mut current = db.introspect().await?;
        if let Some(snapshot) = self.ctx.load_snapshot()? {
            merge_tracking_ids(&mut current, &snapshot.to_schema());
        }
        let current = self.ctx.ignore.filter_schema(&current);
        let applied = db
            .applied_migrations(&self.config().migrations.table)
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();
        self.save_snapshot(&current, db.database(), applied)
    }
}
