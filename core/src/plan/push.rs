//! `push`: apply the desired schema to the database directly.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Planner, begin, check_dialect, confirm_destructive, finish, run};
use crate::adapter::Adapter;
use crate::diff::Summary;
use crate::dialect::Finding;
use crate::emit;
use crate::error::{RelqError, Result};
use crate::migration::{
    MigrationRecord, content_hash, insert_migration_sql, migrations_table_ddl, next_batch,
};
use crate::prompt::Prompt;
use crate::schema::Schema;
use crate::schema::tracking::merge_tracking_ids;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Stop after planning.
    pub dry_run: bool,
    /// Apply destructive changes without asking.
    pub force: bool,
    /// Include functions and triggers in the comparison.
    pub full: bool,
    /// Answer yes to every question.
    pub yes: bool,
    /// Commit message; defaults to the change summary.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub summary: Summary,
    /// Destructive changes were dropped after the user declined them.
    pub stripped: bool,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub warnings: Vec<Finding>,
    pub applied: bool,
    pub transactional: bool,
    pub execution_time_ms: i64,
    pub commit: Option<String>,
    /// False when the database changed but the snapshot could not be written.
    pub snapshot_saved: bool,
}

impl PushReport {
    pub fn is_empty(&self) -> bool {
        self.summary.entries.is_empty()
    }
}

impl<P: Prompt> Planner<'_, P> {
    pub async fn push<A: Adapter>(&mut self, db: &mut A, options: &PushOptions) -> Result<PushReport> {
        let mut desired = self.ctx.load_desired()?.schema;
        let mut actual = db.introspect().await?;
        let snapshot = self.ctx.load_snapshot()?;
        if let Some(snapshot) = &snapshot {
            merge_tracking_ids(&mut actual, &snapshot.to_schema());
        }
        if !options.full {
            desired = desired.without_routines(false, false);
            actual = actual.without_routines(false, false);
        }

        let mut changes = self.ctx.changes(&actual, &desired)?;
        let mut report = PushReport::default();
        if changes.is_empty() {
            info!("database matches the desired schema");
            return Ok(report);
        }

        if changes.has_destructive() && !options.force && !options.yes {
            let before = changes.summary();
            changes = confirm_destructive(&mut self.prompt, changes)?.ok_or(RelqError::UserCancel)?;
            report.stripped = changes.summary() != before;
        }
        report.summary = changes.summary();
        if changes.is_empty() {
            return Ok(report);
        }

        let sql = emit::generate(&changes);
        let dialect = db.dialect();
        let (up, warnings) = check_dialect(dialect, &sql.up(), Some(&desired))?;
        let down = sql.down();
        let down = match check_dialect(dialect, &down, None) {
            Ok((rewritten, _)) => rewritten,
            Err(e) => {
                warn!(error = %e, "DOWN statements are not valid for the target dialect");
                down
            }
        };
        report.up = up;
        report.down = down;
        report.warnings = warnings;
        if options.dry_run {
            return Ok(report);
        }

        let table = self.config().migrations.table.clone();
        db.execute(&migrations_table_ddl(&table)).await?;
        let applied = db.applied_migrations(&table).await?;

        let started = Instant::now();
        let transactional = begin(db).await?;
        let executed = run(db, &report.up, transactional, 0).await?;
        report.execution_time_ms = started.elapsed().as_millis() as i64;

        let up_sql = report.up.join("\n");
        let record = MigrationRecord {
            name: format!("push_{}", Utc::now().format("%Y%m%d%H%M%S")),
            filename: None,
            hash: content_hash(&up_sql),
            batch: next_batch(&applied),
            execution_time_ms: report.execution_time_ms,
            metadata: serde_json::json!({
                "statements": executed,
                "dialect": dialect.name(),
                "summary": report.summary.to_string(),
            }),
            sql_up: Some(up_sql),
            sql_down: Some(report.down.join("\n")),
            source: "push".to_string(),
        };
        let insert = [insert_migration_sql(&table, &record)];
        run(db, &insert, transactional, report.up.len()).await?;
        finish(db, transactional).await?;
        report.applied = true;
        report.transactional = transactional;
        info!(executed, transactional, "push applied");

        // From here on the database has changed; failures only leave the
        // snapshot behind until the next pull.
        let mut names: Vec<String> = applied.into_iter().map(|m| m.name).collect();
        names.push(record.name.clone());
        let message = options
            .message
            .clone()
            .unwrap_or_else(|| format!("push: {}", report.summary.to_string().replace('\n', "; ")));
        match self.after_push(db, &desired, snapshot.as_ref(), names, message).await {
            Ok(commit) => {
                report.commit = commit;
                report.snapshot_saved = true;
            }
            Err(e) => {
                warn!(error = %e, "database updated but the snapshot was not; run `relq pull`");
            }
        }
        Ok(report)
    }

    async fn after_push<A: Adapter>(
        &self,
        db: &mut A,
        desired: &Schema,
        snapshot: Option<&Snapshot>,
        applied: Vec<String>,
        message: String,
    ) -> Result<Option<String>> {
        let mut current = db.introspect().await?;
        merge_tracking_ids(&mut current, desired);
        if let Some(snapshot) = snapshot {
            merge_tracking_ids(&mut current, &snapshot.to_schema());
        }
        let current = self.ctx.ignore.filter_schema(&current);
        self.save_snapshot(&current, db.database(), applied)?;
        debug!("snapshot saved");

        let mut log = self.ctx.commit_log()?;
        let commit = self.record_commit(&mut log, &current, message, "push")?;
        self.mirror_commits(db, &mut log).await;
        log.save()?;
        Ok(commit)
    }
}
