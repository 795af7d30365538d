//! `pull`, `import` and `export`: move schemas between the database, the
//! snapshot and the desired source file.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use super::Planner;
use crate::adapter::Adapter;
use crate::error::{RelqError, Result};
use crate::parser::{RenderOptions, render_schema_sql};
use crate::prompt::Prompt;
use crate::schema::Schema;
use crate::schema::tracking::{assign_missing_ids, merge_tracking_ids};
use crate::snapshot::write_atomic;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub objects: usize,
    pub ids_assigned: usize,
    pub path: PathBuf,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub file: PathBuf,
    /// Write here instead of the configured schema path.
    pub output: Option<PathBuf>,
    /// Overwrite an existing file without asking.
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub objects: usize,
    pub skipped: usize,
    pub ids_assigned: usize,
    pub path: PathBuf,
    pub sql: String,
    pub written: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub include_functions: bool,
    pub include_triggers: bool,
}

fn header(lines: &[&str]) -> RenderOptions {
    RenderOptions {
        header: lines.iter().map(|l| l.to_string()).collect(),
        tracking_ids: true,
    }
}

impl<P: Prompt> Planner<'_, P> {
    /// Tracking IDs already known: the current source file first, then the snapshot.
    fn known_ids(&self) -> Vec<Schema> {
        let mut known = Vec::new();
        let path = self.config().schema_path();
        if path.exists() {
            match self.ctx.parse_file(&path) {
                Ok(parsed) => known.push(parsed.schema),
                Err(e) => debug!(error = %e, "current schema source unreadable, ignoring its IDs"),
            }
        }
        if let Ok(Some(snapshot)) = self.ctx.load_snapshot() {
            known.push(snapshot.to_schema());
        }
        known
    }

    /// Introspect the database and make it the snapshot and the desired source.
    pub async fn pull<A: Adapter>(&mut self, db: &mut A) -> Result<PullReport> {
        let live = db.introspect().await?;
        let mut schema = self.ctx.ignore.filter_schema(&live);
        for known in self.known_ids() {
            merge_tracking_ids(&mut schema, &known);
        }
        let ids_assigned = assign_missing_ids(&mut schema);

        let table = self.config().migrations.table.clone();
        let applied = db
            .applied_migrations(&table)
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();
        self.save_snapshot(&schema, db.database(), applied)?;

        let path = self.config().schema_path();
        let database = db.database().unwrap_or_else(|| db.dialect().to_string());
        let sql = render_schema_sql(
            &schema,
            &header(&["Generated by relq pull", &format!("Database: {database}")]),
        );
        write_atomic(&path, &sql)?;

        let mut log = self.ctx.commit_log()?;
        let commit = self.record_commit(&mut log, &schema, format!("pull from {database}"), "pull")?;
        self.mirror_commits(db, &mut log).await;
        log.save()?;
        info!(objects = schema.object_count(), ids_assigned, "schema pulled");

        Ok(PullReport {
            objects: schema.object_count(),
            ids_assigned,
            path,
            commit,
        })
    }

    /// Parse a raw SQL file and write it as the desired source.
    pub fn import(&mut self, options: &ImportOptions) -> Result<ImportReport> {
        let parsed = self.ctx.parse_file(&options.file)?;
        let mut schema = parsed.schema;
        for known in self.known_ids() {
            merge_tracking_ids(&mut schema, &known);
        }
        let ids_assigned = assign_missing_ids(&mut schema);

        let path = options
            .output
            .clone()
            .unwrap_or_else(|| self.config().schema_path());
        let source = format!("Imported from {}", options.file.display());
        let sql = render_schema_sql(&schema, &header(&[&source]));
        let mut report = ImportReport {
            objects: schema.object_count(),
            skipped: parsed.skipped.len(),
            ids_assigned,
            path: path.clone(),
            sql,
            written: false,
        };
        if options.dry_run {
            return Ok(report);
        }
        if path.exists() && !options.force {
            let question = format!("Overwrite {}?", path.display());
            if !self.prompt.confirm(&question, &[])? {
                return Err(RelqError::UserCancel);
            }
        }
        write_atomic(&path, &report.sql)?;
        report.written = true;

        let mut log = self.ctx.commit_log()?;
        self.record_commit(&mut log, &schema, source, "import")?;
        log.save()?;
        Ok(report)
    }

    /// Render the snapshot as plain SQL.
    pub fn export_snapshot(&self, options: &ExportOptions) -> Result<String> {
        let snapshot = self.ctx.load_snapshot()?.ok_or_else(|| {
            RelqError::Config("no snapshot yet; run `relq pull` or `relq push`".to_string())
        })?;
        Ok(export_sql(
            snapshot.to_schema(),
            options,
            &format!("Exported from snapshot taken {}", snapshot.generated_at.to_rfc3339()),
        ))
    }

    /// Render the live database as plain SQL.
    pub async fn export_database<A: Adapter>(&self, db: &mut A, options: &ExportOptions) -> Result<String> {
        let schema = self.ctx.ignore.filter_schema(&db.introspect().await?);
        let database = db.database().unwrap_or_else(|| db.dialect().to_string());
        Ok(export_sql(schema, options, &format!("Exported from {database}")))
    }
}

fn export_sql(schema: Schema, options: &ExportOptions, title: &str) -> String {
    let schema = schema.without_routines(options.include_functions, options.include_triggers);
    render_schema_sql(
        &schema,
        &RenderOptions {
            header: vec![title.to_string()],
            tracking_ids: false,
        },
    )
}
