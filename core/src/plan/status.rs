//! Read-only workflows: `status`, `diff` and `validate`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Planner;
use crate::adapter::Adapter;
use crate::dialect::{self, Dialect, Finding, nile};
use crate::diff::{ChangeSet, Summary};
use crate::emit::{self, MigrationSql};
use crate::error::{RelqError, Result};
use crate::migration::list_migrations;
use crate::parser::Skipped;
use crate::prompt::Prompt;
use crate::schema::tracking::merge_tracking_ids;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub mirrored: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub root: PathBuf,
    pub schema_path: PathBuf,
    pub schema_exists: bool,
    pub snapshot_taken: Option<DateTime<Utc>>,
    pub snapshot_objects: usize,
    pub head: Option<CommitInfo>,
    pub commits: usize,
    pub unmirrored: usize,
    /// Desired source against the snapshot; `None` when either is missing.
    pub local_changes: Option<Summary>,
    pub migration_files: usize,
    /// Files not yet applied; `None` without a database.
    pub pending_migrations: Option<Vec<String>>,
    pub recent: Vec<CommitInfo>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    /// Database to desired source: what `push` would do.
    pub push: ChangeSet,
    /// Desired source to database: what `pull` would overwrite.
    pub pull: ChangeSet,
    #[serde(skip)]
    pub sql: MigrationSql,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReport {
    pub path: PathBuf,
    pub objects: usize,
    #[serde(skip)]
    pub skipped: Vec<Skipped>,
    pub violations: Vec<String>,
    pub findings: Vec<Finding>,
    pub ignore_warnings: Vec<String>,
}

impl ValidateReport {
    /// Blocking problems; in strict mode skipped statements and warnings count too.
    pub fn is_valid(&self, strict: bool) -> bool {
        let errors = self
            .findings
            .iter()
            .any(|f| f.severity == dialect::Severity::Error);
        let blocking = !self.violations.is_empty() || errors;
        if strict {
            !blocking && self.skipped.is_empty() && self.findings.is_empty() && self.ignore_warnings.is_empty()
        } else {
            !blocking
        }
    }
}

fn info(commit: &crate::commit::Commit) -> CommitInfo {
    CommitInfo {
        hash: commit.short_hash().to_string(),
        message: commit.message.clone(),
        source: commit.source.clone(),
        created_at: commit.created_at,
        mirrored: commit.mirrored,
    }
}

impl<P: Prompt> Planner<'_, P> {
    /// Repository state. Pending migrations are only listed with a database.
    pub async fn status<A: Adapter>(&self, db: Option<&mut A>, recent: usize) -> Result<StatusReport> {
        let config = self.config();
        let schema_path = config.schema_path();
        let snapshot = self.ctx.load_snapshot()?;
        let log = self.ctx.commit_log()?;

        let local_changes = match (&snapshot, schema_path.exists()) {
            (Some(snapshot), true) => {
                let desired = self.ctx.load_desired()?.schema;
                Some(self.ctx.changes(&snapshot.to_schema(), &desired)?.summary())
            }
            _ => None,
        };
        let files = list_migrations(&config.migrations_dir())?;
        let pending_migrations = match db {
            Some(db) => Some(
                self.pending_migrations(db, true)
                    .await?
                    .iter()
                    .map(|f| f.record_name().to_string())
                    .collect(),
            ),
            None => None,
        };

        Ok(StatusReport {
            root: config.root.clone(),
            schema_exists: schema_path.exists(),
            schema_path,
            snapshot_taken: snapshot.as_ref().map(|s| s.generated_at),
            snapshot_objects: snapshot.as_ref().map_or(0, |s| s.to_schema().object_count()),
            head: log.head().map(info),
            commits: log.len(),
            unmirrored: log.unmirrored().len(),
            local_changes,
            migration_files: files.len(),
            pending_migrations,
            recent: log.commits().iter().rev().take(recent).map(info).collect(),
        })
    }

    /// Both directions between the database and the desired source.
    pub async fn diff<A: Adapter>(&self, db: &mut A) -> Result<DiffReport> {
        let desired = self.ctx.load_desired()?.schema;
        let mut actual = db.introspect().await?;
        if let Some(snapshot) = self.ctx.load_snapshot()? {
            merge_tracking_ids(&mut actual, &snapshot.to_schema());
        }
        let push = self.ctx.changes(&actual, &desired)?;
        let pull = self.ctx.changes(&desired, &actual)?;
        let sql = emit::generate(&push);
        Ok(DiffReport { push, pull, sql })
    }

    /// Parse a schema source and check it without touching the database.
    pub fn validate(&self, path: Option<PathBuf>, dialect: Option<Dialect>) -> Result<ValidateReport> {
        let path = path.unwrap_or_else(|| self.config().schema_path());
        if !path.exists() {
            return Err(RelqError::Config(format!("{} not found", path.display())));
        }
        let parsed = self.ctx.parse_file(&path)?;
        let mut report = ValidateReport {
            objects: parsed.schema.object_count(),
            violations: parsed.schema.validate(),
            ignore_warnings: self.ctx.ignore.warnings().to_vec(),
            skipped: parsed.skipped,
            path,
            findings: Vec::new(),
        };
        if let Err(RelqError::DiffDependency { violations }) =
            self.ctx.ignore.validate_dependencies(&parsed.schema)
        {
            report.violations.extend(violations);
        }
        if let Some(dialect) = dialect {
            let statements = emit::generate(&crate::diff::diff_schemas(
                &crate::schema::Schema::new(),
                &self.ctx.ignore.filter_schema(&parsed.schema),
            ))
            .up();
            let transform = !dialect.family().speaks_postgres();
            report.findings = dialect::validate(dialect, &statements, transform).findings;
            if dialect == Dialect::Nile {
                report.findings.extend(nile::validate_schema(&parsed.schema));
            }
        }
        Ok(report)
    }
}
