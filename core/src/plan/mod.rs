//! Migration planner: the workflows behind every command.
//!
//! A [`Planner`] borrows the explicit [`Context`] (configuration plus
//! ignore patterns) and owns a [`Prompt`]. Workflows that touch the
//! database take an [`Adapter`]; everything else works on files only.
//! Nothing here writes to the terminal. Results come back as report
//! structs for the caller to render.

mod generate;
mod migrate;
mod pull;
mod push;
mod rollback;
mod status;

pub use generate::{GenerateOptions, GenerateReport};
pub use migrate::{MigrateOptions, MigrateReport, SeedOptions, SeedReport};
pub use pull::{ExportOptions, ImportOptions, ImportReport, PullReport};
pub use push::{PushOptions, PushReport};
pub use rollback::{RollbackOptions, RollbackReport, RolledBack};
pub use status::{DiffReport, StatusReport, ValidateReport};

use std::path::Path;

use tracing::{debug, warn};

use crate::adapter::{Adapter, is_transaction_unsupported};
use crate::commit::{
    Commit, CommitLog, commits_table_ddl, insert_commit_sql, trim_commits_sql,
};
use crate::config::Config;
use crate::dialect::{self, Dialect, Finding, nile};
use crate::diff::{ChangeSet, diff_schemas};
use crate::emit::is_comment_only;
use crate::error::{RelqError, Result};
use crate::ignore::IgnoreSet;
use crate::parser::{ParsedSchema, parse_source};
use crate::prompt::Prompt;
use crate::schema::Schema;
use crate::snapshot::Snapshot;

/// Everything a command needs besides the database and the terminal.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub ignore: IgnoreSet,
}

impl Context {
    pub fn new(config: Config, ignore: IgnoreSet) -> Self {
        Context { config, ignore }
    }

    /// Context for `config`, with the ignore file next to `relq.toml`.
    pub fn load(config: Config) -> Result<Self> {
        let ignore = IgnoreSet::load(&config.ignore_path())?;
        Ok(Context { config, ignore })
    }

    /// Parse the desired schema source.
    pub fn load_desired(&self) -> Result<ParsedSchema> {
        self.parse_file(&self.config.schema_path())
    }

    pub(crate) fn parse_file(&self, path: &Path) -> Result<ParsedSchema> {
        let sql = std::fs::read_to_string(path).map_err(|e| {
            RelqError::Config(format!("cannot read schema file {}: {e}", path.display()))
        })?;
        let parsed = parse_source(&sql, path)?;
        for skipped in &parsed.skipped {
            warn!(
                file = %path.display(),
                line = skipped.line,
                "statement not understood, left out of the schema"
            );
        }
        Ok(parsed)
    }

    pub fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        Snapshot::load(&self.config.snapshot_path())
    }

    pub fn commit_log(&self) -> Result<CommitLog> {
        CommitLog::load(&self.config.commits_path())
    }

    /// Ignore-filtered change set from `from` to `to`.
    ///
    /// Fails when a kept column depends on an ignored type or sequence.
    pub fn changes(&self, from: &Schema, to: &Schema) -> Result<ChangeSet> {
        self.ignore.validate_dependencies(to)?;
        let from = self.ignore.filter_schema(from);
        let to = self.ignore.filter_schema(to);
        Ok(self.ignore.filter_changes(diff_schemas(&from, &to)))
    }
}

/// Runs workflows against one context with one prompt.
pub struct Planner<'a, P> {
    ctx: &'a Context,
    prompt: P,
}

impl<'a, P: Prompt> Planner<'a, P> {
    pub fn new(ctx: &'a Context, prompt: P) -> Self {
        Planner { ctx, prompt }
    }

    pub fn context(&self) -> &Context {
        self.ctx
    }

    fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Save `schema` as the snapshot, keeping the applied-migration list.
    fn save_snapshot(&self, schema: &Schema, database: Option<String>, applied: Vec<String>) -> Result<()> {
        let mut snapshot = Snapshot::from_schema(schema)
            .with_migrations(self.config().migrations.table.clone(), applied);
        if let Some(database) = database {
            snapshot = snapshot.with_database(database);
        }
        snapshot.save(&self.config().snapshot_path())
    }

    /// Append a commit to the local log. Returns its hash, or `None` when HEAD already matches.
    fn record_commit(&self, log: &mut CommitLog, schema: &Schema, message: String, source: &str) -> Result<Option<String>> {
        let commit = Commit::new(schema, self.config().repository.author.clone(), message, source)?;
        let hash = commit.hash.clone();
        Ok(log.append(commit).then_some(hash))
    }

    /// Push un-mirrored commits to the remote table and trim both sides.
    ///
    /// Mirroring failures are logged; the local log stays authoritative.
    async fn mirror_commits<A: Adapter>(&self, db: &mut A, log: &mut CommitLog) {
        let table = &self.config().repository.commits_table;
        let max = self.config().repository.max_commits;
        if let Err(e) = db.execute(&commits_table_ddl(table)).await {
            warn!(error = %e, "cannot create the commit mirror table");
            return;
        }
        let pending: Vec<Commit> = log.unmirrored().into_iter().cloned().collect();
        for commit in pending {
            let sql = match insert_commit_sql(table, &commit) {
                Ok(sql) => sql,
                Err(e) => {
                    warn!(error = %e, "cannot serialize commit");
                    continue;
                }
            };
            match db.execute(&sql).await {
                Ok(()) => log.mark_mirrored(&commit.hash),
                Err(e) => warn!(hash = %commit.short_hash(), error = %e, "commit not mirrored"),
            }
        }
        let dropped = log.trim(max);
        if dropped > 0 {
            debug!(dropped, "trimmed local commit log");
        }
        if let Err(e) = db.execute(&trim_commits_sql(table, max)).await {
            warn!(error = %e, "cannot trim the commit mirror table");
        }
    }
}

/// Check `statements` against `dialect`, rewriting them for other families.
///
/// Returns the statements to run and the non-blocking findings.
pub(crate) fn check_dialect(
    dialect: Dialect,
    statements: &[String],
    schema: Option<&Schema>,
) -> Result<(Vec<String>, Vec<Finding>)> {
    let transform = !dialect.family().speaks_postgres();
    let mut report = dialect::validate(dialect, statements, transform);
    if let (Dialect::Nile, Some(schema)) = (dialect, schema) {
        report.extend(nile::validate_schema(schema));
    }
    let report = report.into_result()?;
    let sql = report.statements(statements).to_vec();
    let warnings = report.warnings().cloned().collect();
    Ok((sql, warnings))
}

/// Open a transaction when the database supports transactional DDL.
pub(crate) async fn begin<A: Adapter>(db: &mut A) -> Result<bool> {
    if !db.dialect().features().transactional_ddl {
        debug!(dialect = %db.dialect(), "no transactional DDL, running statements one by one");
        return Ok(false);
    }
    match db.begin().await {
        Ok(()) => Ok(true),
        Err(e) if is_transaction_unsupported(&e) => {
            warn!("database refused a DDL transaction, running statements one by one");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Execute statements in order. The first failure rolls back the open
/// transaction and becomes an [`RelqError::Execution`] whose index counts
/// from `offset`.
pub(crate) async fn run<A: Adapter>(
    db: &mut A,
    statements: &[String],
    transactional: bool,
    offset: usize,
) -> Result<usize> {
    let mut executed = 0;
    for (i, statement) in statements.iter().enumerate() {
        if is_comment_only(statement) {
            continue;
        }
        if let Err(e) = db.execute(statement).await {
            let rolled_back = transactional && rollback_quietly(db).await;
            if !transactional && executed > 0 {
                warn!(executed, "statements before the failure were applied");
            }
            return Err(RelqError::execution(
                statement,
                offset + i,
                rolled_back,
                driver_message(e),
            ));
        }
        executed += 1;
    }
    Ok(executed)
}

pub(crate) async fn finish<A: Adapter>(db: &mut A, transactional: bool) -> Result<()> {
    if transactional {
        db.commit().await?;
    }
    Ok(())
}

async fn rollback_quietly<A: Adapter>(db: &mut A) -> bool {
    match db.rollback().await {
        Ok(()) => {
            debug!("transaction rolled back");
            true
        }
        Err(e) => {
            warn!(error = %e, "rollback failed");
            false
        }
    }
}

fn driver_message(err: RelqError) -> String {
    match err {
        RelqError::Database(message) => message,
        other => other.to_string(),
    }
}

/// Ask before applying destructive changes. `Ok(None)` means cancel.
///
/// Declining the first question offers to continue without them.
fn confirm_destructive<P: Prompt>(
    prompt: &mut P,
    changes: ChangeSet,
) -> Result<Option<ChangeSet>> {
    let items = changes.destructive_items();
    let question = format!("Apply {} destructive change(s)?", items.len());
    if prompt.confirm(&question, &items)? {
        return Ok(Some(changes));
    }
    if prompt.confirm("Continue without the destructive changes?", &[])? {
        return Ok(Some(changes.strip_destructive()));
    }
    Ok(None)
}
