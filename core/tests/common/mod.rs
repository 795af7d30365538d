//! In-memory database and project fixtures for planner tests.
#![allow(dead_code)]

use std::path::Path;

use chrono::Utc;
use relq_core::adapter::{Adapter, NO_TRANSACTIONAL_DDL};
use relq_core::config::Config;
use relq_core::dialect::Dialect;
use relq_core::emit::split_top_level;
use relq_core::error::{RelqError, Result};
use relq_core::ignore::IgnoreSet;
use relq_core::migration::AppliedMigration;
use relq_core::plan::Context;
use relq_core::schema::Schema;
use tempfile::TempDir;

enum Staged {
    Insert(AppliedMigration),
    Delete(i64),
}

/// A database that records statements instead of running them.
///
/// Schema changes are simulated: once a transaction with DDL commits, the
/// live schema becomes `next` (when set). Inserts into and deletes from
/// the bookkeeping table are tracked in `migrations`.
pub struct FakeDb {
    pub dialect: Dialect,
    pub live: Schema,
    pub next: Option<Schema>,
    pub executed: Vec<String>,
    pub migrations: Vec<AppliedMigration>,
    /// Statements containing this text fail.
    pub fail_on: Option<String>,
    /// `begin` reports that DDL cannot run in a transaction.
    pub refuse_transactions: bool,
    pub commits: usize,
    pub rollbacks: usize,
    in_transaction: bool,
    staged: Vec<Staged>,
    ddl_pending: bool,
    next_id: i64,
}

impl FakeDb {
    pub fn new(live: Schema) -> Self {
        FakeDb {
            dialect: Dialect::Postgres,
            live,
            next: None,
            executed: Vec::new(),
            migrations: Vec::new(),
            fail_on: None,
            refuse_transactions: false,
            commits: 0,
            rollbacks: 0,
            in_transaction: false,
            staged: Vec::new(),
            ddl_pending: false,
            next_id: 1,
        }
    }

    pub fn will_become(mut self, next: Schema) -> Self {
        self.next = Some(next);
        self
    }

    /// Executed statements that are not bookkeeping.
    pub fn ddl(&self) -> Vec<&str> {
        self.executed
            .iter()
            .map(String::as_str)
            .filter(|s| !s.contains("_relq_"))
            .collect()
    }

    fn apply(&mut self) {
        for staged in std::mem::take(&mut self.staged) {
            match staged {
                Staged::Insert(row) => self.migrations.push(row),
                Staged::Delete(id) => self.migrations.retain(|m| m.id != id),
            }
        }
        if self.ddl_pending {
            if let Some(next) = self.next.take() {
                self.live = next;
            }
        }
        self.ddl_pending = false;
    }

    fn insert(&mut self, sql: &str) -> AppliedMigration {
        let values = sql
            .split_once("VALUES (")
            .map(|(_, rest)| rest.trim_end().trim_end_matches(')'))
            .unwrap_or_default();
        let fields = split_top_level(values, ',');
        let text = |i: usize| -> Option<String> {
            let raw = fields.get(i)?.trim();
            if raw == "NULL" {
                return None;
            }
            Some(raw.trim_matches('\'').replace("''", "'"))
        };
        let id = self.next_id;
        self.next_id += 1;
        AppliedMigration {
            id,
            name: text(0).unwrap_or_default(),
            filename: text(1),
            hash: text(2).unwrap_or_default(),
            batch: text(3).and_then(|b| b.parse().ok()).unwrap_or(1),
            applied_at: Utc::now(),
            execution_time_ms: text(4).and_then(|t| t.parse().ok()),
            sql_up: text(6),
            sql_down: text(7),
            source: text(8).unwrap_or_default(),
        }
    }
}

impl Adapter for FakeDb {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn database(&self) -> Option<String> {
        Some("fake".to_string())
    }

    async fn introspect(&mut self) -> Result<Schema> {
        Ok(self.live.clone())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.refuse_transactions {
            return Err(RelqError::Database(NO_TRANSACTIONAL_DDL.to_string()));
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.commits += 1;
        self.apply();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.rollbacks += 1;
        self.staged.clear();
        self.ddl_pending = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.executed.push(sql.to_string());
        if let Some(fail) = &self.fail_on {
            if sql.contains(fail.as_str()) {
                return Err(RelqError::Database(format!("simulated failure on {fail}")));
            }
        }
        if sql.starts_with("INSERT INTO \"_relq_migrations\"") {
            let row = self.insert(sql);
            self.staged.push(Staged::Insert(row));
        } else if let Some(id) = sql
            .strip_prefix("DELETE FROM \"_relq_migrations\" WHERE id = ")
            .and_then(|id| id.trim().parse().ok())
        {
            self.staged.push(Staged::Delete(id));
        } else if !sql.contains("_relq_") {
            self.ddl_pending = true;
        }
        if !self.in_transaction {
            self.apply();
        }
        Ok(())
    }

    async fn applied_migrations(&mut self, _table: &str) -> Result<Vec<AppliedMigration>> {
        Ok(self.migrations.clone())
    }
}

/// A project directory with a schema source.
pub struct Project {
    pub dir: TempDir,
    pub ctx: Context,
}

impl Project {
    pub fn new(schema_sql: &str) -> Self {
        Self::with_ignore(schema_sql, "")
    }

    pub fn with_ignore(schema_sql: &str, ignore: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            root: dir.path().to_path_buf(),
            ..Config::default()
        };
        let ctx = Context::new(config, IgnoreSet::parse(ignore));
        let project = Project { dir, ctx };
        project.write_schema(schema_sql);
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_schema(&self, sql: &str) {
        let path = self.ctx.config.schema_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, sql).unwrap();
    }

    pub fn write_migration(&self, filename: &str, content: &str) {
        let dir = self.ctx.config.migrations_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(filename), content).unwrap();
    }
}
