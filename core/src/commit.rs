//! Commit log: a linear history of applied schema states.
//!
//! Commits live in `<repo>/commits.json` and are mirrored to an
//! append-only table in the database. A commit that was never mirrored is
//! replaced by the next one instead of being chained, so the history only
//! grows with states that actually reached a database.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::emit::quote::{quote_ident, quote_literal};
use crate::error::Result;
use crate::schema::Schema;
use crate::snapshot::write_atomic;

/// File name of the local log inside the repository directory.
pub const COMMITS_FILE: &str = "commits.json";

/// Remote mirror table.
pub const COMMITS_TABLE: &str = "_relq_commits";

/// Default number of commits kept by [`CommitLog::trim`].
pub const DEFAULT_MAX_COMMITS: usize = 1000;

/// One recorded schema state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub hash: String,
    #[serde(default)]
    pub parent_hash: Option<String>,
    pub schema_snapshot: Schema,
    #[serde(default)]
    pub author: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Command that produced the commit: `push`, `pull` or `import`.
    pub source: String,
    #[serde(default)]
    pub mirrored: bool,
}

impl Commit {
    pub fn new(
        schema: &Schema,
        author: Option<String>,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self> {
        Ok(Commit {
            hash: schema_hash(schema)?,
            parent_hash: None,
            schema_snapshot: schema.clone(),
            author,
            message: message.into(),
            created_at: Utc::now(),
            source: source.into(),
            mirrored: false,
        })
    }

    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}

/// Hex SHA-1 of the schema's canonical JSON.
///
/// Object keys are sorted, arrays of named objects are sorted by name and
/// the extension list is sorted, so element order never changes the hash.
pub fn schema_hash(schema: &Schema) -> Result<String> {
    let mut value = serde_json::to_value(schema)?;
    canonicalize(&mut value);
    if let Some(Value::Array(extensions)) = value.get_mut("extensions") {
        extensions.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    }
    let text = serde_json::to_string(&value)?;
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn element_name(value: &Value) -> Option<&str> {
    value.get("name").and_then(Value::as_str)
}

/// `serde_json::Map` keeps keys sorted; this sorts the named arrays.
fn canonicalize(value: &mut Value) {
    match value {
        Value::Object(map) => map.values_mut().for_each(canonicalize),
        Value::Array(items) => {
            items.iter_mut().for_each(canonicalize);
            if !items.is_empty() && items.iter().all(|v| element_name(v).is_some()) {
                items.sort_by(|a, b| element_name(a).cmp(&element_name(b)));
            }
        }
        _ => {}
    }
}

/// The local commit log.
#[derive(Debug, Clone, Default)]
pub struct CommitLog {
    path: PathBuf,
    commits: Vec<Commit>,
}

impl CommitLog {
    /// Load the log at `path`; a missing file is an empty log.
    pub fn load(path: &Path) -> Result<Self> {
        let commits = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        } else {
            Vec::new()
        };
        Ok(CommitLog {
            path: path.to_path_buf(),
            commits,
        })
    }

    pub fn save(&self) -> Result<()> {
        write_atomic(&self.path, &serde_json::to_string_pretty(&self.commits)?)
    }

    /// Oldest first.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn head(&self) -> Option<&Commit> {
        self.commits.last()
    }

    pub fn find(&self, hash_prefix: &str) -> Option<&Commit> {
        self.commits
            .iter()
            .rev()
            .find(|c| c.hash.starts_with(hash_prefix))
    }

    /// Make `commit` the new HEAD. Returns false when HEAD already has its hash.
    ///
    /// An un-mirrored HEAD is replaced and its parent inherited.
    pub fn append(&mut self, mut commit: Commit) -> bool {
        match self.commits.last() {
            Some(head) if head.hash == commit.hash => {
                debug!(hash = %commit.short_hash(), "schema unchanged since HEAD");
                return false;
            }
            Some(head) if !head.mirrored => {
                commit.parent_hash = head.parent_hash.clone();
                debug!(replaced = %head.short_hash(), "replacing un-mirrored HEAD");
                self.commits.pop();
            }
            Some(head) => commit.parent_hash = Some(head.hash.clone()),
            None => commit.parent_hash = None,
        }
        self.commits.push(commit);
        true
    }

    pub fn unmirrored(&self) -> Vec<&Commit> {
        self.commits.iter().filter(|c| !c.mirrored).collect()
    }

    pub fn mark_mirrored(&mut self, hash: &str) {
        if let Some(commit) = self.commits.iter_mut().find(|c| c.hash == hash) {
            commit.mirrored = true;
        }
    }

    /// Keep only the `max` newest commits. Returns how many were dropped.
    pub fn trim(&mut self, max: usize) -> usize {
        let excess = self.commits.len().saturating_sub(max);
        self.commits.drain(..excess);
        excess
    }
}

/// DDL of the remote mirror table.
pub fn commits_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    hash TEXT PRIMARY KEY,
    parent_hash TEXT,
    schema_snapshot JSONB NOT NULL,
    author TEXT,
    message TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'push',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)",
        quote_ident(table)
    )
}

/// Append one commit to the mirror; a hash already present is left alone.
pub fn insert_commit_sql(table: &str, commit: &Commit) -> Result<String> {
    let snapshot = serde_json::to_string(&commit.schema_snapshot)?;
    let optional = |v: &Option<String>| v.as_deref().map_or("NULL".to_string(), quote_literal);
    Ok(format!(
        "INSERT INTO {} (hash, parent_hash, schema_snapshot, author, message, source, created_at) \
         VALUES ({}, {}, {}::jsonb, {}, {}, {}, {}) ON CONFLICT (hash) DO NOTHING",
        quote_ident(table),
        quote_literal(&commit.hash),
        optional(&commit.parent_hash),
        quote_literal(&snapshot),
        optional(&commit.author),
        quote_literal(&commit.message),
        quote_literal(&commit.source),
        quote_literal(&commit.created_at.to_rfc3339()),
    ))
}

/// Delete all but the `max` newest mirrored commits.
pub fn trim_commits_sql(table: &str, max: usize) -> String {
    let table = quote_ident(table);
    format!(
        "DELETE FROM {table} WHERE hash NOT IN (SELECT hash FROM {table} ORDER BY created_at DESC LIMIT {max})"
    )
}
