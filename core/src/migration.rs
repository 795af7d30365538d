//! Migration files and the bookkeeping table.
//!
//! A migration file is plain SQL with two section headers:
//!
//! ```text
//! -- UP
//! CREATE TABLE "users" ("id" uuid PRIMARY KEY);
//!
//! -- DOWN
//! DROP TABLE IF EXISTS "users" CASCADE;
//! ```
//!
//! Headers are case-insensitive. `-- UP` is required, `-- DOWN` is optional.
//! Files are named `NNNN_name.sql` or `YYYYMMDDHHMMSS_name.sql`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::warn;

use crate::config::MigrationNaming;
use crate::emit::quote::{quote_ident, quote_literal};
use crate::error::{RelqError, Result};

static SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*--\s*(UP|DOWN)\s*$").expect("section pattern"));

static FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<version>\d{4}|\d{14})_(?P<name>[A-Za-z0-9_\-]+)\.sql$")
        .expect("filename pattern")
});

/// The two sections of a migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections {
    pub up: String,
    pub down: Option<String>,
}

/// Split file text into its UP and DOWN sections. Text before `-- UP` is ignored.
pub fn parse_sections(text: &str, file: &Path) -> Result<Sections> {
    let mut up: Option<Vec<&str>> = None;
    let mut down: Option<Vec<&str>> = None;
    for line in text.lines() {
        if let Some(caps) = SECTION.captures(line) {
            if caps[1].eq_ignore_ascii_case("UP") {
                up.get_or_insert_with(Vec::new);
            } else {
                down.get_or_insert_with(Vec::new);
            }
            continue;
        }
        if let Some(lines) = down.as_mut() {
            lines.push(line);
        } else if let Some(lines) = up.as_mut() {
            lines.push(line);
        }
    }
    let Some(up) = up else {
        return Err(RelqError::syntax(file, 1, 1, "missing `-- UP` section"));
    };
    Ok(Sections {
        up: up.join("\n").trim().to_string(),
        down: down
            .map(|lines| lines.join("\n").trim().to_string())
            .filter(|d| !d.is_empty()),
    })
}

/// Render a migration file.
pub fn render_file(name: &str, up: &[String], down: Option<&[String]>) -> String {
    let mut out = format!(
        "-- Migration: {name}\n-- Created: {}\n\n-- UP\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    out.push_str(&up.join("\n\n"));
    out.push('\n');
    if let Some(down) = down {
        out.push_str("\n-- DOWN\n");
        out.push_str(&down.join("\n\n"));
        out.push('\n');
    }
    out
}

/// Lowercase `name`, with runs of other characters collapsed to `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "migration".to_string()
    } else {
        slug
    }
}

/// `(version, name)` of a migration filename.
pub fn parse_filename(filename: &str) -> Option<(String, String)> {
    FILENAME
        .captures(filename)
        .map(|c| (c["version"].to_string(), c["name"].to_string()))
}

/// Filename for a new migration, after the `existing` files.
pub fn next_filename(
    naming: MigrationNaming,
    existing: &[MigrationFile],
    name: &str,
    now: DateTime<Utc>,
) -> String {
    let version = match naming {
        MigrationNaming::Timestamp => now.format("%Y%m%d%H%M%S").to_string(),
        MigrationNaming::Sequential => {
            let last = existing
                .iter()
                .filter(|m| m.version.len() == 4)
                .filter_map(|m| m.version.parse::<u32>().ok())
                .max()
                .unwrap_or(0);
            format!("{:04}", last + 1)
        }
    };
    format!("{version}_{}.sql", slugify(name))
}

/// Hex SHA-1 of a file's content, recorded in the bookkeeping table.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub filename: String,
    pub path: PathBuf,
    pub hash: String,
    pub sections: Sections,
}

impl MigrationFile {
    pub fn load(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (version, name) = parse_filename(&filename).ok_or_else(|| {
            RelqError::Config(format!(
                "{filename}: expected NNNN_name.sql or YYYYMMDDHHMMSS_name.sql"
            ))
        })?;
        let text = std::fs::read_to_string(path)?;
        Ok(MigrationFile {
            version,
            name,
            hash: content_hash(&text),
            sections: parse_sections(&text, path)?,
            path: path.to_path_buf(),
            filename,
        })
    }

    /// Record name: the filename without `.sql`.
    pub fn record_name(&self) -> &str {
        self.filename.trim_end_matches(".sql")
    }
}

/// Migration files in `dir`, ordered by filename. A missing directory is empty.
pub fn list_migrations(dir: &Path) -> Result<Vec<MigrationFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        if parse_filename(&filename).is_none() {
            warn!(file = %filename, "skipping file with a non-migration name");
            continue;
        }
        files.push(MigrationFile::load(&path)?);
    }
    Ok(files)
}

/// Row of the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMigration {
    pub id: i64,
    pub name: String,
    pub filename: Option<String>,
    pub hash: String,
    pub batch: i32,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: Option<i64>,
    pub sql_up: Option<String>,
    pub sql_down: Option<String>,
    /// `push` or `generate`.
    pub source: String,
}

/// Next batch number after the recorded rows.
pub fn next_batch(applied: &[AppliedMigration]) -> i32 {
    applied.iter().map(|m| m.batch).max().unwrap_or(0) + 1
}

/// A row to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    pub name: String,
    pub filename: Option<String>,
    pub hash: String,
    pub batch: i32,
    pub execution_time_ms: i64,
    pub metadata: serde_json::Value,
    pub sql_up: Option<String>,
    pub sql_down: Option<String>,
    pub source: String,
}

pub fn migrations_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    filename TEXT,
    hash TEXT NOT NULL,
    batch INTEGER NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    execution_time_ms BIGINT,
    metadata JSONB,
    sql_up TEXT,
    sql_down TEXT,
    source TEXT NOT NULL DEFAULT 'push'
)",
        quote_ident(table)
    )
}

pub fn select_migrations_sql(table: &str) -> String {
    format!(
        "SELECT id::bigint AS id, name, filename, hash, batch, applied_at, execution_time_ms, \
         sql_up, sql_down, source FROM {} ORDER BY id",
        quote_ident(table)
    )
}

pub fn insert_migration_sql(table: &str, record: &MigrationRecord) -> String {
    let optional = |v: &Option<String>| v.as_deref().map_or("NULL".to_string(), quote_literal);
    format!(
        "INSERT INTO {} (name, filename, hash, batch, execution_time_ms, metadata, sql_up, sql_down, source) \
         VALUES ({}, {}, {}, {}, {}, {}::jsonb, {}, {}, {})",
        quote_ident(table),
        quote_literal(&record.name),
        optional(&record.filename),
        quote_literal(&record.hash),
        record.batch,
        record.execution_time_ms,
        quote_literal(&record.metadata.to_string()),
        optional(&record.sql_up),
        optional(&record.sql_down),
        quote_literal(&record.source),
    )
}

pub fn delete_migration_sql(table: &str, id: i64) -> String {
    format!("DELETE FROM {} WHERE id = {id}", quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn path() -> &'static Path {
        Path::new("0001_init.sql")
    }

    #[test]
    fn test_sections() {
        let text = "-- Migration: init\n-- up\nCREATE TABLE a (id int);\n\n--DOWN\nDROP TABLE a;\n";
        let sections = parse_sections(text, path()).unwrap();
        assert_eq!(sections.up, "CREATE TABLE a (id int);");
        assert_eq!(sections.down.as_deref(), Some("DROP TABLE a;"));
    }

    #[test]
    fn test_down_is_optional() {
        let sections = parse_sections("-- UP\nSELECT 1;\n", path()).unwrap();
        assert_eq!(sections.down, None);
        let empty_down = parse_sections("-- UP\nSELECT 1;\n-- DOWN\n\n", path()).unwrap();
        assert_eq!(empty_down.down, None);
    }

    #[test]
    fn test_up_is_required() {
        let err = parse_sections("CREATE TABLE a (id int);\n-- DOWN\n", path()).unwrap_err();
        assert!(matches!(err, RelqError::SchemaSyntax { .. }));
    }

    #[test]
    fn test_rendered_file_parses_back() {
        let up = vec!["CREATE TABLE \"a\" (\"id\" integer);".to_string()];
        let down = vec!["DROP TABLE IF EXISTS \"a\" CASCADE;".to_string()];
        let text = render_file("init", &up, Some(&down));
        let sections = parse_sections(&text, path()).unwrap();
        assert_eq!(sections.up, up[0]);
        assert_eq!(sections.down.as_deref(), Some(down[0].as_str()));

        let no_down = render_file("init", &up, None);
        assert!(!no_down.contains("-- DOWN"));
    }

    #[test]
    fn test_filenames() {
        assert_eq!(
            parse_filename("0007_add_users.sql"),
            Some(("0007".to_string(), "add_users".to_string()))
        );
        assert_eq!(
            parse_filename("20260101120000_x.sql").map(|(v, _)| v),
            Some("20260101120000".to_string())
        );
        assert_eq!(parse_filename("7_x.sql"), None);
        assert_eq!(parse_filename("notes.md"), None);
        assert_eq!(slugify("Add Users  table!"), "add_users_table");
        assert_eq!(slugify("  "), "migration");
    }

    #[test]
    fn test_next_filename() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            next_filename(MigrationNaming::Timestamp, &[], "add users", now),
            "20260304050607_add_users.sql"
        );
        assert_eq!(
            next_filename(MigrationNaming::Sequential, &[], "init", now),
            "0001_init.sql"
        );

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001_init.sql"), "-- UP\nSELECT 1;\n").unwrap();
        std::fs::write(dir.path().join("0002_more.sql"), "-- UP\nSELECT 2;\n").unwrap();
        std::fs::write(dir.path().join("README.sql"), "notes").unwrap();
        let files = list_migrations(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].record_name(), "0002_more");
        assert_eq!(
            next_filename(MigrationNaming::Sequential, &files, "x", now),
            "0003_x.sql"
        );
    }

    #[test]
    fn test_bookkeeping_sql() {
        assert!(migrations_table_ddl("_relq_migrations").contains("source TEXT NOT NULL DEFAULT 'push'"));
        let record = MigrationRecord {
            name: "push_1".into(),
            filename: None,
            hash: "abc".into(),
            batch: 2,
            execution_time_ms: 15,
            metadata: serde_json::json!({"statements": 1}),
            sql_up: Some("CREATE TABLE \"a\" ();".into()),
            sql_down: None,
            source: "push".into(),
        };
        let sql = insert_migration_sql("_relq_migrations", &record);
        assert!(sql.contains("'push_1', NULL, 'abc', 2, 15, '{\"statements\":1}'::jsonb"));
        assert_eq!(
            delete_migration_sql("_relq_migrations", 4),
            "DELETE FROM \"_relq_migrations\" WHERE id = 4"
        );
    }

    #[test]
    fn test_next_batch() {
        assert_eq!(next_batch(&[]), 1);
    }
}
