//! Schema source parser.
//!
//! Reads a PostgreSQL DDL file into a [`Schema`]. Statements are split
//! with the dollar-quote-aware splitter, `-- @id` annotations attach
//! tracking IDs, and each statement goes to a reader for its kind:
//!
//! - `CREATE TABLE` and `ALTER TABLE ... ADD CONSTRAINT` through the SQL
//!   grammar (`sqlparser`, PostgreSQL dialect),
//! - every other object kind through the statement readers in
//!   [`statements`],
//! - anything else is skipped with a warning.
//!
//! ```
//! use relq_core::parser::parse_schema;
//!
//! let schema = parse_schema(
//!     "-- @id t1a2b3c4d5e6f\n\
//!      CREATE TABLE users (\n\
//!          id uuid PRIMARY KEY, -- @id c1a2b3c4d5e6f\n\
//!          email varchar(255) NOT NULL UNIQUE\n\
//!      );",
//! )
//! .unwrap();
//! let users = &schema.tables[0];
//! assert_eq!(users.tracking_id.as_deref(), Some("t1a2b3c4d5e6f"));
//! assert_eq!(users.columns[0].tracking_id.as_deref(), Some("c1a2b3c4d5e6f"));
//! assert_eq!(users.columns[1].params.length, Some(255));
//! ```

mod expr;
mod render;
pub(crate) mod scan;
mod statements;
mod table;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::emit::split::{RawStatement, split_raw, strip_comments};
use crate::error::{RelqError, Result};
use crate::schema::{Index, PartitionChild, Schema};
use scan::Scanner;

pub use expr::{ParsedExpr, parse_expression};
pub use render::{RenderOptions, render_schema_sql};
pub use statements::canonical_query;

static ID_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--\s*@id\s+([A-Za-z0-9_\-]+)").expect("annotation pattern")
});

/// A statement the parser did not turn into schema objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub line: usize,
    pub statement: String,
}

/// Parse result: the schema plus the statements that were passed over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSchema {
    pub schema: Schema,
    pub skipped: Vec<Skipped>,
}

/// One statement being read: code, position and annotation.
pub(crate) struct Source<'a> {
    pub raw: &'a RawStatement,
    pub code: String,
    pub line: usize,
    pub id: Option<String>,
    pub file: &'a Path,
}

impl Source<'_> {
    pub fn error(&self, message: impl Into<String>) -> RelqError {
        RelqError::syntax(self.file, self.line, 1, message)
    }
}

/// Objects that attach to a table once every statement has been read.
#[derive(Default)]
pub(crate) struct Pending {
    pub indexes: Vec<(usize, Option<String>, String, Index)>,
    pub children: Vec<(usize, Option<String>, String, PartitionChild)>,
    pub comments: Vec<(usize, statements::CommentTarget, Option<String>)>,
    pub owned_by: Vec<(usize, String, crate::schema::OwnedBy)>,
    pub constraints: Vec<(usize, String, table::Elements)>,
}

/// Tracking ID annotated on the lines before a statement, or on its first line.
///
/// When the statement follows another one, the text up to the first line
/// break still belongs to the previous line and is not looked at.
fn leading_id(raw: &RawStatement, follows_statement: bool) -> Option<String> {
    let mut id = None;
    for (n, line) in raw.text.lines().enumerate() {
        let has_code = !strip_comments(line).trim().is_empty();
        if n == 0 && follows_statement && !has_code {
            continue;
        }
        if let Some(found) = line_id(line) {
            id = Some(found);
        }
        if has_code {
            break;
        }
    }
    id
}

/// `CREATE ...; -- @id x` puts the annotation at the start of the next piece.
fn trailing_id(next: &RawStatement) -> Option<String> {
    let first = next.text.lines().next()?;
    if strip_comments(first).trim().is_empty() {
        line_id(first)
    } else {
        None
    }
}

/// `-- @id` at the end of `line`, if any.
pub(crate) fn line_id(line: &str) -> Option<String> {
    ID_ANNOTATION.captures(line).map(|c| c[1].to_string())
}

/// Parse schema source text. Errors name the file as `<input>`.
pub fn parse_schema(sql: &str) -> Result<Schema> {
    Ok(parse_source(sql, Path::new("<input>"))?.schema)
}

/// Parse the schema source file at `path`.
pub fn parse_schema_file(path: &Path) -> Result<Schema> {
    let sql = std::fs::read_to_string(path).map_err(|e| {
        RelqError::Config(format!("cannot read schema file {}: {e}", path.display()))
    })?;
    Ok(parse_source(&sql, path)?.schema)
}

/// Parse `sql`, reporting positions against `file`.
pub fn parse_source(sql: &str, file: &Path) -> Result<ParsedSchema> {
    let file: PathBuf = file.to_path_buf();
    let mut out = ParsedSchema::default();
    let mut pending = Pending::default();

    let raws = split_raw(sql);
    for (n, raw) in raws.iter().enumerate() {
        let trailing = raws.get(n + 1).and_then(trailing_id);
        let source = Source {
            code: raw.code(),
            line: raw.code_line(),
            id: leading_id(raw, n > 0).or(trailing),
            raw,
            file: &file,
        };
        if !read_statement(&source, &mut out.schema, &mut pending)? {
            warn!(line = source.line, "skipping unsupported statement: {}", preview(&source.code));
            out.skipped.push(Skipped {
                line: source.line,
                statement: source.code.clone(),
            });
        }
    }

    attach_pending(&mut out.schema, pending, &file)?;
    out.schema.fold_inline_constraints();
    debug!(
        objects = out.schema.object_count(),
        skipped = out.skipped.len(),
        "parsed schema source"
    );
    Ok(out)
}

fn preview(code: &str) -> String {
    let first = code.lines().next().unwrap_or_default();
    if first.chars().count() > 60 {
        format!("{}...", first.chars().take(60).collect::<String>())
    } else {
        first.to_string()
    }
}

/// Dispatch on the leading keywords. Returns false for unsupported statements.
fn read_statement(src: &Source<'_>, schema: &mut Schema, pending: &mut Pending) -> Result<bool> {
    let mut s = Scanner::new(&src.code);

    if s.keyword("COMMENT") {
        return statements::read_comment(src, pending);
    }
    if s.keywords(&["ALTER", "SEQUENCE"]) {
        return statements::read_alter_sequence(src, pending);
    }
    if s.keywords(&["ALTER", "TABLE"]) {
        return table::read_alter_table(src, pending);
    }
    if !s.keyword("CREATE") {
        return Ok(false);
    }
    s.keywords(&["OR", "REPLACE"]);
    for modifier in ["UNLOGGED", "TEMPORARY", "TEMP"] {
        s.keyword(modifier);
    }

    if s.keyword("TABLE") {
        table::read_create_table(src, schema, pending)?;
    } else if s.keywords(&["FOREIGN", "TABLE"]) {
        schema.foreign_tables.push(statements::read_foreign_table(src)?);
    } else if s.peek_keyword("UNIQUE") || s.peek_keyword("INDEX") {
        table::read_create_index(src, pending)?;
    } else if s.keyword("TYPE") {
        statements::read_type(src, schema)?;
    } else if s.keyword("DOMAIN") {
        schema.domains.push(statements::read_domain(src)?);
    } else if s.keyword("SEQUENCE") {
        schema.sequences.push(statements::read_sequence(src, pending)?);
    } else if s.keyword("FUNCTION") || s.keyword("PROCEDURE") {
        schema.functions.push(statements::read_function(src)?);
    } else if s.keyword("TRIGGER") || s.keywords(&["CONSTRAINT", "TRIGGER"]) {
        schema.triggers.push(statements::read_trigger(src)?);
    } else if s.keyword("VIEW") || s.keywords(&["RECURSIVE", "VIEW"]) {
        schema.views.push(statements::read_view(src)?);
    } else if s.keywords(&["MATERIALIZED", "VIEW"]) {
        schema.materialized_views.push(statements::read_view(src)?);
    } else if s.keyword("EXTENSION") {
        schema.extensions.push(statements::read_extension(src)?);
    } else if s.keyword("COLLATION") {
        schema.collations.push(statements::read_collation(src)?);
    } else {
        return Ok(false);
    }
    Ok(true)
}

fn missing_table(file: &Path, line: usize, what: &str, table: &str) -> RelqError {
    RelqError::syntax(file, line, 1, format!("{what} refers to unknown table {table}"))
}

/// Attach indexes, partitions, comments and late constraints to their tables.
fn attach_pending(schema: &mut Schema, pending: Pending, file: &Path) -> Result<()> {
    for (line, id, table_name, mut index) in pending.indexes {
        index.tracking_id = id;
        let table = schema
            .find_table_mut(&table_name)
            .ok_or_else(|| missing_table(file, line, "CREATE INDEX", &table_name))?;
        table.indexes.push(index);
    }

    for (line, id, parent, mut child) in pending.children {
        child.tracking_id = id;
        let table = schema
            .find_table_mut(&parent)
            .ok_or_else(|| missing_table(file, line, "PARTITION OF", &parent))?;
        match &mut table.partition {
            Some(partitioning) => partitioning.children.push(child),
            None => {
                return Err(RelqError::syntax(
                    file,
                    line,
                    1,
                    format!("{} is not partitioned; cannot attach {}", parent, child.name),
                ));
            }
        }
    }

    for (line, table_name, elements) in pending.constraints {
        let table = schema
            .find_table_mut(&table_name)
            .ok_or_else(|| missing_table(file, line, "ALTER TABLE", &table_name))?;
        elements.apply_to(table);
    }

    for (line, target, text) in pending.comments {
        statements::apply_comment(schema, &target, text)
            .map_err(|message| RelqError::syntax(file, line, 1, message))?;
    }

    for (line, sequence, owner) in pending.owned_by {
        let seq = schema
            .sequences
            .iter_mut()
            .find(|s| s.name == sequence)
            .ok_or_else(|| {
                RelqError::syntax(file, line, 1, format!("unknown sequence {sequence}"))
            })?;
        seq.owned_by = Some(owner);
    }
    Ok(())
}
