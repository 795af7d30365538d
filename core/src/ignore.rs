//! `.relqignore` pattern engine.
//!
//! One pattern per line:
//!
//! ```text
//! [!] [TYPE:] [parent.] glob
//! ```
//!
//! `TYPE` defaults to `TABLE`. Scoped kinds (columns, indexes,
//! constraints, partitions, triggers) need the `parent.` part. Patterns
//! are evaluated in order and the last one that matches decides.
//!
//! ```
//! use relq_core::ignore::IgnoreSet;
//! use relq_core::schema::ObjectKind;
//!
//! let set = IgnoreSet::parse("audit_*\n!audit_keep\nCOLUMN:users.password_hash");
//! assert!(set.is_ignored(ObjectKind::Table, "audit_log", None));
//! assert!(!set.is_ignored(ObjectKind::Table, "audit_keep", None));
//! assert!(set.is_ignored(ObjectKind::Column, "password_hash", Some("users")));
//! assert!(!set.is_ignored(ObjectKind::Column, "password_hash", Some("admins")));
//! ```

use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::diff::ChangeSet;
use crate::emit::quote::base_name;
use crate::error::{RelqError, Result};
use crate::schema::{ObjectKind, Schema, Table};

/// Internal tables hidden unless a later `!` pattern brings them back.
pub const DEFAULT_PATTERNS: [&str; 5] = ["_relq_*", "__relq_*", "pg_*", "_temp_*", "tmp_*"];

/// Default ignore file name, looked up next to `relq.toml`.
pub const IGNORE_FILE: &str = ".relqignore";

/// One parsed pattern line.
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    pub kind: ObjectKind,
    pub negated: bool,
    parent: Option<Regex>,
    name: Regex,
    /// The line as written.
    pub source: String,
}

impl IgnorePattern {
    fn matches(&self, kind: ObjectKind, name: &str, parent: Option<&str>) -> bool {
        let kind_matches =
            self.kind == kind || (kind.is_constraint() && self.kind == ObjectKind::Constraint);
        if !kind_matches || !self.name.is_match(name) {
            return false;
        }
        match (&self.parent, parent) {
            (None, _) => true,
            (Some(re), Some(p)) => re.is_match(p),
            (Some(_), None) => false,
        }
    }
}

/// Translate a `*`/`?` glob into an anchored, case-insensitive regex.
fn glob_to_regex(glob: &str) -> std::result::Result<Regex, regex::Error> {
    let mut pattern = String::from("(?i)^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

/// An ordered list of ignore patterns, defaults first.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    patterns: Vec<IgnorePattern>,
    warnings: Vec<String>,
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::parse("")
    }
}

impl IgnoreSet {
    /// Parse ignore-file text. Malformed lines are skipped and reported in
    /// [`IgnoreSet::warnings`].
    pub fn parse(text: &str) -> Self {
        let mut set = IgnoreSet {
            patterns: Vec::new(),
            warnings: Vec::new(),
        };
        for default in DEFAULT_PATTERNS {
            set.push_line(default, 0);
        }
        for (idx, line) in text.lines().enumerate() {
            set.push_line(line, idx + 1);
        }
        set
    }

    /// Load from a file; a missing file yields the defaults only.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no ignore file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    fn push_line(&mut self, raw: &str, line_no: usize) {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        match parse_line(line) {
            Ok(pattern) => self.patterns.push(pattern),
            Err(reason) => {
                let message = format!("line {line_no}: {reason}: '{line}'");
                warn!("ignoring malformed .relqignore {message}");
                self.warnings.push(message);
            }
        }
    }

    pub fn patterns(&self) -> &[IgnorePattern] {
        &self.patterns
    }

    /// Lines that were skipped, with the reason.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True if the last pattern matching this object is not negated.
    ///
    /// Constraint sub-kinds also match `CONSTRAINT:` patterns.
    pub fn is_ignored(&self, kind: ObjectKind, name: &str, parent: Option<&str>) -> bool {
        let mut ignored = false;
        for pattern in &self.patterns {
            if pattern.matches(kind, name, parent) {
                ignored = !pattern.negated;
            }
        }
        ignored
    }

    fn table_ignored(&self, table: &Table) -> bool {
        self.is_ignored(ObjectKind::Table, &table.name, None)
    }

    /// Copy of `schema` without ignored objects.
    pub fn filter_schema(&self, schema: &Schema) -> Schema {
        let mut out = schema.clone();

        out.tables.retain(|t| !self.table_ignored(t));
        for table in &mut out.tables {
            let parent = table.name.clone();
            let p = Some(parent.as_str());
            table
                .columns
                .retain(|c| !self.is_ignored(ObjectKind::Column, &c.name, p));
            table
                .indexes
                .retain(|i| !self.is_ignored(ObjectKind::Index, &i.name, p));
            table
                .constraints
                .retain(|c| !self.is_ignored(c.kind.object_kind(), &c.name, p));
            if let Some(partition) = &mut table.partition {
                partition
                    .children
                    .retain(|c| !self.is_ignored(ObjectKind::Partition, &c.name, p));
            }
        }

        out.extensions
            .retain(|e| !self.is_ignored(ObjectKind::Extension, e, None));
        out.collations
            .retain(|c| !self.is_ignored(ObjectKind::Collation, &c.name, None));
        out.enums
            .retain(|e| !self.is_ignored(ObjectKind::Enum, &e.name, None));
        out.domains
            .retain(|d| !self.is_ignored(ObjectKind::Domain, &d.name, None));
        out.composite_types
            .retain(|c| !self.is_ignored(ObjectKind::CompositeType, &c.name, None));
        out.sequences
            .retain(|s| !self.is_ignored(ObjectKind::Sequence, &s.name, None));
        out.views
            .retain(|v| !self.is_ignored(ObjectKind::View, &v.name, None));
        out.materialized_views
            .retain(|v| !self.is_ignored(ObjectKind::MaterializedView, &v.name, None));
        out.foreign_tables
            .retain(|t| !self.is_ignored(ObjectKind::ForeignTable, &t.name, None));
        out.functions.retain(|f| {
            let kind = if f.is_procedure {
                ObjectKind::Procedure
            } else {
                ObjectKind::Function
            };
            !self.is_ignored(kind, &f.name, None)
        });
        out.triggers.retain(|t| {
            !self.is_ignored(ObjectKind::Table, &t.table, None)
                && !self.is_ignored(ObjectKind::Trigger, &t.name, Some(&t.table))
        });
        out
    }

    /// Drop ignored entries from a change set.
    pub fn filter_changes(&self, changes: ChangeSet) -> ChangeSet {
        changes.filter(self)
    }

    /// Fail if a kept column depends on an ignored type or sequence.
    ///
    /// `schema` is the unfiltered desired schema. Every violation is listed.
    pub fn validate_dependencies(&self, schema: &Schema) -> Result<()> {
        let mut violations = Vec::new();

        for table in schema.tables.iter().filter(|t| !self.table_ignored(t)) {
            for col in &table.columns {
                if self.is_ignored(ObjectKind::Column, &col.name, Some(&table.name)) {
                    continue;
                }
                let type_name = base_name(col.data_type.trim_end_matches("[]"));
                let referenced = [
                    (ObjectKind::Enum, schema.enums.iter().any(|e| e.name == type_name)),
                    (ObjectKind::Domain, schema.domains.iter().any(|d| d.name == type_name)),
                    (
                        ObjectKind::CompositeType,
                        schema.composite_types.iter().any(|c| c.name == type_name),
                    ),
                ];
                for (kind, exists) in referenced {
                    if exists && self.is_ignored(kind, &type_name, None) {
                        violations.push(format!(
                            "column {}.{} uses ignored {} {}",
                            table.name,
                            col.name,
                            kind.label(),
                            type_name
                        ));
                    }
                }
                if let Some(seq) = col.default_sequence() {
                    if self.is_ignored(ObjectKind::Sequence, &seq, None) {
                        violations.push(format!(
                            "column {}.{} defaults to nextval of ignored sequence {}",
                            table.name, col.name, seq
                        ));
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(RelqError::DiffDependency { violations })
        }
    }
}

fn parse_line(line: &str) -> std::result::Result<IgnorePattern, String> {
    let (negated, body) = match line.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, line),
    };

    let (kind, target) = match body.split_once(':') {
        Some((kind, target)) => (kind.parse::<ObjectKind>()?, target.trim()),
        None => (ObjectKind::Table, body),
    };
    if target.is_empty() {
        return Err("empty pattern".to_string());
    }

    let (parent, name) = match target.split_once('.') {
        Some((parent, name)) if kind.requires_parent() => (Some(parent), name),
        Some(_) => return Err(format!("{kind} patterns take no parent")),
        None if kind.requires_parent() => {
            return Err(format!("{kind} patterns need a parent (parent.name)"));
        }
        None => (None, target),
    };
    if name.is_empty() || parent.is_some_and(str::is_empty) {
        return Err("empty pattern".to_string());
    }

    let parent = parent
        .map(glob_to_regex)
        .transpose()
        .map_err(|e| e.to_string())?;
    let name = glob_to_regex(name).map_err(|e| e.to_string())?;

    Ok(IgnorePattern {
        kind,
        negated,
        parent,
        name,
        source: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, EnumType, Sequence};

    #[test]
    fn test_defaults_hide_internal_tables() {
        let set = IgnoreSet::default();
        assert!(set.is_ignored(ObjectKind::Table, "_relq_migrations", None));
        assert!(set.is_ignored(ObjectKind::Table, "PG_STAT_thing", None));
        assert!(!set.is_ignored(ObjectKind::Table, "users", None));
        assert!(!set.is_ignored(ObjectKind::Enum, "pg_enum_like", None));
    }

    #[test]
    fn test_last_match_wins() {
        let set = IgnoreSet::parse("!_relq_migrations");
        assert!(!set.is_ignored(ObjectKind::Table, "_relq_migrations", None));

        let set = IgnoreSet::parse("!legacy_*\nlegacy_*");
        assert!(set.is_ignored(ObjectKind::Table, "legacy_users", None));
        let set = IgnoreSet::parse("legacy_*\n!legacy_*");
        assert!(!set.is_ignored(ObjectKind::Table, "legacy_users", None));
    }

    #[test]
    fn test_question_mark_and_case() {
        let set = IgnoreSet::parse("ENUM:Mood_?");
        assert!(set.is_ignored(ObjectKind::Enum, "mood_a", None));
        assert!(!set.is_ignored(ObjectKind::Enum, "mood_ab", None));
    }

    #[test]
    fn test_malformed_lines_are_reported() {
        let set = IgnoreSet::parse("# comment\n\nCOLUMN:password\nWIDGET:x\nTABLE:a.b\nusers");
        assert_eq!(set.warnings().len(), 3);
        assert!(set.warnings()[0].contains("need a parent"));
        assert!(set.is_ignored(ObjectKind::Table, "users", None));
    }

    #[test]
    fn test_constraint_patterns_cover_sub_kinds() {
        let set = IgnoreSet::parse("CONSTRAINT:orders.*_fkey");
        assert!(set.is_ignored(ObjectKind::ForeignKey, "orders_user_id_fkey", Some("orders")));
        assert!(!set.is_ignored(ObjectKind::ForeignKey, "orders_pkey", Some("orders")));
        let set = IgnoreSet::parse("CHECK:orders.*");
        assert!(!set.is_ignored(ObjectKind::ForeignKey, "orders_user_id_fkey", Some("orders")));
    }

    #[test]
    fn test_filter_schema_drops_children_and_triggers() {
        let schema = Schema::new()
            .table(
                Table::new("users")
                    .column(Column::new("id", "int"))
                    .column(Column::new("password_hash", "text")),
            )
            .table(Table::new("tmp_import"));
        let set = IgnoreSet::parse("COLUMN:users.password_hash");
        let filtered = set.filter_schema(&schema);
        assert_eq!(filtered.tables.len(), 1);
        assert_eq!(filtered.tables[0].columns.len(), 1);
    }

    #[test]
    fn test_dependency_violations_are_listed() {
        let schema = Schema::new()
            .enum_type(EnumType::new("mood", &["ok"]))
            .sequence(Sequence::new("order_seq"))
            .table(
                Table::new("orders")
                    .column(Column::new("id", "bigint").default("nextval('order_seq'::regclass)"))
                    .column(Column::new("mood", "mood")),
            );
        let set = IgnoreSet::parse("ENUM:mood\nSEQUENCE:order_seq");
        match set.validate_dependencies(&schema) {
            Err(RelqError::DiffDependency { violations }) => {
                assert_eq!(violations.len(), 2);
                assert!(violations[0].contains("orders.id"));
                assert!(violations[1].contains("ignored enum mood"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let set = IgnoreSet::parse("ENUM:mood\nSEQUENCE:order_seq\nCOLUMN:orders.*");
        assert!(set.validate_dependencies(&schema).is_ok());
    }
}
