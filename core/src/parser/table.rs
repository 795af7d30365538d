//! CREATE TABLE, CREATE INDEX and ALTER TABLE ... ADD CONSTRAINT.
//!
//! Table bodies go through the SQL grammar. The few clauses the grammar
//! does not cover for PostgreSQL (EXCLUDE, MATCH, deferrability, the
//! trailing PARTITION BY) are taken off the element text first and put
//! back onto the result.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{
    ColumnDef, ColumnOption, GeneratedAs, GeneratedExpressionMode, ReferentialAction, Statement,
    TableConstraint,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use super::expr::{from_ast, parse_expression};
use super::scan::{Scanner, starts_with_keywords};
use super::{Pending, Source, line_id};
use crate::emit::ddl::{fkey_name, pkey_name};
use crate::emit::quote::{quote_ident, split_qualified, unquote_ident};
use crate::emit::split::{split_top_level, strip_comments};
use crate::error::Result;
use crate::schema::{
    CheckConstraint, Column, Constraint, FkAction, ForeignKeyRef, Generated, GeneratedKind,
    Identity, Index, MatchType, PartitionChild, PartitionStrategy, Partitioning, Table,
    object_key,
};

static MATCH_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+MATCH\s+(FULL|SIMPLE|PARTIAL)\b").expect("match pattern")
});
static DEFERRABLE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(NOT\s+)?DEFERRABLE\b").expect("deferrable pattern")
});
static INITIALLY_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+INITIALLY\s+(DEFERRED|IMMEDIATE)\b").expect("initially pattern")
});

/// Words that open a table-level constraint without a name.
const CONSTRAINT_WORDS: [&str; 5] = ["PRIMARY", "UNIQUE", "CHECK", "FOREIGN", "EXCLUDE"];

/// Columns and constraints read from a table body (or one ALTER TABLE clause).
#[derive(Debug, Default)]
pub(crate) struct Elements {
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
    /// Columns of an unnamed PRIMARY KEY.
    pub primary_key: Vec<String>,
}

impl Elements {
    /// Merge into `table`, marking key columns NOT NULL.
    pub fn apply_to(self, table: &mut Table) {
        table.columns.extend(self.columns);
        for name in &self.primary_key {
            if let Some(col) = table.find_column_mut(name) {
                col.primary_key = true;
                col.nullable = false;
            }
        }
        for constraint in self
            .constraints
            .iter()
            .filter(|c| c.kind == crate::schema::ConstraintKind::PrimaryKey)
        {
            for name in &constraint.columns {
                if let Some(col) = table.find_column_mut(name) {
                    col.nullable = false;
                }
            }
        }
        table.constraints.extend(self.constraints);
    }
}

/// Foreign-key clauses the grammar does not keep.
#[derive(Debug, Default, Clone, Copy)]
struct FkExtras {
    match_type: Option<MatchType>,
    deferrable: bool,
    initially_deferred: bool,
}

impl FkExtras {
    /// Remove MATCH and deferrability clauses from `element`.
    fn take(element: &str) -> (String, Self) {
        if !element.to_ascii_uppercase().contains("REFERENCES") {
            return (element.to_string(), Self::default());
        }
        let mut extras = Self::default();
        if let Some(caps) = MATCH_CLAUSE.captures(element) {
            extras.match_type = match caps[1].to_ascii_uppercase().as_str() {
                "FULL" => Some(MatchType::Full),
                "PARTIAL" => Some(MatchType::Partial),
                _ => Some(MatchType::Simple),
            };
        }
        if let Some(caps) = DEFERRABLE_CLAUSE.captures(element) {
            extras.deferrable = caps.get(1).is_none();
        }
        if let Some(caps) = INITIALLY_CLAUSE.captures(element) {
            extras.initially_deferred = caps[1].eq_ignore_ascii_case("DEFERRED");
        }
        let text = MATCH_CLAUSE.replace_all(element, "");
        let text = DEFERRABLE_CLAUSE.replace_all(&text, "");
        let text = INITIALLY_CLAUSE.replace_all(&text, "");
        (text.into_owned(), extras)
    }

    fn apply(self, fk: &mut ForeignKeyRef) {
        fk.match_type = self.match_type;
        fk.deferrable = self.deferrable;
        fk.initially_deferred = self.deferrable && self.initially_deferred;
    }
}

/// Schema and table of a REFERENCES target; the default schema stays implicit.
fn reference_target(text: &str) -> (Option<String>, String) {
    let (schema, table) = split_qualified(text);
    (schema.filter(|s| s != "public"), table)
}

fn fk_action(action: &Option<ReferentialAction>) -> Option<FkAction> {
    action.as_ref().and_then(|a| FkAction::from_sql(&a.to_string()))
}

fn ident_names<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(|i| unquote_ident(&i.to_string())).collect()
}

/// `CONSTRAINT name` prefix of an element, if present.
fn constraint_name(element: &str) -> (Option<String>, String) {
    let mut s = Scanner::new(element);
    if s.keyword("CONSTRAINT") {
        if let Some(name) = s.ident() {
            return (Some(name), s.rest());
        }
    }
    (None, element.trim().to_string())
}

/// Read table body elements. `table` names the owner for default constraint names.
pub(crate) fn read_elements(src: &Source<'_>, table: &str, parts: &[String]) -> Result<Elements> {
    let mut out = Elements::default();
    let mut kept = Vec::new();
    let mut column_extras = Vec::new();
    let mut constraint_extras = Vec::new();

    for part in parts {
        let (name, body) = constraint_name(part);
        if starts_with_keywords(&body, &["EXCLUDE"]) {
            out.constraints.push(Constraint::exclude(
                name.unwrap_or_else(|| format!("{table}_excl")),
                body,
            ));
            continue;
        }
        if starts_with_keywords(&body, &["LIKE"]) {
            warn!(table, "LIKE clauses are not supported; skipped: {part}");
            continue;
        }
        let (text, extras) = FkExtras::take(part);
        let is_constraint =
            name.is_some() || CONSTRAINT_WORDS.iter().any(|w| starts_with_keywords(&body, &[w]));
        if is_constraint {
            constraint_extras.push(extras);
        } else {
            column_extras.push(extras);
        }
        kept.push(text);
    }

    if kept.is_empty() {
        return Ok(out);
    }

    let sql = format!("CREATE TABLE {} ({})", quote_ident(table), kept.join(", "));
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, &sql).map_err(|e| src.error(e.to_string()))?;
    let Some(Statement::CreateTable(create)) = statements.into_iter().next() else {
        return Err(src.error("expected a CREATE TABLE statement"));
    };

    for (i, def) in create.columns.iter().enumerate() {
        let extras = column_extras.get(i).copied().unwrap_or_default();
        out.columns.push(read_column(def, extras));
    }

    let mut extras_iter = constraint_extras.into_iter();
    for constraint in &create.constraints {
        let extras = extras_iter.next().unwrap_or_default();
        read_table_constraint(table, constraint, extras, &mut out);
    }
    Ok(out)
}

fn read_column(def: &ColumnDef, extras: FkExtras) -> Column {
    let mut col = Column::new(def.name.value.clone(), &def.data_type.to_string());
    for option in &def.options {
        match &option.option {
            ColumnOption::Null => col.nullable = true,
            ColumnOption::NotNull => col.nullable = false,
            ColumnOption::Default(expr) => {
                let parsed = from_ast(expr);
                col.default = Some(parsed.text);
                col.default_expr = Some(parsed.tree);
            }
            ColumnOption::Unique { is_primary, .. } => {
                if *is_primary {
                    col.primary_key = true;
                    col.nullable = false;
                } else {
                    col.unique = true;
                }
            }
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => {
                let (schema, table) = reference_target(&foreign_table.to_string());
                let mut fk = ForeignKeyRef {
                    table,
                    schema,
                    columns: ident_names(referred_columns),
                    on_delete: fk_action(on_delete),
                    on_update: fk_action(on_update),
                    ..ForeignKeyRef::default()
                };
                extras.apply(&mut fk);
                col.references = Some(fk);
            }
            ColumnOption::Check(expr) => {
                let parsed = from_ast(expr);
                col.check = Some(CheckConstraint {
                    name: option.name.as_ref().map(|n| n.value.clone()),
                    expression: parsed.text,
                    expr: Some(parsed.tree),
                });
            }
            ColumnOption::Generated {
                generated_as,
                generation_expr,
                generation_expr_mode,
                ..
            } => match generation_expr {
                Some(expr) => {
                    let parsed = from_ast(expr);
                    let kind = match generation_expr_mode {
                        Some(GeneratedExpressionMode::Virtual) => GeneratedKind::Virtual,
                        _ => GeneratedKind::Stored,
                    };
                    col.generated = Some(Generated {
                        kind,
                        expression: parsed.text,
                        expr: Some(parsed.tree),
                    });
                }
                None => {
                    col.identity = Some(match generated_as {
                        GeneratedAs::ByDefault => Identity::ByDefault,
                        _ => Identity::Always,
                    });
                    col.nullable = false;
                }
            },
            ColumnOption::Comment(text) => col.comment = Some(text.clone()),
            other => debug!(column = %def.name.value, "ignoring column option {other}"),
        }
    }
    col
}

fn read_table_constraint(
    table: &str,
    constraint: &TableConstraint,
    extras: FkExtras,
    out: &mut Elements,
) {
    let name_of = |name: &Option<sqlparser::ast::Ident>| name.as_ref().map(|n| n.value.clone());
    match constraint {
        TableConstraint::PrimaryKey { name, columns, .. } => {
            let columns = ident_names(columns);
            match name_of(name) {
                Some(name) if name != pkey_name(table) => {
                    out.constraints.push(Constraint::primary_key(name, columns));
                }
                _ => out.primary_key.extend(columns),
            }
        }
        TableConstraint::Unique { name, columns, .. } => {
            let columns = ident_names(columns);
            let name = name_of(name)
                .unwrap_or_else(|| format!("{table}_{}_key", columns.join("_")));
            out.constraints.push(Constraint::unique(name, columns));
        }
        TableConstraint::ForeignKey {
            name,
            columns,
            foreign_table,
            referred_columns,
            on_delete,
            on_update,
            ..
        } => {
            let columns = ident_names(columns);
            let name = name_of(name).unwrap_or_else(|| fkey_name(table, &columns.join("_")));
            let (schema, target) = reference_target(&foreign_table.to_string());
            let mut fk = ForeignKeyRef {
                table: target,
                schema,
                columns: ident_names(referred_columns),
                on_delete: fk_action(on_delete),
                on_update: fk_action(on_update),
                ..ForeignKeyRef::default()
            };
            extras.apply(&mut fk);
            out.constraints.push(Constraint::foreign_key(name, columns, fk));
        }
        TableConstraint::Check { name, expr, .. } => {
            let name = name_of(name).unwrap_or_else(|| format!("{table}_check"));
            out.constraints
                .push(Constraint::check(name, from_ast(expr).text));
        }
        other => warn!(table, "unsupported table constraint skipped: {other}"),
    }
}

/// Tracking IDs written at the end of element lines, by element name.
fn element_ids(src: &Source<'_>) -> HashMap<String, String> {
    let mut ids = HashMap::new();
    let mut seen_code = false;
    for line in src.raw.text.lines() {
        let code = strip_comments(line);
        let code = code.trim();
        if code.is_empty() {
            continue;
        }
        if !seen_code {
            // The CREATE line carries the statement's own annotation.
            seen_code = true;
            continue;
        }
        let Some(id) = line_id(line) else {
            continue;
        };
        let mut s = Scanner::new(code);
        let name = if s.keyword("CONSTRAINT") {
            s.ident()
        } else if CONSTRAINT_WORDS.iter().any(|w| s.peek_keyword(w)) {
            None
        } else {
            s.ident()
        };
        if let Some(name) = name {
            ids.insert(name, id);
        }
    }
    ids
}

/// `CREATE TABLE` in either form: with a body, or `PARTITION OF parent`.
pub(crate) fn read_create_table(
    src: &Source<'_>,
    schema: &mut crate::schema::Schema,
    pending: &mut Pending,
) -> Result<()> {
    let mut s = Scanner::new(&src.code);
    s.keyword("CREATE");
    s.keywords(&["OR", "REPLACE"]);
    for modifier in ["UNLOGGED", "TEMPORARY", "TEMP"] {
        s.keyword(modifier);
    }
    s.keyword("TABLE");
    s.keywords(&["IF", "NOT", "EXISTS"]);
    let (namespace, name) = s
        .qualified_name()
        .ok_or_else(|| src.error("expected a table name after CREATE TABLE"))?;

    if s.keywords(&["PARTITION", "OF"]) {
        let (parent_schema, parent) = s
            .qualified_name()
            .ok_or_else(|| src.error("expected a parent table after PARTITION OF"))?;
        let bound = s.rest();
        pending.children.push((
            src.line,
            src.id.clone(),
            object_key(parent_schema.as_deref(), &parent),
            PartitionChild {
                name,
                bound: bound.split_whitespace().collect::<Vec<_>>().join(" "),
                tracking_id: None,
            },
        ));
        return Ok(());
    }

    let body = s
        .parens()
        .ok_or_else(|| src.error(format!("expected a column list for table {name}")))?;
    let parts = split_top_level(&body, ',');
    let elements = read_elements(src, &name, &parts)?;

    let mut table = Table::new(name);
    table.schema = namespace.filter(|n| n != "public");
    table.tracking_id = src.id.clone();
    elements.apply_to(&mut table);

    if s.keywords(&["PARTITION", "BY"]) {
        let strategy = s.ident().and_then(|w| PartitionStrategy::parse(&w)).ok_or_else(|| {
            src.error("PARTITION BY expects RANGE, LIST or HASH")
        })?;
        let keys = s
            .parens()
            .ok_or_else(|| src.error("PARTITION BY expects a key list"))?;
        table.partition = Some(Partitioning {
            strategy,
            columns: split_top_level(&keys, ',')
                .iter()
                .map(|k| unquote_ident(k))
                .collect(),
            children: Vec::new(),
        });
    }
    if !s.is_done() {
        debug!(table = %table.name, "ignoring table options: {}", s.rest());
    }

    let ids = element_ids(src);
    for col in &mut table.columns {
        col.tracking_id = ids.get(&col.name).cloned();
    }
    for constraint in &mut table.constraints {
        constraint.tracking_id = ids.get(&constraint.name).cloned();
    }

    schema.tables.push(table);
    Ok(())
}

/// `ALTER TABLE t ADD [CONSTRAINT n] ...`. Other ALTER TABLE forms are not
/// schema source and are reported as skipped.
pub(crate) fn read_alter_table(src: &Source<'_>, pending: &mut Pending) -> Result<bool> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["ALTER", "TABLE"]);
    s.keywords(&["IF", "EXISTS"]);
    s.keyword("ONLY");
    let Some((namespace, table)) = s.qualified_name() else {
        return Ok(false);
    };
    if !s.keyword("ADD") {
        return Ok(false);
    }
    let clause = s.rest();
    let (name, body) = constraint_name(&clause);
    let is_constraint =
        name.is_some() || CONSTRAINT_WORDS.iter().any(|w| starts_with_keywords(&body, &[w]));
    if !is_constraint {
        return Ok(false);
    }
    let mut elements = read_elements(src, &table, &[clause])?;
    for constraint in &mut elements.constraints {
        constraint.tracking_id = src.id.clone();
    }
    pending
        .constraints
        .push((src.line, object_key(namespace.as_deref(), &table), elements));
    Ok(true)
}

/// Split an index key into the key text and an optional operator class.
fn split_opclass(key: &str) -> (String, Option<String>) {
    let words: Vec<&str> = key.split_whitespace().collect();
    match words.iter().position(|w| w.to_ascii_lowercase().ends_with("_ops")) {
        Some(at) if at > 0 => {
            let opclass = words[at].to_string();
            let rest: Vec<&str> = words
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != at)
                .map(|(_, w)| *w)
                .collect();
            (rest.join(" "), Some(opclass))
        }
        _ => (key.to_string(), None),
    }
}

/// Canonical key text: a plain column loses its quotes, ordering words are uppercased.
fn normalize_key(key: &str) -> String {
    let mut s = Scanner::new(key);
    let Some(head) = s.ident() else {
        return key.trim().to_string();
    };
    let tail = s.rest();
    let ordering = tail.split_whitespace().all(|w| {
        matches!(
            w.to_ascii_uppercase().as_str(),
            "ASC" | "DESC" | "NULLS" | "FIRST" | "LAST"
        )
    });
    if !ordering {
        return key.trim().to_string();
    }
    if tail.is_empty() {
        head
    } else {
        format!("{head} {}", tail.to_ascii_uppercase())
    }
}

/// `CREATE [UNIQUE] INDEX [CONCURRENTLY] [IF NOT EXISTS] name ON table ...`.
pub(crate) fn read_create_index(src: &Source<'_>, pending: &mut Pending) -> Result<()> {
    let mut s = Scanner::new(&src.code);
    s.keyword("CREATE");
    let unique = s.keyword("UNIQUE");
    s.keyword("INDEX");
    s.keyword("CONCURRENTLY");
    s.keywords(&["IF", "NOT", "EXISTS"]);
    let name = if s.peek_keyword("ON") {
        None
    } else {
        s.qualified_name().map(|(_, n)| n)
    };
    if !s.keyword("ON") {
        return Err(src.error("expected ON <table> in CREATE INDEX"));
    }
    s.keyword("ONLY");
    let (namespace, table) = s
        .qualified_name()
        .ok_or_else(|| src.error("expected a table name in CREATE INDEX"))?;
    let method = if s.keyword("USING") { s.ident() } else { None };
    let keys = s
        .parens()
        .ok_or_else(|| src.error("expected an index key list"))?;

    let mut columns = Vec::new();
    let mut index = Index::default();
    for key in split_top_level(&keys, ',') {
        let (key, opclass) = split_opclass(&key);
        let key = normalize_key(&key);
        if let Some(opclass) = opclass {
            index.opclasses.insert(key.clone(), opclass);
        }
        columns.push(key);
    }

    loop {
        if s.keyword("INCLUDE") {
            let include = s
                .parens()
                .ok_or_else(|| src.error("expected a column list after INCLUDE"))?;
            index.include = split_top_level(&include, ',')
                .iter()
                .map(|c| unquote_ident(c))
                .collect();
        } else if s.keyword("WHERE") {
            let parsed = parse_expression(&s.rest());
            index.where_clause = Some(parsed.text);
            index.where_expr = Some(parsed.tree);
        } else if s.keyword("WITH") {
            s.parens();
        } else if s.keyword("NULLS") {
            s.keyword("NOT");
            s.keyword("DISTINCT");
        } else if s.keyword("TABLESPACE") {
            s.ident();
        } else {
            break;
        }
    }
    if !s.is_done() {
        return Err(src.error(format!(
            "unexpected text in CREATE INDEX near '{}'",
            s.remaining_preview()
        )));
    }

    index.name = name.unwrap_or_else(|| {
        let keys: Vec<String> = columns.iter().map(|c| c.replace(' ', "_")).collect();
        format!("{table}_{}_idx", keys.join("_"))
    });
    index.columns = columns;
    index.unique = unique;
    index.method = method.filter(|m| m != "btree");
    let key = object_key(namespace.as_deref(), &table);
    pending.indexes.push((src.line, src.id.clone(), key, index));
    Ok(())
}
