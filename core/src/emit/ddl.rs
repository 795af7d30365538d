//! DDL statement builders for every object kind.
//!
//! Each builder returns one complete statement terminated by `;`. The
//! migration emitter and the schema renderer both go through these, so a
//! CREATE written to a migration is the same text `pull` writes to the
//! schema file.

use super::quote::{qualified, quote_ident, quote_idents, quote_index_key, quote_literal};
use super::split::split_top_level;
use crate::schema::{
    Collation, Column, CompositeType, Constraint, ConstraintKind, Domain, EnumType, ForeignKeyRef,
    ForeignTable, Function, GeneratedKind, Identity, Index, PartitionChild, Sequence, Table,
    Trigger, View,
};
use crate::types::{render_type, storage_type};

const INDENT: &str = "    ";

/// `MATCH`, `ON DELETE`, `ON UPDATE` and deferrability after a REFERENCES clause.
pub fn fk_tail(fk: &ForeignKeyRef) -> String {
    let mut sql = String::new();
    if let Some(m) = fk.match_type {
        sql.push_str(&format!(" MATCH {}", m.sql()));
    }
    if let Some(action) = fk.on_delete {
        sql.push_str(&format!(" ON DELETE {}", action.sql()));
    }
    if let Some(action) = fk.on_update {
        sql.push_str(&format!(" ON UPDATE {}", action.sql()));
    }
    if fk.deferrable {
        sql.push_str(" DEFERRABLE");
        if fk.initially_deferred {
            sql.push_str(" INITIALLY DEFERRED");
        }
    }
    sql
}

fn references_clause(fk: &ForeignKeyRef) -> String {
    let mut sql = format!("REFERENCES {}", qualified(fk.schema.as_deref(), &fk.table));
    if !fk.columns.is_empty() {
        sql.push_str(&format!(" ({})", quote_idents(&fk.columns)));
    }
    sql.push_str(&fk_tail(fk));
    sql
}

/// Column spec as used in CREATE TABLE and ADD COLUMN.
pub fn column_definition(col: &Column, inline_pk: bool) -> String {
    let mut sql = format!("{} {}", quote_ident(&col.name), col.sql_type());

    if let Some(generated) = &col.generated {
        let kind = match generated.kind {
            GeneratedKind::Stored => "STORED",
            GeneratedKind::Virtual => "VIRTUAL",
        };
        sql.push_str(&format!(" GENERATED ALWAYS AS ({}) {}", generated.expression, kind));
    }
    if let Some(identity) = col.identity {
        sql.push(' ');
        sql.push_str(identity.sql());
    }
    let pk_here = inline_pk && col.primary_key;
    if !col.nullable && !pk_here {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        if col.generated.is_none() && col.identity.is_none() {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
    }
    if pk_here {
        sql.push_str(" PRIMARY KEY");
    }
    if col.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(fk) = &col.references {
        sql.push(' ');
        sql.push_str(&references_clause(fk));
    }
    if let Some(check) = &col.check {
        if let Some(name) = &check.name {
            sql.push_str(&format!(" CONSTRAINT {}", quote_ident(name)));
        }
        sql.push_str(&format!(" CHECK ({})", check.expression));
    }
    sql
}

/// Normalize empty-array defaults to a typed literal: `'{}'::<type>`.
pub fn normalize_array_default(col: &Column) -> Option<String> {
    let default = col.default.as_deref()?;
    if !col.is_array() {
        return Some(default.to_string());
    }
    let compact = default.trim().to_lowercase().replace(' ', "");
    let empty = compact == "'{}'"
        || compact == "'[]'"
        || compact.starts_with("'{}'::")
        || compact.starts_with("'[]'::");
    if empty {
        Some(format!("'{{}}'::{}", col.sql_type()))
    } else {
        Some(default.to_string())
    }
}

fn table_name(table: &Table) -> String {
    qualified(table.schema.as_deref(), &table.name)
}

/// True if the PRIMARY KEY is written on the column itself.
fn uses_inline_pk(table: &Table) -> bool {
    let flagged = table.columns.iter().filter(|c| c.primary_key).count();
    flagged == 1
        && !table
            .constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::PrimaryKey)
}

/// CREATE TABLE with columns and every non-FK table constraint.
///
/// Table-level foreign keys are left out; see [`table_foreign_keys`].
pub fn create_table(table: &Table) -> String {
    create_table_annotated(table, false)
}

/// [`create_table`], optionally ending each column and constraint line
/// with its `-- @id` annotation.
pub fn create_table_annotated(table: &Table, with_ids: bool) -> String {
    let inline_pk = uses_inline_pk(table);
    let mut lines: Vec<(String, Option<&str>)> = table
        .columns
        .iter()
        .map(|c| (column_definition(c, inline_pk), c.tracking_id.as_deref()))
        .collect();

    let flagged: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect();
    if !inline_pk && flagged.len() > 1 {
        lines.push((format!("PRIMARY KEY ({})", quote_idents(&flagged)), None));
    }

    for constraint in table
        .constraints
        .iter()
        .filter(|c| c.kind != ConstraintKind::ForeignKey)
    {
        lines.push((constraint_clause(constraint), constraint.tracking_id.as_deref()));
    }

    let last = lines.len().saturating_sub(1);
    let body = lines
        .iter()
        .enumerate()
        .map(|(i, (line, id))| {
            let mut text = format!("{INDENT}{line}");
            if i != last {
                text.push(',');
            }
            if let (true, Some(id)) = (with_ids, id) {
                text.push_str(&format!(" -- @id {id}"));
            }
            text
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut sql = format!("CREATE TABLE {} (\n{}\n)", table_name(table), body);
    if let Some(partition) = &table.partition {
        sql.push_str(&format!(
            " PARTITION BY {} ({})",
            partition.strategy.sql(),
            quote_idents(&partition.columns)
        ));
    }
    sql.push(';');
    sql
}

/// Table-level FOREIGN KEY constraints, emitted after all tables exist.
pub fn table_foreign_keys(table: &Table) -> impl Iterator<Item = &Constraint> {
    table
        .constraints
        .iter()
        .filter(|c| c.kind == ConstraintKind::ForeignKey)
}

fn constraint_clause(constraint: &Constraint) -> String {
    format!(
        "CONSTRAINT {} {}",
        quote_ident(&constraint.name),
        constraint_body(constraint)
    )
}

fn constraint_body(constraint: &Constraint) -> String {
    let body = constraint.render_definition();
    if body.trim().is_empty() {
        constraint.definition.clone()
    } else {
        body
    }
}

pub fn drop_table(table: &Table) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE;", table_name(table))
}

pub fn rename_table(schema: Option<&str>, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {};",
        qualified(schema, from),
        quote_ident(to)
    )
}

pub fn add_column(table: &Table, col: &Column) -> String {
    let mut col = col.clone();
    col.default = normalize_array_default(&col);
    format!(
        "ALTER TABLE {} ADD COLUMN {};",
        table_name(table),
        column_definition(&col, true)
    )
}

pub fn drop_column(table: &Table, name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
        table_name(table),
        quote_ident(name)
    )
}

pub fn rename_column(table: &Table, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {};",
        table_name(table),
        quote_ident(from),
        quote_ident(to)
    )
}

fn alter_column(table: &Table, column: &str, action: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} {};",
        table_name(table),
        quote_ident(column),
        action
    )
}

/// `ALTER COLUMN ... TYPE`; serial pseudo-types are written as their storage type.
pub fn alter_column_type(table: &Table, col: &Column) -> String {
    let sql_type = render_type(&storage_type(&col.data_type), &col.params);
    alter_column(
        table,
        &col.name,
        &format!(
            "TYPE {} USING {}::{}",
            sql_type,
            quote_ident(&col.name),
            sql_type
        ),
    )
}

pub fn alter_column_nullability(table: &Table, column: &str, nullable: bool) -> String {
    alter_column(
        table,
        column,
        if nullable { "DROP NOT NULL" } else { "SET NOT NULL" },
    )
}

pub fn alter_column_default(table: &Table, column: &str, default: Option<&str>) -> String {
    match default {
        Some(value) => alter_column(table, column, &format!("SET DEFAULT {value}")),
        None => alter_column(table, column, "DROP DEFAULT"),
    }
}

/// Move a column between identity kinds, or add/remove identity.
pub fn alter_column_identity(
    table: &Table,
    column: &str,
    from: Option<Identity>,
    to: Option<Identity>,
) -> Option<String> {
    let action = match (from, to) {
        (None, Some(id)) => format!("ADD {}", id.sql()),
        (Some(_), None) => "DROP IDENTITY IF EXISTS".to_string(),
        (Some(a), Some(b)) if a != b => match b {
            Identity::Always => "SET GENERATED ALWAYS".to_string(),
            Identity::ByDefault => "SET GENERATED BY DEFAULT".to_string(),
        },
        _ => return None,
    };
    Some(alter_column(table, column, &action))
}

pub fn drop_column_expression(table: &Table, column: &str) -> String {
    alter_column(table, column, "DROP EXPRESSION IF EXISTS")
}

pub fn add_primary_key(table: &Table, columns: &[String]) -> String {
    format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({});",
        table_name(table),
        quote_idents(columns)
    )
}

pub fn add_constraint(table: &Table, constraint: &Constraint) -> String {
    format!(
        "ALTER TABLE {} ADD {};",
        table_name(table),
        constraint_clause(constraint)
    )
}

pub fn drop_constraint(table: &Table, name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
        table_name(table),
        quote_ident(name)
    )
}

pub fn rename_constraint(table: &Table, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME CONSTRAINT {} TO {};",
        table_name(table),
        quote_ident(from),
        quote_ident(to)
    )
}

/// Default PostgreSQL name of a table's primary key.
pub fn pkey_name(table: &str) -> String {
    format!("{table}_pkey")
}

/// Default PostgreSQL name of a single-column UNIQUE constraint.
pub fn unique_key_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_key")
}

/// Default PostgreSQL name of a column FOREIGN KEY.
pub fn fkey_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_fkey")
}

/// Default PostgreSQL name of a column CHECK.
pub fn check_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_check")
}

pub fn create_index(table: &Table, index: &Index) -> String {
    let keys = index
        .columns
        .iter()
        .map(|c| match index.opclasses.get(c) {
            Some(opclass) => format!("{} {}", quote_index_key(c), opclass),
            None => quote_index_key(c),
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {}",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        table_name(table)
    );
    let method = index.method_or_default();
    if method != "btree" {
        sql.push_str(&format!(" USING {method}"));
    }
    sql.push_str(&format!(" ({keys})"));
    if !index.include.is_empty() {
        sql.push_str(&format!(" INCLUDE ({})", quote_idents(&index.include)));
    }
    if let Some(predicate) = &index.where_clause {
        sql.push_str(&format!(" WHERE {predicate}"));
    }
    sql.push(';');
    sql
}

pub fn drop_index(table: &Table, name: &str) -> String {
    format!(
        "DROP INDEX IF EXISTS {};",
        qualified(table.schema.as_deref(), name)
    )
}

pub fn rename_index(table: &Table, from: &str, to: &str) -> String {
    format!(
        "ALTER INDEX {} RENAME TO {};",
        qualified(table.schema.as_deref(), from),
        quote_ident(to)
    )
}

/// `ALTER <keyword> <name> RENAME TO <new>` for kinds with no extra context.
pub fn rename_object(keyword: &str, schema: Option<&str>, from: &str, to: &str) -> String {
    format!(
        "ALTER {} {} RENAME TO {};",
        keyword,
        qualified(schema, from),
        quote_ident(to)
    )
}

pub fn comment_on(target: &str, text: Option<&str>) -> String {
    match text {
        Some(t) => format!("COMMENT ON {target} IS {};", quote_literal(t)),
        None => format!("COMMENT ON {target} IS NULL;"),
    }
}

pub fn comment_on_table(table: &Table, text: Option<&str>) -> String {
    comment_on(&format!("TABLE {}", table_name(table)), text)
}

pub fn comment_on_column(table: &Table, column: &str, text: Option<&str>) -> String {
    comment_on(
        &format!("COLUMN {}.{}", table_name(table), quote_ident(column)),
        text,
    )
}

pub fn comment_on_index(table: &Table, index: &str, text: Option<&str>) -> String {
    comment_on(
        &format!("INDEX {}", qualified(table.schema.as_deref(), index)),
        text,
    )
}

pub fn create_partition_child(parent: &Table, child: &PartitionChild) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} PARTITION OF {} {};",
        qualified(parent.schema.as_deref(), &child.name),
        table_name(parent),
        child.bound
    )
}

pub fn drop_partition_child(parent: &Table, child: &PartitionChild) -> String {
    format!(
        "DROP TABLE IF EXISTS {};",
        qualified(parent.schema.as_deref(), &child.name)
    )
}

pub fn create_enum(e: &EnumType) -> String {
    let values = e
        .values
        .iter()
        .map(|v| quote_literal(v))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TYPE {} AS ENUM ({});",
        qualified(e.schema.as_deref(), &e.name),
        values
    )
}

pub fn drop_type(schema: Option<&str>, name: &str) -> String {
    format!("DROP TYPE IF EXISTS {};", qualified(schema, name))
}

pub fn rename_type(schema: Option<&str>, from: &str, to: &str) -> String {
    format!(
        "ALTER TYPE {} RENAME TO {};",
        qualified(schema, from),
        quote_ident(to)
    )
}

/// `ALTER TYPE ... ADD VALUE IF NOT EXISTS`, positioned when not appended.
pub fn add_enum_value(e: &EnumType, value: &str, position: Option<EnumPosition<'_>>) -> String {
    let mut sql = format!(
        "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}",
        qualified(e.schema.as_deref(), &e.name),
        quote_literal(value)
    );
    match position {
        Some(EnumPosition::After(v)) => sql.push_str(&format!(" AFTER {}", quote_literal(v))),
        Some(EnumPosition::Before(v)) => sql.push_str(&format!(" BEFORE {}", quote_literal(v))),
        None => {}
    }
    sql.push(';');
    sql
}

/// Where a new enum label goes relative to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumPosition<'a> {
    After(&'a str),
    Before(&'a str),
}

pub fn create_domain(d: &Domain) -> String {
    let mut sql = format!(
        "CREATE DOMAIN {} AS {}",
        qualified(d.schema.as_deref(), &d.name),
        d.base_type
    );
    if let Some(default) = &d.default {
        sql.push_str(&format!(" DEFAULT {default}"));
    }
    if d.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(check) = &d.check {
        sql.push_str(&format!(" CHECK ({check})"));
    }
    sql.push(';');
    sql
}

pub fn drop_domain(d: &Domain) -> String {
    format!(
        "DROP DOMAIN IF EXISTS {};",
        qualified(d.schema.as_deref(), &d.name)
    )
}

pub fn alter_domain(d: &Domain, action: &str) -> String {
    format!(
        "ALTER DOMAIN {} {};",
        qualified(d.schema.as_deref(), &d.name),
        action
    )
}

/// `ALTER TYPE ... ADD|DROP|ALTER ATTRIBUTE` on a composite type.
pub fn alter_composite(c: &CompositeType, action: &str) -> String {
    format!(
        "ALTER TYPE {} {};",
        qualified(c.schema.as_deref(), &c.name),
        action
    )
}

pub fn create_composite(c: &CompositeType) -> String {
    let attrs = c
        .attributes
        .iter()
        .map(|a| format!("{} {}", quote_ident(&a.name), a.data_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TYPE {} AS ({});",
        qualified(c.schema.as_deref(), &c.name),
        attrs
    )
}

fn sequence_options(s: &Sequence) -> String {
    let mut sql = String::new();
    if let Some(t) = &s.data_type {
        sql.push_str(&format!(" AS {t}"));
    }
    if let Some(v) = s.increment {
        sql.push_str(&format!(" INCREMENT BY {v}"));
    }
    if let Some(v) = s.min_value {
        sql.push_str(&format!(" MINVALUE {v}"));
    }
    if let Some(v) = s.max_value {
        sql.push_str(&format!(" MAXVALUE {v}"));
    }
    if let Some(v) = s.start {
        sql.push_str(&format!(" START WITH {v}"));
    }
    if let Some(v) = s.cache {
        sql.push_str(&format!(" CACHE {v}"));
    }
    if s.cycle {
        sql.push_str(" CYCLE");
    }
    sql
}

/// CREATE SEQUENCE without OWNED BY (the owning table may not exist yet).
pub fn create_sequence(s: &Sequence) -> String {
    format!(
        "CREATE SEQUENCE IF NOT EXISTS {}{};",
        qualified(s.schema.as_deref(), &s.name),
        sequence_options(s)
    )
}

/// `ALTER SEQUENCE ... <options>` restating every option of `after`.
pub fn alter_sequence(after: &Sequence) -> String {
    let mut options = sequence_options(after);
    if !after.cycle {
        options.push_str(" NO CYCLE");
    }
    format!(
        "ALTER SEQUENCE {}{};",
        qualified(after.schema.as_deref(), &after.name),
        options
    )
}

pub fn sequence_owned_by(s: &Sequence) -> String {
    let owner = match &s.owned_by {
        Some(o) => format!("{}.{}", quote_ident(&o.table), quote_ident(&o.column)),
        None => "NONE".to_string(),
    };
    format!(
        "ALTER SEQUENCE {} OWNED BY {};",
        qualified(s.schema.as_deref(), &s.name),
        owner
    )
}

pub fn drop_sequence(s: &Sequence) -> String {
    format!(
        "DROP SEQUENCE IF EXISTS {};",
        qualified(s.schema.as_deref(), &s.name)
    )
}

pub fn rename_sequence(schema: Option<&str>, from: &str, to: &str) -> String {
    format!(
        "ALTER SEQUENCE {} RENAME TO {};",
        qualified(schema, from),
        quote_ident(to)
    )
}

/// Pick a dollar-quote tag that does not occur in `body`.
fn dollar_tag_for(body: &str) -> String {
    let mut tag = "$fn$".to_string();
    let mut n = 0;
    while body.contains(&tag) {
        n += 1;
        tag = format!("$fn{n}$");
    }
    tag
}

pub fn create_function(f: &Function) -> String {
    let tag = dollar_tag_for(&f.body);
    let keyword = if f.is_procedure { "PROCEDURE" } else { "FUNCTION" };
    let mut sql = format!(
        "CREATE OR REPLACE {} {}({})",
        keyword,
        qualified(f.schema.as_deref(), &f.name),
        f.arguments
    );
    if !f.is_procedure && !f.returns.is_empty() {
        sql.push_str(&format!(" RETURNS {}", f.returns));
    }
    sql.push_str(&format!("\nLANGUAGE {}", f.language));
    if let Some(v) = f.volatility {
        sql.push_str(&format!(" {}", v.sql()));
    }
    if f.security_definer {
        sql.push_str(" SECURITY DEFINER");
    }
    sql.push_str(&format!("\nAS {tag}{}{tag};", f.body));
    sql
}

/// Argument list usable in DROP FUNCTION: defaults removed.
fn signature_arguments(arguments: &str) -> String {
    split_top_level(arguments, ',')
        .iter()
        .map(|arg| {
            let upper = arg.to_ascii_uppercase();
            let cut = upper
                .find(" DEFAULT ")
                .or_else(|| arg.find('='))
                .unwrap_or(arg.len());
            arg[..cut].trim().to_string()
        })
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn drop_function(f: &Function) -> String {
    let keyword = if f.is_procedure { "PROCEDURE" } else { "FUNCTION" };
    format!(
        "DROP {} IF EXISTS {}({}) CASCADE;",
        keyword,
        qualified(f.schema.as_deref(), &f.name),
        signature_arguments(&f.arguments)
    )
}

pub fn rename_function(f: &Function, from: &str) -> String {
    let keyword = if f.is_procedure { "PROCEDURE" } else { "FUNCTION" };
    format!(
        "ALTER {} {}({}) RENAME TO {};",
        keyword,
        qualified(f.schema.as_deref(), from),
        signature_arguments(&f.arguments),
        quote_ident(&f.name)
    )
}

fn trigger_table(t: &Trigger) -> String {
    qualified(t.table_schema.as_deref(), &t.table)
}

pub fn create_trigger(t: &Trigger) -> String {
    let mut sql = format!(
        "CREATE TRIGGER {} {} {} ON {} FOR EACH {}",
        quote_ident(&t.name),
        t.timing.sql(),
        t.events.join(" OR "),
        trigger_table(t),
        if t.for_each_row { "ROW" } else { "STATEMENT" }
    );
    if let Some(when) = &t.when {
        sql.push_str(&format!(" WHEN ({when})"));
    }
    sql.push_str(&format!(" EXECUTE FUNCTION {};", t.function));
    sql
}

pub fn drop_trigger(t: &Trigger) -> String {
    format!(
        "DROP TRIGGER IF EXISTS {} ON {};",
        quote_ident(&t.name),
        trigger_table(t)
    )
}

pub fn rename_trigger(t: &Trigger, from: &str) -> String {
    format!(
        "ALTER TRIGGER {} ON {} RENAME TO {};",
        quote_ident(from),
        trigger_table(t),
        quote_ident(&t.name)
    )
}

pub fn create_view(v: &View) -> String {
    let name = qualified(v.schema.as_deref(), &v.name);
    let definition = v.definition.trim().trim_end_matches(';');
    if v.materialized {
        format!("CREATE MATERIALIZED VIEW IF NOT EXISTS {name} AS {definition};")
    } else {
        format!("CREATE OR REPLACE VIEW {name} AS {definition};")
    }
}

pub fn drop_view(v: &View) -> String {
    format!(
        "DROP {}VIEW IF EXISTS {} CASCADE;",
        if v.materialized { "MATERIALIZED " } else { "" },
        qualified(v.schema.as_deref(), &v.name)
    )
}

pub fn rename_view(v: &View, from: &str) -> String {
    format!(
        "ALTER {}VIEW {} RENAME TO {};",
        if v.materialized { "MATERIALIZED " } else { "" },
        qualified(v.schema.as_deref(), from),
        quote_ident(&v.name)
    )
}

pub fn create_foreign_table(t: &ForeignTable) -> String {
    let columns = t
        .columns
        .iter()
        .map(|c| format!("{INDENT}{}", column_definition(c, false)))
        .collect::<Vec<_>>()
        .join(",\n");
    let mut sql = format!(
        "CREATE FOREIGN TABLE IF NOT EXISTS {} (\n{}\n) SERVER {}",
        qualified(t.schema.as_deref(), &t.name),
        columns,
        quote_ident(&t.server)
    );
    if !t.options.is_empty() {
        let options = t
            .options
            .iter()
            .map(|(k, v)| format!("{k} {}", quote_literal(v)))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" OPTIONS ({options})"));
    }
    sql.push(';');
    sql
}

pub fn drop_foreign_table(t: &ForeignTable) -> String {
    format!(
        "DROP FOREIGN TABLE IF EXISTS {} CASCADE;",
        qualified(t.schema.as_deref(), &t.name)
    )
}

pub fn create_collation(c: &Collation) -> String {
    let mut options = Vec::new();
    if let Some(p) = &c.provider {
        options.push(format!("provider = {p}"));
    }
    if let Some(l) = &c.locale {
        options.push(format!("locale = {}", quote_literal(l)));
    }
    if !c.deterministic {
        options.push("deterministic = false".to_string());
    }
    format!(
        "CREATE COLLATION IF NOT EXISTS {} ({});",
        qualified(c.schema.as_deref(), &c.name),
        options.join(", ")
    )
}

pub fn drop_collation(c: &Collation) -> String {
    format!(
        "DROP COLLATION IF EXISTS {};",
        qualified(c.schema.as_deref(), &c.name)
    )
}

pub fn create_extension(name: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS {};", quote_ident(name))
}

pub fn drop_extension(name: &str) -> String {
    format!("DROP EXTENSION IF EXISTS {};", quote_ident(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FkAction, PartitionStrategy};

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "uuid").primary_key().default("gen_random_uuid()"))
            .column(Column::new("email", "varchar(255)").not_null().unique())
            .column(
                Column::new("org_id", "uuid")
                    .references(ForeignKeyRef::new("orgs", "id").on_delete(FkAction::Cascade)),
            )
            .constraint(Constraint::check("users_email_check", "email <> ''"))
    }

    #[test]
    fn test_create_table_layout() {
        let sql = create_table(&users());
        assert_eq!(
            sql,
            "CREATE TABLE \"users\" (\n    \"id\" uuid DEFAULT gen_random_uuid() PRIMARY KEY,\n    \"email\" character varying(255) NOT NULL UNIQUE,\n    \"org_id\" uuid REFERENCES \"orgs\" (\"id\") ON DELETE CASCADE,\n    CONSTRAINT \"users_email_check\" CHECK (email <> '')\n);"
        );
    }

    #[test]
    fn test_create_table_composite_pk_and_partition() {
        let table = Table::new("events")
            .column(Column::new("id", "bigint").primary_key())
            .column(Column::new("at", "timestamptz").primary_key())
            .partition_by(PartitionStrategy::Range, vec!["at".into()]);
        let sql = create_table(&table);
        assert!(sql.contains("    PRIMARY KEY (\"id\", \"at\")\n"));
        assert!(sql.ends_with(") PARTITION BY RANGE (\"at\");"));
        assert!(sql.contains("\"id\" bigint NOT NULL,"));
    }

    #[test]
    fn test_foreign_keys_are_not_inlined() {
        let table = Table::new("posts")
            .column(Column::new("author_id", "uuid"))
            .constraint(Constraint::foreign_key(
                "posts_author_fk",
                vec!["author_id".into()],
                ForeignKeyRef::new("users", "id"),
            ));
        assert!(!create_table(&table).contains("FOREIGN KEY"));
        assert_eq!(table_foreign_keys(&table).count(), 1);
        assert_eq!(
            add_constraint(&table, &table.constraints[0]),
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_author_fk\" FOREIGN KEY (\"author_id\") REFERENCES \"users\" (\"id\");"
        );
    }

    #[test]
    fn test_add_column_normalizes_empty_array_default() {
        let table = Table::new("posts");
        let col = Column::new("tags", "text[]").not_null().default("'[]'::jsonb");
        assert_eq!(
            add_column(&table, &col),
            "ALTER TABLE \"posts\" ADD COLUMN \"tags\" text[] NOT NULL DEFAULT '{}'::text[];"
        );
    }

    #[test]
    fn test_identity_column_skips_default() {
        let col = Column::new("id", "bigint").identity(Identity::Always);
        assert_eq!(
            column_definition(&col, true),
            "\"id\" bigint GENERATED ALWAYS AS IDENTITY NOT NULL"
        );
    }

    #[test]
    fn test_enum_value_positions() {
        let e = EnumType::new("status", &["a", "b"]);
        assert_eq!(
            add_enum_value(&e, "c", None),
            "ALTER TYPE \"status\" ADD VALUE IF NOT EXISTS 'c';"
        );
        assert_eq!(
            add_enum_value(&e, "a2", Some(EnumPosition::After("a"))),
            "ALTER TYPE \"status\" ADD VALUE IF NOT EXISTS 'a2' AFTER 'a';"
        );
    }

    #[test]
    fn test_function_tag_avoids_body() {
        let f = Function {
            name: "f".into(),
            returns: "int".into(),
            language: "sql".into(),
            body: " SELECT '$fn$'::text::int ".into(),
            ..Function::default()
        };
        let sql = create_function(&f);
        assert!(sql.contains("AS $fn1$ SELECT"));
        assert!(sql.ends_with("$fn1$;"));
    }

    #[test]
    fn test_drop_function_strips_defaults() {
        let f = Function {
            name: "add".into(),
            arguments: "a integer, b integer DEFAULT 1".into(),
            returns: "integer".into(),
            language: "sql".into(),
            body: "SELECT a + b".into(),
            ..Function::default()
        };
        assert_eq!(
            drop_function(&f),
            "DROP FUNCTION IF EXISTS \"add\"(a integer, b integer) CASCADE;"
        );
    }

    #[test]
    fn test_alter_serial_type_uses_storage_type() {
        let table = Table::new("t");
        assert_eq!(
            alter_column_type(&table, &Column::new("id", "bigserial")),
            "ALTER TABLE \"t\" ALTER COLUMN \"id\" TYPE bigint USING \"id\"::bigint;"
        );
    }

    #[test]
    fn test_identity_transitions() {
        let table = Table::new("t");
        assert_eq!(
            alter_column_identity(&table, "id", None, Some(Identity::ByDefault)).as_deref(),
            Some("ALTER TABLE \"t\" ALTER COLUMN \"id\" ADD GENERATED BY DEFAULT AS IDENTITY;")
        );
        assert!(alter_column_identity(&table, "id", Some(Identity::Always), Some(Identity::Always)).is_none());
    }

    #[test]
    fn test_index_statement() {
        let table = Table::new("users");
        let index = Index::new("users_lower_email_idx", vec!["lower(email)".into()])
            .unique()
            .filter("deleted_at IS NULL");
        assert_eq!(
            create_index(&table, &index),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"users_lower_email_idx\" ON \"users\" (lower(email)) WHERE deleted_at IS NULL;"
        );
        let gin = Index::new("posts_tags_idx", vec!["tags".into()]).using("gin");
        assert!(create_index(&table, &gin).contains("USING gin (\"tags\")"));
    }

    #[test]
    fn test_trigger_on_table_in_other_schema() {
        let trigger = Trigger {
            name: "events_audit".into(),
            table: "events".into(),
            table_schema: Some("audit".into()),
            timing: crate::schema::TriggerTiming::After,
            events: vec!["INSERT".into()],
            for_each_row: true,
            function: "log_event()".into(),
            when: None,
            tracking_id: None,
        };
        assert!(create_trigger(&trigger).contains(" ON \"audit\".\"events\" FOR EACH ROW"));
        assert_eq!(
            drop_trigger(&trigger),
            "DROP TRIGGER IF EXISTS \"events_audit\" ON \"audit\".\"events\";"
        );
    }
}
