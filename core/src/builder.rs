//! Render a [`Schema`] as Rust schema-builder calls.
//!
//! Output is a `fn schema() -> Schema` body using the builders in
//! [`crate::schema`]. Objects without a builder (views, functions,
//! triggers and the rest) are listed as comments.

use std::fmt::Write;

use crate::schema::{Column, Constraint, ConstraintKind, FkAction, ForeignKeyRef, Identity, Index, Schema, Table};

fn lit(text: &str) -> String {
    format!("{text:?}")
}

fn list(items: &[String]) -> String {
    let inner: Vec<String> = items.iter().map(|i| format!("{}.into()", lit(i))).collect();
    format!("vec![{}]", inner.join(", "))
}

fn action(action: FkAction) -> &'static str {
    match action {
        FkAction::Cascade => "FkAction::Cascade",
        FkAction::Restrict => "FkAction::Restrict",
        FkAction::SetNull => "FkAction::SetNull",
        FkAction::SetDefault => "FkAction::SetDefault",
        FkAction::NoAction => "FkAction::NoAction",
    }
}

fn reference(fk: &ForeignKeyRef) -> String {
    let column = fk.columns.first().map(String::as_str).unwrap_or("id");
    let mut out = format!("ForeignKeyRef::new({}, {})", lit(&fk.table), lit(column));
    if let Some(schema) = &fk.schema {
        let _ = write!(out, ".in_schema({})", lit(schema));
    }
    if let Some(a) = fk.on_delete {
        let _ = write!(out, ".on_delete({})", action(a));
    }
    if let Some(a) = fk.on_update {
        let _ = write!(out, ".on_update({})", action(a));
    }
    out
}

fn column(col: &Column) -> String {
    let mut out = format!("Column::new({}, {})", lit(&col.name), lit(&col.sql_type()));
    if col.primary_key {
        out.push_str(".primary_key()");
    } else if !col.nullable && col.identity.is_none() {
        out.push_str(".not_null()");
    }
    if col.unique {
        out.push_str(".unique()");
    }
    if let Some(default) = &col.default {
        let _ = write!(out, ".default({})", lit(default));
    }
    if let Some(identity) = col.identity {
        let variant = match identity {
            Identity::Always => "Always",
            Identity::ByDefault => "ByDefault",
        };
        let _ = write!(out, ".identity(Identity::{variant})");
    }
    if let Some(generated) = &col.generated {
        let _ = write!(out, ".generated_stored({})", lit(&generated.expression));
    }
    if let Some(fk) = &col.references {
        let _ = write!(out, ".references({})", reference(fk));
    }
    if let Some(check) = &col.check {
        let _ = write!(out, ".check({})", lit(&check.expression));
    }
    if let Some(comment) = &col.comment {
        let _ = write!(out, ".comment({})", lit(comment));
    }
    if let Some(id) = &col.tracking_id {
        let _ = write!(out, ".id({})", lit(id));
    }
    out
}

fn index(idx: &Index) -> String {
    let mut out = format!("Index::new({}, {})", lit(&idx.name), list(&idx.columns));
    if idx.unique {
        out.push_str(".unique()");
    }
    if let Some(method) = &idx.method {
        let _ = write!(out, ".using({})", lit(method));
    }
    if let Some(predicate) = &idx.where_clause {
        let _ = write!(out, ".filter({})", lit(predicate));
    }
    out
}

fn constraint(c: &Constraint) -> String {
    let name = lit(&c.name);
    match c.kind {
        ConstraintKind::PrimaryKey => format!("Constraint::primary_key({name}, {})", list(&c.columns)),
        ConstraintKind::Unique => format!("Constraint::unique({name}, {})", list(&c.columns)),
        ConstraintKind::ForeignKey => match &c.references {
            Some(fk) => format!(
                "Constraint::foreign_key({name}, {}, {})",
                list(&c.columns),
                reference(fk)
            ),
            None => format!("Constraint::exclude({name}, {})", lit(&c.definition)),
        },
        ConstraintKind::Check => format!(
            "Constraint::check({name}, {})",
            lit(c.expression.as_deref().unwrap_or(&c.definition))
        ),
        ConstraintKind::Exclude => format!("Constraint::exclude({name}, {})", lit(&c.definition)),
    }
}

fn table(out: &mut String, table: &Table) {
    let _ = writeln!(out, "        .table(");
    let _ = writeln!(out, "            Table::new({})", lit(&table.name));
    if let Some(schema) = &table.schema {
        let _ = writeln!(out, "                .in_schema({})", lit(schema));
    }
    for col in &table.columns {
        let _ = writeln!(out, "                .column({})", column(col));
    }
    for idx in &table.indexes {
        let _ = writeln!(out, "                .index({})", index(idx));
    }
    for c in &table.constraints {
        let _ = writeln!(out, "                .constraint({})", constraint(c));
    }
    if let Some(comment) = &table.comment {
        let _ = writeln!(out, "                .comment({})", lit(comment));
    }
    if let Some(id) = &table.tracking_id {
        let _ = writeln!(out, "                .id({})", lit(id));
    }
    let _ = writeln!(out, "        )");
}

/// Rust source building `schema` with the schema builders.
pub fn to_builder_code(schema: &Schema) -> String {
    let mut out = String::new();
    out.push_str("use relq_core::schema::*;\n\n");
    out.push_str("pub fn schema() -> Schema {\n");
    out.push_str("    Schema::new()\n");
    for ext in &schema.extensions {
        let _ = writeln!(out, "        .extension({})", lit(ext));
    }
    for e in &schema.enums {
        let values: Vec<String> = e.values.iter().map(|v| lit(v)).collect();
        let _ = writeln!(out, "        .enum_type(EnumType::new({}, &[{}]))", lit(&e.name), values.join(", "));
    }
    for seq in &schema.sequences {
        let _ = writeln!(out, "        .sequence(Sequence::new({}))", lit(&seq.name));
    }
    for t in &schema.tables {
        table(&mut out, t);
    }
    out.push_str("}\n");

    let skipped: Vec<String> = schema
        .domains
        .iter()
        .map(|d| format!("domain {}", d.name))
        .chain(schema.composite_types.iter().map(|c| format!("type {}", c.name)))
        .chain(schema.views.iter().map(|v| format!("view {}", v.name)))
        .chain(schema.materialized_views.iter().map(|v| format!("materialized view {}", v.name)))
        .chain(schema.functions.iter().map(|f| format!("function {}", f.name)))
        .chain(schema.triggers.iter().map(|t| format!("trigger {} on {}", t.name, t.table)))
        .chain(schema.foreign_tables.iter().map(|f| format!("foreign table {}", f.name)))
        .chain(schema.collations.iter().map(|c| format!("collation {}", c.name)))
        .collect();
    if !skipped.is_empty() {
        out.push_str("\n// Not expressible with builders; keep these in SQL:\n");
        for item in skipped {
            let _ = writeln!(out, "//   {item}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EnumType;

    #[test]
    fn test_builder_code_for_table() {
        let schema = Schema::new().enum_type(EnumType::new("status", &["active", "banned"])).table(
            Table::new("users")
                .column(Column::new("id", "uuid").primary_key().default("gen_random_uuid()"))
                .column(Column::new("email", "varchar(255)").not_null().unique())
                .index(Index::new("idx_users_email", vec!["email".into()]).unique()),
        );
        let code = to_builder_code(&schema);
        assert!(code.contains(r#".enum_type(EnumType::new("status", &["active", "banned"]))"#));
        assert!(code.contains(r#"Table::new("users")"#));
        assert!(code.contains(r#".column(Column::new("id", "uuid").primary_key().default("gen_random_uuid()"))"#));
        assert!(code.contains(r#"Column::new("email", "character varying(255)").not_null().unique()"#));
        assert!(code.contains(r#".index(Index::new("idx_users_email", vec!["email".into()]).unique())"#));
        assert!(code.ends_with("}\n"));
    }

    #[test]
    fn test_builder_lists_unsupported_objects() {
        let mut schema = Schema::new();
        schema.views.push(crate::schema::View {
            name: "active_users".into(),
            definition: "SELECT 1".into(),
            ..Default::default()
        });
        let code = to_builder_code(&schema);
        assert!(code.contains("//   view active_users"));
    }

    #[test]
    fn test_foreign_key_rendering() {
        let fk = ForeignKeyRef::new("users", "id").on_delete(FkAction::Cascade);
        assert_eq!(
            reference(&fk),
            r#"ForeignKeyRef::new("users", "id").on_delete(FkAction::Cascade)"#
        );
    }
}
