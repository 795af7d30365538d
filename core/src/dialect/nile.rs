//! Nile tenant classification.
//!
//! Nile shards tenant data by a `tenant_id` column. A table with such a
//! column is tenant-scoped; every other table is shared across tenants.

use serde::Serialize;

use super::{Category, Finding, Severity};
use crate::schema::{ConstraintKind, Schema, Table};

pub const TENANT_COLUMN: &str = "tenant_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableScope {
    Tenant,
    Shared,
}

/// Tenant-scoped iff the table has a `tenant_id` column of a uuid or text type.
pub fn classify_table(table: &Table) -> TableScope {
    let tenant_column = table.columns.iter().any(|c| {
        c.name == TENANT_COLUMN && {
            let ty = c.data_type.to_lowercase();
            ty.contains("uuid") || ty.contains("text")
        }
    });
    if tenant_column {
        TableScope::Tenant
    } else {
        TableScope::Shared
    }
}

/// Scope of every table, in schema order.
pub fn classify(schema: &Schema) -> Vec<(String, TableScope)> {
    schema
        .tables
        .iter()
        .map(|t| (t.name.clone(), classify_table(t)))
        .collect()
}

/// Schema-level checks: tenant keys and cross-scope references.
///
/// A tenant table needs `tenant_id` in its primary key, and a shared table
/// cannot reference a tenant table.
pub fn validate_schema(schema: &Schema) -> Vec<Finding> {
    let mut findings = Vec::new();
    for table in &schema.tables {
        let scope = classify_table(table);
        let pk = table.primary_key_columns();
        if scope == TableScope::Tenant && !pk.is_empty() && !pk.iter().any(|c| c == TENANT_COLUMN) {
            findings.push(
                Finding::new(
                    Category::Constraint,
                    "tenant primary key",
                    format!("{} PRIMARY KEY ({})", table.name, pk.join(", ")),
                    Severity::Error,
                    format!("tenant table {} must include {TENANT_COLUMN} in its primary key", table.name),
                )
                .alternative(format!("PRIMARY KEY ({TENANT_COLUMN}, {})", pk.join(", "))),
            );
        }
        if scope != TableScope::Shared {
            continue;
        }
        let targets = table
            .columns
            .iter()
            .filter_map(|c| c.references.as_ref())
            .chain(
                table
                    .constraints
                    .iter()
                    .filter(|c| c.kind == ConstraintKind::ForeignKey)
                    .filter_map(|c| c.references.as_ref()),
            );
        for fk in targets {
            let tenant_target = schema
                .find_table(&fk.target())
                .is_some_and(|t| classify_table(t) == TableScope::Tenant);
            if tenant_target {
                findings.push(
                    Finding::new(
                        Category::Constraint,
                        "shared to tenant reference",
                        format!("{} -> {}", table.name, fk.table),
                        Severity::Error,
                        format!(
                            "shared table {} cannot reference tenant table {}",
                            table.name, fk.table
                        ),
                    )
                    .alternative(format!("add {TENANT_COLUMN} to {}", table.name)),
                );
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ForeignKeyRef};
    use pretty_assertions::assert_eq;

    fn tenants() -> Table {
        Table::new("tenants").column(Column::new("id", "uuid").primary_key())
    }

    #[test]
    fn test_classify_by_tenant_column_type() {
        let todos = Table::new("todos")
            .column(Column::new("id", "uuid"))
            .column(Column::new("tenant_id", "uuid"));
        let labels = Table::new("labels").column(Column::new("tenant_id", "text"));
        let counters = Table::new("counters").column(Column::new("tenant_id", "integer"));

        assert_eq!(classify_table(&todos), TableScope::Tenant);
        assert_eq!(classify_table(&labels), TableScope::Tenant);
        assert_eq!(classify_table(&counters), TableScope::Shared);
        assert_eq!(classify_table(&tenants()), TableScope::Shared);
    }

    #[test]
    fn test_tenant_primary_key_must_include_tenant_id() {
        let bad = Table::new("todos")
            .column(Column::new("id", "uuid").primary_key())
            .column(Column::new("tenant_id", "uuid"));
        let findings = validate_schema(&Schema::new().table(bad));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].feature, "tenant primary key");

        let good = Table::new("todos")
            .column(Column::new("tenant_id", "uuid").primary_key())
            .column(Column::new("id", "uuid").primary_key());
        assert!(validate_schema(&Schema::new().table(good)).is_empty());
    }

    #[test]
    fn test_shared_table_cannot_reference_tenant_table() {
        let todos = Table::new("todos")
            .column(Column::new("tenant_id", "uuid").primary_key())
            .column(Column::new("id", "uuid").primary_key());
        let audit = Table::new("audit").column(
            Column::new("todo_id", "uuid").references(ForeignKeyRef::new("todos", "id")),
        );
        let findings = validate_schema(&Schema::new().table(todos).table(audit));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detected, "audit -> todos");
    }
}
