//! relq schema model.
//!
//! One representation serves the desired schema (parsed from the source
//! file), the actual schema (introspected from the database) and the
//! persisted schema (the snapshot).
//!
//! ```
//! use relq_core::schema::{Column, ForeignKeyRef, Schema, Table};
//!
//! let schema = Schema::new()
//!     .table(Table::new("users").column(Column::new("id", "uuid").primary_key()))
//!     .table(
//!         Table::new("posts")
//!             .column(Column::new("id", "uuid").primary_key())
//!             .column(Column::new("author_id", "uuid").references(ForeignKeyRef::new("users", "id"))),
//!     );
//! assert!(schema.validate().is_empty());
//! ```

pub mod expr;
pub mod kind;
pub mod objects;
pub mod table;
pub mod tracking;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use expr::ExprNode;
pub use kind::ObjectKind;
pub use objects::{
    Collation, CompositeAttribute, CompositeType, Domain, EnumType, ForeignTable, Function,
    OwnedBy, Sequence, Trigger, TriggerTiming, View, Volatility,
};
pub use table::{
    CheckConstraint, Column, Constraint, ConstraintKind, FkAction, ForeignKeyRef, Generated,
    GeneratedKind, Identity, Index, MatchType, PartitionChild, PartitionStrategy, Partitioning,
    Table,
};
pub use tracking::{Tracked, assign_missing_ids, generate_tracking_id, merge_tracking_ids};

/// Lookup key for a possibly schema-qualified object: `name` in the
/// default schema, `schema.name` elsewhere.
pub fn object_key(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(s) if !s.is_empty() && s != "public" => format!("{s}.{name}"),
        _ => name.to_string(),
    }
}

/// A complete database schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub enums: Vec<EnumType>,
    #[serde(default)]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub composite_types: Vec<CompositeType>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub materialized_views: Vec<View>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub foreign_tables: Vec<ForeignTable>,
    #[serde(default)]
    pub collations: Vec<Collation>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn enum_type(mut self, enum_type: EnumType) -> Self {
        self.enums.push(enum_type);
        self
    }

    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    /// Table by [`object_key`]: `users`, or `audit.events` outside the default schema.
    pub fn find_table(&self, key: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.key() == key)
    }

    pub fn find_table_mut(&mut self, key: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.key() == key)
    }

    pub fn find_enum(&self, name: &str) -> Option<&EnumType> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.object_count() == 0
    }

    /// Number of top-level objects of every kind.
    pub fn object_count(&self) -> usize {
        self.extensions.len()
            + self.enums.len()
            + self.domains.len()
            + self.composite_types.len()
            + self.sequences.len()
            + self.tables.len()
            + self.views.len()
            + self.materialized_views.len()
            + self.functions.len()
            + self.triggers.len()
            + self.foreign_tables.len()
            + self.collations.len()
    }

    /// See [`Table::fold_inline_constraints`].
    pub fn fold_inline_constraints(&mut self) {
        for table in &mut self.tables {
            table.fold_inline_constraints();
        }
    }

    /// Drop parsed expression trees, keeping the expression text.
    pub fn clear_expression_trees(&mut self) {
        for table in &mut self.tables {
            for col in &mut table.columns {
                col.default_expr = None;
                if let Some(check) = &mut col.check {
                    check.expr = None;
                }
                if let Some(generated) = &mut col.generated {
                    generated.expr = None;
                }
            }
            for index in &mut table.indexes {
                index.where_expr = None;
            }
        }
        for table in &mut self.foreign_tables {
            for col in &mut table.columns {
                col.default_expr = None;
                if let Some(check) = &mut col.check {
                    check.expr = None;
                }
            }
        }
    }

    /// Drop function and trigger definitions (export without `--include-*`).
    pub fn without_routines(mut self, keep_functions: bool, keep_triggers: bool) -> Self {
        if !keep_functions {
            self.functions.clear();
        }
        if !keep_triggers {
            self.triggers.clear();
        }
        self
    }

    /// Check the model invariants, returning one message per violation.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        unique_names("table", &self.tables, &mut problems);
        unique_names("enum", &self.enums, &mut problems);
        unique_names("domain", &self.domains, &mut problems);
        unique_names("sequence", &self.sequences, &mut problems);
        unique_names("view", &self.views, &mut problems);
        unique_names("composite type", &self.composite_types, &mut problems);

        tracking::duplicate_ids("table", &self.tables, &mut problems);
        tracking::duplicate_ids("enum", &self.enums, &mut problems);
        tracking::duplicate_ids("domain", &self.domains, &mut problems);
        tracking::duplicate_ids("sequence", &self.sequences, &mut problems);
        tracking::duplicate_ids("function", &self.functions, &mut problems);
        tracking::duplicate_ids("view", &self.views, &mut problems);
        tracking::duplicate_ids("trigger", &self.triggers, &mut problems);

        for table in &self.tables {
            let scope = format!("column of {}", table.name);
            unique_names(&scope, &table.columns, &mut problems);
            tracking::duplicate_ids(&scope, &table.columns, &mut problems);
            tracking::duplicate_ids("index", &table.indexes, &mut problems);
            tracking::duplicate_ids("constraint", &table.constraints, &mut problems);

            let columns: HashSet<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
            for constraint in &table.constraints {
                for col in &constraint.columns {
                    if !columns.contains(col.as_str()) {
                        problems.push(format!(
                            "constraint {} on {} references missing column {}",
                            constraint.name, table.name, col
                        ));
                    }
                }
            }
            if let Some(partition) = &table.partition {
                for key in &partition.columns {
                    if !columns.contains(key.as_str()) {
                        problems.push(format!(
                            "partition key {} is not a column of {}",
                            key, table.name
                        ));
                    }
                }
            }
        }

        for trigger in &self.triggers {
            let table = trigger.table_key();
            if self.find_table(&table).is_none() {
                problems.push(format!(
                    "trigger {} is attached to unknown table {}",
                    trigger.name, table
                ));
            }
        }

        problems
    }
}

/// Names must be unique per kind within one schema.
fn unique_names<T: Tracked>(kind: &str, items: &[T], out: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for item in items {
        let key = object_key(item.namespace(), item.name());
        if !seen.insert(key.clone()) {
            out.push(format!("duplicate {kind} name '{key}'"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_duplicates_and_missing_columns() {
        let schema = Schema::new()
            .table(
                Table::new("users")
                    .column(Column::new("id", "int"))
                    .column(Column::new("id", "int"))
                    .constraint(Constraint::unique("users_email_key", vec!["email".into()])),
            )
            .table(Table::new("users"));

        let problems = schema.validate();
        assert!(problems.iter().any(|p| p == "duplicate table name 'users'"));
        assert!(problems.iter().any(|p| p.contains("duplicate column of users name 'id'")));
        assert!(problems.iter().any(|p| p.contains("missing column email")));
    }

    #[test]
    fn test_validate_duplicate_tracking_ids() {
        let schema = Schema::new()
            .table(Table::new("a").id("tsame00000000"))
            .table(Table::new("b").id("tsame00000000"));
        let problems = schema.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("shared by 'a' and 'b'"));
    }

    #[test]
    fn test_object_count() {
        let schema = Schema::new()
            .extension("pgcrypto")
            .enum_type(EnumType::new("mood", &["happy"]))
            .table(Table::new("t"));
        assert_eq!(schema.object_count(), 3);
        assert!(!schema.is_empty());
        assert!(Schema::new().is_empty());
    }
}
