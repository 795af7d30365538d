//! Schema diff engine.
//!
//! [`diff_schemas`] compares an old schema (database or snapshot) with a
//! new one (desired source) and returns a [`ChangeSet`]: for every object
//! kind the elements that were added, removed, renamed or modified.
//! Renames are only ever reported for elements paired by tracking ID.
//!
//! ```
//! use relq_core::diff::diff_schemas;
//! use relq_core::schema::{Column, Schema, Table};
//!
//! let old = Schema::new().table(Table::new("users").column(Column::new("id", "int")));
//! let new = Schema::new().table(
//!     Table::new("users")
//!         .column(Column::new("id", "int"))
//!         .column(Column::new("email", "text")),
//! );
//! let changes = diff_schemas(&old, &new);
//! assert_eq!(changes.columns.added.len(), 1);
//! assert!(diff_schemas(&new, &new).is_empty());
//! ```

pub mod compare;
mod filter;
mod matching;

use std::fmt;

use serde::Serialize;

use crate::schema::{
    Collation, Column, CompositeType, Constraint, Domain, EnumType, ForeignTable, Function, Index,
    ObjectKind, PartitionChild, Schema, Sequence, Table, Tracked, Trigger, View,
};
use compare::*;
use matching::{MatchedBy, constraint_signature, match_elements};

/// The table a scoped element belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl Parent {
    pub fn of(table: &Table) -> Self {
        Parent {
            name: table.name.clone(),
            schema: table.schema.clone(),
        }
    }

    /// A bare table carrying only the name and namespace, for DDL builders.
    pub fn as_table(&self) -> Table {
        Table {
            name: self.name.clone(),
            schema: self.schema.clone(),
            ..Table::default()
        }
    }
}

/// One differing field of a modified element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Parent>,
    pub item: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Renamed<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Parent>,
    pub from: String,
    pub to: String,
    pub before: T,
    pub after: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modified<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Parent>,
    /// Name in the new schema.
    pub name: String,
    pub before: T,
    pub after: T,
    pub changes: Vec<FieldChange>,
}

/// Changes of one object kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Changes<T> {
    pub added: Vec<Item<T>>,
    pub removed: Vec<Item<T>>,
    pub renamed: Vec<Renamed<T>>,
    pub modified: Vec<Modified<T>>,
}

impl<T> Default for Changes<T> {
    fn default() -> Self {
        Changes {
            added: Vec::new(),
            removed: Vec::new(),
            renamed: Vec::new(),
            modified: Vec::new(),
        }
    }
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
            && self.modified.is_empty()
    }

    pub fn counts(&self) -> Counts {
        Counts {
            added: self.added.len(),
            removed: self.removed.len(),
            renamed: self.renamed.len(),
            modified: self.modified.len(),
        }
    }
}

/// Something that has a name for ordering purposes.
pub trait Named {
    fn sort_name(&self) -> &str;
}

impl<T: Tracked> Named for T {
    fn sort_name(&self) -> &str {
        self.name()
    }
}

fn parent_key(parent: &Option<Parent>) -> &str {
    parent.as_ref().map(|p| p.name.as_str()).unwrap_or("")
}

impl<T: Named> Changes<T> {
    fn sort(&mut self) {
        self.added.sort_by(|a, b| {
            (parent_key(&a.parent), a.item.sort_name())
                .cmp(&(parent_key(&b.parent), b.item.sort_name()))
        });
        self.removed.sort_by(|a, b| {
            (parent_key(&a.parent), a.item.sort_name())
                .cmp(&(parent_key(&b.parent), b.item.sort_name()))
        });
        self.renamed.sort_by(|a, b| {
            (parent_key(&a.parent), a.to.as_str()).cmp(&(parent_key(&b.parent), b.to.as_str()))
        });
        self.modified.sort_by(|a, b| {
            (parent_key(&a.parent), a.name.as_str())
                .cmp(&(parent_key(&b.parent), b.name.as_str()))
        });
    }
}

/// Extensions are plain names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Extension(pub String);

impl Named for Extension {
    fn sort_name(&self) -> &str {
        &self.0
    }
}

/// Everything that differs between two schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub extensions: Changes<Extension>,
    pub collations: Changes<Collation>,
    pub enums: Changes<EnumType>,
    pub domains: Changes<Domain>,
    pub composite_types: Changes<CompositeType>,
    pub sequences: Changes<Sequence>,
    pub foreign_tables: Changes<ForeignTable>,
    pub tables: Changes<Table>,
    pub partitions: Changes<PartitionChild>,
    pub columns: Changes<Column>,
    pub indexes: Changes<Index>,
    pub constraints: Changes<Constraint>,
    pub views: Changes<View>,
    pub materialized_views: Changes<View>,
    pub functions: Changes<Function>,
    pub triggers: Changes<Trigger>,
}

/// Number of entries per change type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub added: usize,
    pub removed: usize,
    pub renamed: usize,
    pub modified: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.renamed + self.modified
    }
}

/// Per-kind counts of a change set, non-empty kinds only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub entries: Vec<(ObjectKind, Counts)>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, c)| c.total()).sum()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "no changes");
        }
        for (i, (kind, c)) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let mut parts = Vec::new();
            if c.added > 0 {
                parts.push(format!("{} added", c.added));
            }
            if c.removed > 0 {
                parts.push(format!("{} removed", c.removed));
            }
            if c.renamed > 0 {
                parts.push(format!("{} renamed", c.renamed));
            }
            if c.modified > 0 {
                parts.push(format!("{} modified", c.modified));
            }
            write!(f, "{}: {}", kind.label(), parts.join(", "))?;
        }
        Ok(())
    }
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.summary().entries.is_empty()
    }

    /// Counts per object kind, in emission order.
    pub fn summary(&self) -> Summary {
        let all = [
            (ObjectKind::Extension, self.extensions.counts()),
            (ObjectKind::Collation, self.collations.counts()),
            (ObjectKind::Enum, self.enums.counts()),
            (ObjectKind::Domain, self.domains.counts()),
            (ObjectKind::CompositeType, self.composite_types.counts()),
            (ObjectKind::Sequence, self.sequences.counts()),
            (ObjectKind::ForeignTable, self.foreign_tables.counts()),
            (ObjectKind::Table, self.tables.counts()),
            (ObjectKind::Partition, self.partitions.counts()),
            (ObjectKind::Column, self.columns.counts()),
            (ObjectKind::Index, self.indexes.counts()),
            (ObjectKind::Constraint, self.constraints.counts()),
            (ObjectKind::View, self.views.counts()),
            (ObjectKind::MaterializedView, self.materialized_views.counts()),
            (ObjectKind::Function, self.functions.counts()),
            (ObjectKind::Trigger, self.triggers.counts()),
        ];
        Summary {
            entries: all.into_iter().filter(|(_, c)| c.total() > 0).collect(),
        }
    }

    /// True if applying the change set would drop data-bearing objects:
    /// tables, columns, enums, sequences, partitions or materialized views.
    pub fn has_destructive(&self) -> bool {
        !self.tables.removed.is_empty()
            || !self.columns.removed.is_empty()
            || !self.enums.removed.is_empty()
            || !self.sequences.removed.is_empty()
            || !self.partitions.removed.is_empty()
            || !self.materialized_views.removed.is_empty()
    }

    /// Human-readable list of the destructive entries.
    pub fn destructive_items(&self) -> Vec<String> {
        let scoped = |parent: &Option<Parent>, name: &str| match parent {
            Some(p) => format!("{}.{}", p.name, name),
            None => name.to_string(),
        };
        let mut items = Vec::new();
        items.extend(self.tables.removed.iter().map(|i| format!("table {}", i.item.name)));
        items.extend(
            self.columns
                .removed
                .iter()
                .map(|i| format!("column {}", scoped(&i.parent, &i.item.name))),
        );
        items.extend(self.enums.removed.iter().map(|i| format!("enum {}", i.item.name)));
        items.extend(
            self.sequences
                .removed
                .iter()
                .map(|i| format!("sequence {}", i.item.name)),
        );
        items.extend(
            self.partitions
                .removed
                .iter()
                .map(|i| format!("partition {}", scoped(&i.parent, &i.item.name))),
        );
        items.extend(
            self.materialized_views
                .removed
                .iter()
                .map(|i| format!("materialized view {}", i.item.name)),
        );
        items
    }

    /// Remove destructive entries, keeping additions, renames and modifications.
    pub fn strip_destructive(mut self) -> Self {
        self.tables.removed.clear();
        self.columns.removed.clear();
        self.enums.removed.clear();
        self.sequences.removed.clear();
        self.partitions.removed.clear();
        self.materialized_views.removed.clear();
        self
    }

    fn sort(&mut self) {
        self.extensions.sort();
        self.collations.sort();
        self.enums.sort();
        self.domains.sort();
        self.composite_types.sort();
        self.sequences.sort();
        self.foreign_tables.sort();
        self.tables.sort();
        self.partitions.sort();
        self.columns.sort();
        self.indexes.sort();
        self.constraints.sort();
        self.views.sort();
        self.materialized_views.sort();
        self.functions.sort();
        self.triggers.sort();
    }
}

/// Diff a top-level kind (or a scoped kind within one parent).
fn diff_kind<T: Tracked + Clone>(
    out: &mut Changes<T>,
    old: &[T],
    new: &[T],
    parent: Option<&Parent>,
    signature: Option<fn(&T) -> Option<String>>,
    compare: fn(&T, &T) -> Vec<FieldChange>,
) {
    let matched = match_elements(old, new, signature);
    for (o, n, by) in matched.pairs {
        if by == MatchedBy::Id && o.name() != n.name() {
            out.renamed.push(Renamed {
                parent: parent.cloned(),
                from: o.name().to_string(),
                to: n.name().to_string(),
                before: o.clone(),
                after: n.clone(),
            });
        }
        let changes = compare(o, n);
        if !changes.is_empty() {
            out.modified.push(Modified {
                parent: parent.cloned(),
                name: n.name().to_string(),
                before: o.clone(),
                after: n.clone(),
                changes,
            });
        }
    }
    out.added.extend(matched.added.into_iter().map(|n| Item {
        parent: parent.cloned(),
        item: n.clone(),
    }));
    out.removed.extend(matched.removed.into_iter().map(|o| Item {
        parent: parent.cloned(),
        item: o.clone(),
    }));
}

fn diff_extensions(out: &mut Changes<Extension>, old: &[String], new: &[String]) {
    for name in new.iter().filter(|n| !old.contains(n)) {
        out.added.push(Item {
            parent: None,
            item: Extension(name.clone()),
        });
    }
    for name in old.iter().filter(|o| !new.contains(o)) {
        out.removed.push(Item {
            parent: None,
            item: Extension(name.clone()),
        });
    }
}

fn children(table: &Table) -> &[PartitionChild] {
    table
        .partition
        .as_ref()
        .map(|p| p.children.as_slice())
        .unwrap_or(&[])
}

fn partition_child_changes(old: &PartitionChild, new: &PartitionChild) -> Vec<FieldChange> {
    let bound = |c: &PartitionChild| Some(normalize_expression(&c.bound));
    if bound(old) == bound(new) {
        Vec::new()
    } else {
        vec![FieldChange {
            field: "bound".to_string(),
            from: Some(old.bound.clone()),
            to: Some(new.bound.clone()),
        }]
    }
}

/// Compare two schemas. `old` is what exists, `new` is what is wanted.
pub fn diff_schemas(old: &Schema, new: &Schema) -> ChangeSet {
    let mut cs = ChangeSet::default();

    diff_extensions(&mut cs.extensions, &old.extensions, &new.extensions);
    diff_kind(&mut cs.collations, &old.collations, &new.collations, None, None, collation_changes);
    diff_kind(&mut cs.enums, &old.enums, &new.enums, None, None, enum_changes);
    diff_kind(&mut cs.domains, &old.domains, &new.domains, None, None, domain_changes);
    diff_kind(
        &mut cs.composite_types,
        &old.composite_types,
        &new.composite_types,
        None,
        None,
        composite_changes,
    );
    diff_kind(&mut cs.sequences, &old.sequences, &new.sequences, None, None, sequence_changes);
    diff_kind(
        &mut cs.foreign_tables,
        &old.foreign_tables,
        &new.foreign_tables,
        None,
        None,
        foreign_table_changes,
    );
    diff_kind(&mut cs.views, &old.views, &new.views, None, None, view_changes);
    diff_kind(
        &mut cs.materialized_views,
        &old.materialized_views,
        &new.materialized_views,
        None,
        None,
        view_changes,
    );
    diff_kind(&mut cs.functions, &old.functions, &new.functions, None, None, function_changes);
    diff_kind(&mut cs.triggers, &old.triggers, &new.triggers, None, None, trigger_changes);

    let tables = match_elements(&old.tables, &new.tables, None);
    for (o, n, by) in &tables.pairs {
        if *by == MatchedBy::Id && o.name != n.name {
            cs.tables.renamed.push(Renamed {
                parent: None,
                from: o.name.clone(),
                to: n.name.clone(),
                before: (*o).clone(),
                after: (*n).clone(),
            });
        }
        let changes = table_changes(o, n);
        if !changes.is_empty() {
            cs.tables.modified.push(Modified {
                parent: None,
                name: n.name.clone(),
                before: (*o).clone(),
                after: (*n).clone(),
                changes,
            });
        }

        // Scoped changes are reported under the new table name.
        let parent = Parent::of(n);
        diff_kind(&mut cs.columns, &o.columns, &n.columns, Some(&parent), None, column_changes);
        diff_kind(&mut cs.indexes, &o.indexes, &n.indexes, Some(&parent), None, index_changes);
        diff_constraints(&mut cs.constraints, o, n, &parent);
        diff_kind(
            &mut cs.partitions,
            children(o),
            children(n),
            Some(&parent),
            None,
            partition_child_changes,
        );
    }
    cs.tables.added.extend(tables.added.into_iter().map(|t| Item {
        parent: None,
        item: t.clone(),
    }));
    cs.tables.removed.extend(tables.removed.into_iter().map(|t| Item {
        parent: None,
        item: t.clone(),
    }));

    cs.sort();
    cs
}

/// Constraints additionally pair by signature; a signature pair with an
/// equivalent definition is not a change at all.
fn diff_constraints(out: &mut Changes<Constraint>, old: &Table, new: &Table, parent: &Parent) {
    let matched = match_elements(&old.constraints, &new.constraints, Some(constraint_signature));
    for (o, n, by) in matched.pairs {
        let changes = constraint_changes(o, n);
        match by {
            MatchedBy::Signature if changes.is_empty() => continue,
            MatchedBy::Id if o.name != n.name => out.renamed.push(Renamed {
                parent: Some(parent.clone()),
                from: o.name.clone(),
                to: n.name.clone(),
                before: o.clone(),
                after: n.clone(),
            }),
            _ => {}
        }
        if !changes.is_empty() {
            out.modified.push(Modified {
                parent: Some(parent.clone()),
                name: n.name.clone(),
                before: o.clone(),
                after: n.clone(),
                changes,
            });
        }
    }
    out.added.extend(matched.added.into_iter().map(|c| Item {
        parent: Some(parent.clone()),
        item: c.clone(),
    }));
    out.removed.extend(matched.removed.into_iter().map(|c| Item {
        parent: Some(parent.clone()),
        item: c.clone(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyRef, Index};
    use pretty_assertions::assert_eq;

    fn users(second: &str) -> Schema {
        Schema::new().table(
            Table::new("users")
                .id("t000000000001")
                .column(Column::new("id", "uuid").primary_key().id("c000000000001"))
                .column(Column::new(second, "text").id("c000000000002")),
        )
    }

    #[test]
    fn test_identical_schemas_have_no_changes() {
        let s = users("name");
        assert!(diff_schemas(&s, &s).is_empty());
    }

    #[test]
    fn test_column_rename_by_id() {
        let cs = diff_schemas(&users("name"), &users("full_name"));
        assert_eq!(cs.columns.renamed.len(), 1);
        assert_eq!(cs.columns.renamed[0].from, "name");
        assert_eq!(cs.columns.renamed[0].to, "full_name");
        assert!(cs.columns.added.is_empty());
        assert!(cs.columns.removed.is_empty());
        assert!(cs.columns.modified.is_empty());
    }

    #[test]
    fn test_rename_without_ids_is_add_and_remove() {
        let old = Schema::new().table(Table::new("t").column(Column::new("a", "int")));
        let new = Schema::new().table(Table::new("t").column(Column::new("b", "int")));
        let cs = diff_schemas(&old, &new);
        assert_eq!(cs.columns.added.len(), 1);
        assert_eq!(cs.columns.removed.len(), 1);
        assert!(cs.has_destructive());
    }

    #[test]
    fn test_renamed_table_columns_use_new_name() {
        let old = Schema::new().table(Table::new("people").id("t1xxxxxxxxxxx").column(Column::new("a", "int")));
        let new = Schema::new().table(
            Table::new("users")
                .id("t1xxxxxxxxxxx")
                .column(Column::new("a", "int"))
                .column(Column::new("b", "int")),
        );
        let cs = diff_schemas(&old, &new);
        assert_eq!(cs.tables.renamed.len(), 1);
        assert_eq!(cs.columns.added[0].parent.as_ref().map(|p| p.name.as_str()), Some("users"));
    }

    #[test]
    fn test_rename_and_modify_reports_both() {
        let old = Schema::new().table(Table::new("t").column(Column::new("a", "int").id("cxxxxxxxxxxx1")));
        let new = Schema::new().table(Table::new("t").column(Column::new("b", "bigint").id("cxxxxxxxxxxx1")));
        let cs = diff_schemas(&old, &new);
        assert_eq!(cs.columns.renamed.len(), 1);
        assert_eq!(cs.columns.modified.len(), 1);
        assert_eq!(cs.columns.modified[0].name, "b");
        assert_eq!(cs.columns.modified[0].changes[0].field, "type");
    }

    #[test]
    fn test_equivalent_constraint_under_new_name_is_ignored() {
        let fk = ForeignKeyRef::new("orgs", "id");
        let old = Schema::new().table(Table::new("t").column(Column::new("org_id", "int")).constraint(
            Constraint::foreign_key("t_org_id_fkey", vec!["org_id".into()], fk.clone()),
        ));
        let new = Schema::new().table(
            Table::new("t")
                .column(Column::new("org_id", "int"))
                .constraint(Constraint::foreign_key("fk_org", vec!["org_id".into()], fk)),
        );
        assert!(diff_schemas(&old, &new).is_empty());
    }

    #[test]
    fn test_strip_destructive_keeps_additions() {
        let old = Schema::new()
            .table(Table::new("x"))
            .table(Table::new("y").column(Column::new("z", "int")));
        let new = Schema::new()
            .table(Table::new("y").index(Index::new("y_idx", vec!["id".into()])))
            .table(Table::new("w"));
        let cs = diff_schemas(&old, &new);
        assert!(cs.has_destructive());
        let stripped = cs.strip_destructive();
        assert!(!stripped.has_destructive());
        assert_eq!(stripped.tables.added.len(), 1);
        assert_eq!(stripped.indexes.added.len(), 1);
        assert!(stripped.columns.removed.is_empty());
    }

    #[test]
    fn test_summary_lists_kinds() {
        let cs = diff_schemas(&Schema::new(), &users("name"));
        let summary = cs.summary();
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.to_string(), "table: 1 added");
    }

    #[test]
    fn test_sorted_by_name() {
        let new = Schema::new()
            .table(Table::new("b"))
            .table(Table::new("a"))
            .table(Table::new("c"));
        let cs = diff_schemas(&Schema::new(), &new);
        let names: Vec<&str> = cs.tables.added.iter().map(|i| i.item.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
