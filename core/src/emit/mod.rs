//! SQL emitter: turns a [`ChangeSet`] into ordered UP and DOWN statements.
//!
//! Every change becomes an [`Operation`] carrying its forward statements
//! and the statements that undo it. Operations are ordered by object-kind
//! priority (see [`ObjectKind::priority`]); drops use the mirrored
//! priority so dependents are removed before what they depend on. The
//! DOWN script is the UP operation list walked backwards.
//!
//! ```
//! use relq_core::diff::diff_schemas;
//! use relq_core::emit::generate;
//! use relq_core::schema::{EnumType, Schema};
//!
//! let old = Schema::new().enum_type(EnumType::new("status", &["a", "b"]));
//! let new = Schema::new().enum_type(EnumType::new("status", &["a", "b", "c"]));
//! let sql = generate(&diff_schemas(&old, &new));
//! assert_eq!(sql.up(), vec![r#"ALTER TYPE "status" ADD VALUE IF NOT EXISTS 'c';"#]);
//! assert!(sql.down()[0].starts_with("--"));
//! ```

pub mod ddl;
mod priority;
pub mod quote;
pub mod split;

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::diff::compare::enum_delta;
use crate::diff::{ChangeSet, Changes, Item, Modified, Parent};
use crate::schema::{
    Column, CompositeType, Constraint, Domain, ForeignKeyRef, Function, Index, ObjectKind,
    PartitionChild, Table, Tracked, View,
};
use ddl::EnumPosition;

pub use split::{split_statements, split_top_level, strip_comments};

/// What an operation does to its object.
///
/// Declaration order is the tie-break within one priority: renames run
/// first so later statements can use the new names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Rename,
    Create,
    Alter,
    Drop,
}

/// One logical change with its forward and reverse statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub kind: ObjectKind,
    pub action: Action,
    pub name: String,
    pub priority: u8,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl Operation {
    fn new(kind: ObjectKind, action: Action, name: impl Into<String>) -> Self {
        let priority = match action {
            Action::Drop => kind.drop_priority(),
            _ => kind.priority(),
        };
        Operation {
            kind,
            action,
            name: name.into(),
            priority,
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    fn at(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    fn up(mut self, sql: impl Into<String>) -> Self {
        self.up.push(sql.into());
        self
    }

    fn down(mut self, sql: impl Into<String>) -> Self {
        self.down.push(sql.into());
        self
    }

    fn up_all(mut self, sql: impl IntoIterator<Item = String>) -> Self {
        self.up.extend(sql);
        self
    }

    fn down_all(mut self, sql: impl IntoIterator<Item = String>) -> Self {
        self.down.extend(sql);
        self
    }
}

/// Ordered operations of one migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSql {
    pub operations: Vec<Operation>,
}

impl MigrationSql {
    pub fn is_empty(&self) -> bool {
        self.operations.iter().all(|op| op.up.is_empty())
    }

    /// Forward statements in execution order.
    pub fn up(&self) -> Vec<String> {
        self.operations
            .iter()
            .flat_map(|op| op.up.iter().cloned())
            .collect()
    }

    /// Reverse statements: operations backwards, each contributing its undo.
    pub fn down(&self) -> Vec<String> {
        self.operations
            .iter()
            .rev()
            .flat_map(|op| op.down.iter().cloned())
            .collect()
    }

    pub fn up_sql(&self) -> String {
        self.up().join("\n")
    }

    pub fn down_sql(&self) -> String {
        self.down().join("\n")
    }
}

/// True for statements made only of `--` comment lines; these are never executed.
pub fn is_comment_only(statement: &str) -> bool {
    statement
        .lines()
        .all(|l| l.trim().is_empty() || l.trim_start().starts_with("--"))
}

/// Emit UP and DOWN SQL for a change set.
pub fn generate(changes: &ChangeSet) -> MigrationSql {
    MigrationSql {
        operations: plan_operations(changes),
    }
}

/// Forward statements only.
pub fn generate_up(changes: &ChangeSet) -> Vec<String> {
    generate(changes).up()
}

/// Reverse statements only.
pub fn generate_down(changes: &ChangeSet) -> Vec<String> {
    generate(changes).down()
}

/// Build and order every operation of a change set.
pub fn plan_operations(changes: &ChangeSet) -> Vec<Operation> {
    let mut ops = Vec::new();
    extension_ops(changes, &mut ops);
    collation_ops(changes, &mut ops);
    enum_ops(changes, &mut ops);
    domain_ops(changes, &mut ops);
    composite_ops(changes, &mut ops);
    sequence_ops(changes, &mut ops);
    foreign_table_ops(changes, &mut ops);
    table_ops(changes, &mut ops);
    partition_ops(changes, &mut ops);
    column_ops(changes, &mut ops);
    index_ops(changes, &mut ops);
    constraint_ops(changes, &mut ops);
    view_ops(&changes.views, ObjectKind::View, &mut ops);
    view_ops(&changes.materialized_views, ObjectKind::MaterializedView, &mut ops);
    function_ops(changes, &mut ops);
    trigger_ops(changes, &mut ops);

    // Stable: equal keys keep insertion order.
    ops.sort_by_key(|op| (op.priority, op.action));
    ops
}

fn scoped_name(parent: &Option<Parent>, name: &str) -> String {
    match parent {
        Some(p) => format!("{}.{}", p.name, name),
        None => name.to_string(),
    }
}

fn parent_table(parent: &Option<Parent>) -> Table {
    parent.as_ref().map(Parent::as_table).unwrap_or_default()
}

/// `before` under the name it has once any rename in the same run is applied.
fn renamed_before<T: Tracked + Clone>(m: &Modified<T>) -> T {
    let mut before = m.before.clone();
    if before.name() != m.name {
        before.set_name(&m.name);
    }
    before
}

fn irreversible(what: &str) -> String {
    format!("-- {what} cannot be reversed automatically")
}

fn extension_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    for added in &changes.extensions.added {
        let name = &added.item.0;
        ops.push(
            Operation::new(ObjectKind::Extension, Action::Create, name)
                .up(ddl::create_extension(name))
                .down(ddl::drop_extension(name)),
        );
    }
    for removed in &changes.extensions.removed {
        let name = &removed.item.0;
        ops.push(
            Operation::new(ObjectKind::Extension, Action::Drop, name)
                .up(ddl::drop_extension(name))
                .down(ddl::create_extension(name)),
        );
    }
}

/// Create/drop/rename plus drop-and-recreate modification for simple kinds.
fn recreate_ops<T: Tracked + Clone>(
    changes: &Changes<T>,
    kind: ObjectKind,
    create: impl Fn(&T) -> String,
    drop: impl Fn(&T) -> String,
    rename: impl Fn(&T, &str, &str) -> String,
    ops: &mut Vec<Operation>,
) {
    for Item { item, .. } in &changes.added {
        ops.push(
            Operation::new(kind, Action::Create, item.name())
                .up(create(item))
                .down(drop(item)),
        );
    }
    for Item { item, .. } in &changes.removed {
        ops.push(
            Operation::new(kind, Action::Drop, item.name())
                .up(drop(item))
                .down(create(item)),
        );
    }
    for r in &changes.renamed {
        ops.push(
            Operation::new(kind, Action::Rename, &r.to)
                .up(rename(&r.after, &r.from, &r.to))
                .down(rename(&r.before, &r.to, &r.from)),
        );
    }
    for m in &changes.modified {
        let before = renamed_before(m);
        ops.push(
            Operation::new(kind, Action::Alter, &m.name)
                .up(drop(&before))
                .up(create(&m.after))
                .down(drop(&m.after))
                .down(create(&before)),
        );
    }
}

fn collation_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    recreate_ops(
        &changes.collations,
        ObjectKind::Collation,
        ddl::create_collation,
        ddl::drop_collation,
        |c, from, to| ddl::rename_object("COLLATION", c.schema.as_deref(), from, to),
        ops,
    );
}

fn enum_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let enums = &changes.enums;
    for Item { item, .. } in &enums.added {
        ops.push(
            Operation::new(ObjectKind::Enum, Action::Create, &item.name)
                .up(ddl::create_enum(item))
                .down(ddl::drop_type(item.schema.as_deref(), &item.name)),
        );
    }
    for Item { item, .. } in &enums.removed {
        ops.push(
            Operation::new(ObjectKind::Enum, Action::Drop, &item.name)
                .up(ddl::drop_type(item.schema.as_deref(), &item.name))
                .down(ddl::create_enum(item)),
        );
    }
    for r in &enums.renamed {
        let schema = r.after.schema.as_deref();
        ops.push(
            Operation::new(ObjectKind::Enum, Action::Rename, &r.to)
                .up(ddl::rename_type(schema, &r.from, &r.to))
                .down(ddl::rename_type(schema, &r.to, &r.from)),
        );
    }
    for m in &enums.modified {
        let delta = enum_delta(&m.before, &m.after);
        for added in &delta.added {
            let position = match (&added.after, &added.before) {
                (_, None) => None,
                (Some(prev), Some(_)) => Some(EnumPosition::After(prev)),
                (None, Some(next)) => Some(EnumPosition::Before(next)),
            };
            ops.push(
                Operation::new(
                    ObjectKind::EnumValue,
                    Action::Alter,
                    format!("{}.{}", m.name, added.value),
                )
                .up(ddl::add_enum_value(&m.after, &added.value, position))
                .down(format!(
                    "-- enum \"{}\": value '{}' cannot be removed (PostgreSQL does not drop enum values)",
                    m.name, added.value
                )),
            );
        }
        for value in &delta.removed {
            ops.push(
                Operation::new(
                    ObjectKind::EnumValue,
                    Action::Alter,
                    format!("{}.{}", m.name, value),
                )
                .up(format!(
                    "-- enum \"{}\": value '{}' is no longer declared but cannot be dropped in place",
                    m.name, value
                )),
            );
        }
    }
}

fn domain_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let domains = &changes.domains;
    for Item { item, .. } in &domains.added {
        ops.push(
            Operation::new(ObjectKind::Domain, Action::Create, &item.name)
                .up(ddl::create_domain(item))
                .down(ddl::drop_domain(item)),
        );
    }
    for Item { item, .. } in &domains.removed {
        ops.push(
            Operation::new(ObjectKind::Domain, Action::Drop, &item.name)
                .up(ddl::drop_domain(item))
                .down(ddl::create_domain(item)),
        );
    }
    for r in &domains.renamed {
        let schema = r.after.schema.as_deref();
        ops.push(
            Operation::new(ObjectKind::Domain, Action::Rename, &r.to)
                .up(ddl::rename_object("DOMAIN", schema, &r.from, &r.to))
                .down(ddl::rename_object("DOMAIN", schema, &r.to, &r.from)),
        );
    }
    for m in &domains.modified {
        let before = renamed_before(m);
        let after = &m.after;
        let mut op = Operation::new(ObjectKind::Domain, Action::Alter, &m.name);
        for change in &m.changes {
            match change.field.as_str() {
                "default" => {
                    let set = |d: &Domain| match &d.default {
                        Some(v) => ddl::alter_domain(after, &format!("SET DEFAULT {v}")),
                        None => ddl::alter_domain(after, "DROP DEFAULT"),
                    };
                    op = op.up(set(after)).down(set(&before));
                }
                "notNull" => {
                    let set = |not_null: bool| {
                        ddl::alter_domain(
                            after,
                            if not_null { "SET NOT NULL" } else { "DROP NOT NULL" },
                        )
                    };
                    op = op.up(set(after.not_null)).down(set(before.not_null));
                }
                "check" => {
                    let constraint = quote::quote_ident(&format!("{}_check", m.name));
                    let swap = |check: &Option<String>| {
                        let mut sql =
                            vec![ddl::alter_domain(after, &format!("DROP CONSTRAINT IF EXISTS {constraint}"))];
                        if let Some(expr) = check {
                            sql.push(ddl::alter_domain(
                                after,
                                &format!("ADD CONSTRAINT {constraint} CHECK ({expr})"),
                            ));
                        }
                        sql
                    };
                    op = op.up_all(swap(&after.check)).down_all(swap(&before.check));
                }
                "baseType" => {
                    op = op.up(format!(
                        "-- domain \"{}\": base type change from {} to {} requires recreating the domain",
                        m.name, before.base_type, after.base_type
                    ));
                }
                _ => {}
            }
        }
        ops.push(op);
    }
}

fn composite_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let composites = &changes.composite_types;
    for Item { item, .. } in &composites.added {
        ops.push(
            Operation::new(ObjectKind::CompositeType, Action::Create, &item.name)
                .up(ddl::create_composite(item))
                .down(ddl::drop_type(item.schema.as_deref(), &item.name)),
        );
    }
    for Item { item, .. } in &composites.removed {
        ops.push(
            Operation::new(ObjectKind::CompositeType, Action::Drop, &item.name)
                .up(ddl::drop_type(item.schema.as_deref(), &item.name))
                .down(ddl::create_composite(item)),
        );
    }
    for r in &composites.renamed {
        let schema = r.after.schema.as_deref();
        ops.push(
            Operation::new(ObjectKind::CompositeType, Action::Rename, &r.to)
                .up(ddl::rename_type(schema, &r.from, &r.to))
                .down(ddl::rename_type(schema, &r.to, &r.from)),
        );
    }
    for m in &composites.modified {
        let before = renamed_before(m);
        let after = &m.after;
        let attr_sql = |from: &CompositeType, to: &CompositeType| {
            let mut sql = Vec::new();
            for attr in &to.attributes {
                match from.attributes.iter().find(|a| a.name == attr.name) {
                    None => sql.push(ddl::alter_composite(
                        after,
                        &format!("ADD ATTRIBUTE {} {}", quote::quote_ident(&attr.name), attr.data_type),
                    )),
                    Some(old) if old.data_type != attr.data_type => sql.push(ddl::alter_composite(
                        after,
                        &format!("ALTER ATTRIBUTE {} TYPE {}", quote::quote_ident(&attr.name), attr.data_type),
                    )),
                    Some(_) => {}
                }
            }
            for attr in &from.attributes {
                if !to.attributes.iter().any(|a| a.name == attr.name) {
                    sql.push(ddl::alter_composite(
                        after,
                        &format!("DROP ATTRIBUTE IF EXISTS {}", quote::quote_ident(&attr.name)),
                    ));
                }
            }
            sql
        };
        ops.push(
            Operation::new(ObjectKind::CompositeType, Action::Alter, &m.name)
                .up_all(attr_sql(&before, after))
                .down_all(attr_sql(after, &before)),
        );
    }
}

fn sequence_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let owner_priority = ObjectKind::Column.priority();
    let sequences = &changes.sequences;
    for Item { item, .. } in &sequences.added {
        ops.push(
            Operation::new(ObjectKind::Sequence, Action::Create, &item.name)
                .up(ddl::create_sequence(item))
                .down(ddl::drop_sequence(item)),
        );
        if item.owned_by.is_some() {
            ops.push(
                Operation::new(ObjectKind::Sequence, Action::Alter, &item.name)
                    .at(owner_priority)
                    .up(ddl::sequence_owned_by(item)),
            );
        }
    }
    for Item { item, .. } in &sequences.removed {
        ops.push(
            Operation::new(ObjectKind::Sequence, Action::Drop, &item.name)
                .up(ddl::drop_sequence(item))
                .down(ddl::create_sequence(item)),
        );
        if item.owned_by.is_some() {
            // Ownership comes back once the owning column exists again.
            ops.push(
                Operation::new(ObjectKind::Sequence, Action::Drop, &item.name)
                    .at(100 - owner_priority)
                    .down(ddl::sequence_owned_by(item)),
            );
        }
    }
    for r in &sequences.renamed {
        let schema = r.after.schema.as_deref();
        ops.push(
            Operation::new(ObjectKind::Sequence, Action::Rename, &r.to)
                .up(ddl::rename_sequence(schema, &r.from, &r.to))
                .down(ddl::rename_sequence(schema, &r.to, &r.from)),
        );
    }
    for m in &sequences.modified {
        let before = renamed_before(m);
        if m.changes.iter().any(|c| c.field != "ownedBy") {
            ops.push(
                Operation::new(ObjectKind::Sequence, Action::Alter, &m.name)
                    .up(ddl::alter_sequence(&m.after))
                    .down(ddl::alter_sequence(&before)),
            );
        }
        if m.changes.iter().any(|c| c.field == "ownedBy") {
            ops.push(
                Operation::new(ObjectKind::Sequence, Action::Alter, &m.name)
                    .at(owner_priority)
                    .up(ddl::sequence_owned_by(&m.after))
                    .down(ddl::sequence_owned_by(&before)),
            );
        }
    }
}

fn foreign_table_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    recreate_ops(
        &changes.foreign_tables,
        ObjectKind::ForeignTable,
        ddl::create_foreign_table,
        ddl::drop_foreign_table,
        |t, from, to| ddl::rename_object("FOREIGN TABLE", t.schema.as_deref(), from, to),
        ops,
    );
}

/// Order tables so referenced tables come first. Tables in a cycle keep
/// their given order; [`defer_forward_references`] then moves the
/// references that still point ahead out of their CREATE TABLE.
pub(crate) fn dependency_order<'a>(tables: &[&'a Table]) -> Vec<&'a Table> {
    let keys: HashSet<String> = tables.iter().map(|t| t.key()).collect();
    let mut placed: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(tables.len());
    let mut pending: Vec<&Table> = tables.to_vec();

    while !pending.is_empty() {
        let ready: Vec<&Table> = pending
            .iter()
            .copied()
            .filter(|t| {
                t.referenced_tables()
                    .iter()
                    .all(|r| !keys.contains(r) || placed.contains(r))
            })
            .collect();
        if ready.is_empty() {
            tracing::debug!(
                tables = ?pending.iter().map(|t| t.key()).collect::<Vec<_>>(),
                "circular references; foreign keys go after the tables"
            );
            ordered.extend(pending.drain(..));
            break;
        }
        for t in &ready {
            placed.insert(t.key());
        }
        pending.retain(|t| !placed.contains(&t.key()));
        ordered.extend(ready);
    }
    ordered
}

/// For each table of `ordered`, the table as CREATE TABLE may write it and
/// the FOREIGN KEY constraints to add once every table exists.
///
/// An inline column reference to a table created later in `ordered` cannot
/// stay on its column; it becomes a constraint with PostgreSQL's default
/// `{table}_{column}_fkey` name, which reads back as the same column flag.
pub(crate) fn defer_forward_references(ordered: &[&Table]) -> Vec<(Table, Vec<Constraint>)> {
    let mut later: HashSet<String> = ordered.iter().map(|t| t.key()).collect();
    ordered
        .iter()
        .map(|&table| {
            later.remove(&table.key());
            let mut create = table.clone();
            let mut deferred = Vec::new();
            for col in &mut create.columns {
                if let Some(fk) = col.references.take_if(|fk| later.contains(&fk.target())) {
                    deferred.push(Constraint::foreign_key(
                        ddl::fkey_name(&table.name, &col.name),
                        vec![col.name.clone()],
                        fk,
                    ));
                }
            }
            (create, deferred)
        })
        .collect()
}

/// Everything needed to bring back a dropped table.
fn recreate_table(table: &Table) -> Vec<String> {
    let mut sql = vec![ddl::create_table(table)];
    if let Some(partition) = &table.partition {
        sql.extend(
            partition
                .children
                .iter()
                .map(|c| ddl::create_partition_child(table, c)),
        );
    }
    sql.extend(table.indexes.iter().map(|i| ddl::create_index(table, i)));
    sql.extend(comment_statements(table));
    sql
}

fn comment_statements(table: &Table) -> Vec<String> {
    let mut sql = Vec::new();
    if let Some(c) = &table.comment {
        sql.push(ddl::comment_on_table(table, Some(c)));
    }
    for col in &table.columns {
        if let Some(c) = &col.comment {
            sql.push(ddl::comment_on_column(table, &col.name, Some(c)));
        }
    }
    for idx in &table.indexes {
        if let Some(c) = &idx.comment {
            sql.push(ddl::comment_on_index(table, &idx.name, Some(c)));
        }
    }
    sql
}

fn table_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let tables = &changes.tables;

    let added: Vec<&Table> = tables.added.iter().map(|i| &i.item).collect();
    let ordered = dependency_order(&added);
    let deferred = defer_forward_references(&ordered);
    for (table, (create, deferred)) in ordered.iter().copied().zip(&deferred) {
        ops.push(
            Operation::new(ObjectKind::Table, Action::Create, &table.name)
                .up(ddl::create_table(create))
                .down(ddl::drop_table(table)),
        );
        if let Some(partition) = &table.partition {
            for child in &partition.children {
                ops.push(
                    Operation::new(ObjectKind::PartitionChild, Action::Create, &child.name)
                        .up(ddl::create_partition_child(table, child))
                        .down(ddl::drop_partition_child(table, child)),
                );
            }
        }
        for index in &table.indexes {
            ops.push(
                Operation::new(ObjectKind::Index, Action::Create, scoped_name(&Some(Parent::of(table)), &index.name))
                    .up(ddl::create_index(table, index))
                    .down(ddl::drop_index(table, &index.name)),
            );
        }
        for fk in ddl::table_foreign_keys(table).chain(deferred) {
            ops.push(
                Operation::new(ObjectKind::ForeignKey, Action::Create, format!("{}.{}", table.name, fk.name))
                    .up(ddl::add_constraint(table, fk))
                    .down(ddl::drop_constraint(table, &fk.name)),
            );
        }
        let comments = comment_statements(table);
        if !comments.is_empty() {
            ops.push(
                Operation::new(ObjectKind::TableComment, Action::Create, &table.name)
                    .at(ObjectKind::IndexComment.priority())
                    .up_all(comments),
            );
        }
    }

    let removed: Vec<&Table> = tables.removed.iter().map(|i| &i.item).collect();
    let ordered = dependency_order(&removed);
    let deferred = defer_forward_references(&ordered);
    for (table, (create, deferred)) in ordered.iter().copied().zip(&deferred).rev() {
        for fk in ddl::table_foreign_keys(table).chain(deferred) {
            ops.push(
                Operation::new(ObjectKind::ForeignKey, Action::Drop, format!("{}.{}", table.name, fk.name))
                    .up(ddl::drop_constraint(table, &fk.name))
                    .down(ddl::add_constraint(table, fk)),
            );
        }
        ops.push(
            Operation::new(ObjectKind::Table, Action::Drop, &table.name)
                .up(ddl::drop_table(table))
                .down_all(recreate_table(create)),
        );
    }

    for r in &tables.renamed {
        let schema = r.after.schema.as_deref();
        ops.push(
            Operation::new(ObjectKind::Table, Action::Rename, &r.to)
                .up(ddl::rename_table(schema, &r.from, &r.to))
                .down(ddl::rename_table(schema, &r.to, &r.from)),
        );
    }

    for m in &tables.modified {
        for change in &m.changes {
            match change.field.as_str() {
                "comment" => ops.push(
                    Operation::new(ObjectKind::TableComment, Action::Alter, &m.name)
                        .up(ddl::comment_on_table(&m.after, m.after.comment.as_deref()))
                        .down(ddl::comment_on_table(&m.after, m.before.comment.as_deref())),
                ),
                "partition" => ops.push(
                    Operation::new(ObjectKind::Partition, Action::Alter, &m.name)
                        .up(format!(
                            "-- table \"{}\": partitioning changed from {} to {}; recreate the table to apply it",
                            m.name,
                            change.from.as_deref().unwrap_or("none"),
                            change.to.as_deref().unwrap_or("none")
                        ))
                        .down(irreversible("partitioning change")),
                ),
                _ => {}
            }
        }
    }
}

fn partition_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let parts = &changes.partitions;
    for Item { parent, item } in &parts.added {
        let table = parent_table(parent);
        ops.push(
            Operation::new(ObjectKind::PartitionChild, Action::Create, scoped_name(parent, &item.name))
                .up(ddl::create_partition_child(&table, item))
                .down(ddl::drop_partition_child(&table, item)),
        );
    }
    for Item { parent, item } in &parts.removed {
        let table = parent_table(parent);
        ops.push(
            Operation::new(ObjectKind::PartitionChild, Action::Drop, scoped_name(parent, &item.name))
                .up(ddl::drop_partition_child(&table, item))
                .down(ddl::create_partition_child(&table, item)),
        );
    }
    for r in &parts.renamed {
        let schema = r.parent.as_ref().and_then(|p| p.schema.as_deref());
        ops.push(
            Operation::new(ObjectKind::PartitionChild, Action::Rename, scoped_name(&r.parent, &r.to))
                .up(ddl::rename_table(schema, &r.from, &r.to))
                .down(ddl::rename_table(schema, &r.to, &r.from)),
        );
    }
    for m in &parts.modified {
        let table = parent_table(&m.parent);
        let before = renamed_before(m);
        let detach = |name: &str| {
            format!(
                "ALTER TABLE {} DETACH PARTITION {};",
                quote::qualified(table.schema.as_deref(), &table.name),
                quote::qualified(table.schema.as_deref(), name)
            )
        };
        let attach = |child: &PartitionChild| {
            format!(
                "ALTER TABLE {} ATTACH PARTITION {} {};",
                quote::qualified(table.schema.as_deref(), &table.name),
                quote::qualified(table.schema.as_deref(), &child.name),
                child.bound
            )
        };
        ops.push(
            Operation::new(ObjectKind::PartitionChild, Action::Alter, scoped_name(&m.parent, &m.name))
                .up(detach(&m.name))
                .up(attach(&m.after))
                .down(detach(&m.name))
                .down(attach(&before)),
        );
    }
}

fn column_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let columns = &changes.columns;
    for Item { parent, item } in &columns.added {
        let table = parent_table(parent);
        ops.push(
            Operation::new(ObjectKind::Column, Action::Create, scoped_name(parent, &item.name))
                .up(ddl::add_column(&table, item))
                .down(ddl::drop_column(&table, &item.name)),
        );
        if let Some(c) = &item.comment {
            ops.push(
                Operation::new(ObjectKind::ColumnComment, Action::Create, scoped_name(parent, &item.name))
                    .up(ddl::comment_on_column(&table, &item.name, Some(c))),
            );
        }
    }
    for Item { parent, item } in &columns.removed {
        let table = parent_table(parent);
        let mut restore = vec![ddl::add_column(&table, item)];
        if let Some(c) = &item.comment {
            restore.push(ddl::comment_on_column(&table, &item.name, Some(c)));
        }
        ops.push(
            Operation::new(ObjectKind::Column, Action::Drop, scoped_name(parent, &item.name))
                .up(ddl::drop_column(&table, &item.name))
                .down_all(restore),
        );
    }
    for r in &columns.renamed {
        let table = parent_table(&r.parent);
        ops.push(
            Operation::new(ObjectKind::Column, Action::Rename, scoped_name(&r.parent, &r.to))
                .up(ddl::rename_column(&table, &r.from, &r.to))
                .down(ddl::rename_column(&table, &r.to, &r.from)),
        );
    }

    // The old "{table}_pkey" goes before any column alter (DROP NOT NULL
    // fails while it holds) and so before the new key is added.
    let (added_keys, dropped_keys): (Vec<_>, Vec<_>) = columns
        .modified
        .iter()
        .filter_map(primary_key_op)
        .partition(|(adds, _)| *adds);
    ops.extend(
        dropped_keys
            .into_iter()
            .map(|(_, op)| op.at(ObjectKind::Column.priority())),
    );
    for m in &columns.modified {
        column_modification(m, ops);
    }
    ops.extend(added_keys.into_iter().map(|(_, op)| op));
}

/// The PRIMARY KEY flag of a column flipping, and whether it is gained.
fn primary_key_op(m: &Modified<Column>) -> Option<(bool, Operation)> {
    if !m.changes.iter().any(|c| c.field == "primaryKey") {
        return None;
    }
    let table = parent_table(&m.parent);
    let add = ddl::add_primary_key(&table, std::slice::from_ref(&m.name));
    let drop = ddl::drop_constraint(&table, &ddl::pkey_name(&table.name));
    let op = Operation::new(ObjectKind::PrimaryKey, Action::Alter, scoped_name(&m.parent, &m.name));
    let adds = m.after.primary_key;
    Some((adds, if adds { op.up(add).down(drop) } else { op.up(drop).down(add) }))
}

fn column_modification(m: &Modified<Column>, ops: &mut Vec<Operation>) {
    let table = parent_table(&m.parent);
    let name = scoped_name(&m.parent, &m.name);
    let (before, after) = (&m.before, &m.after);
    let changed = |field: &str| m.changes.iter().any(|c| c.field == field);

    // TYPE, then DEFAULT, then NULL; DOWN swaps each in the same order.
    let mut alter = Operation::new(ObjectKind::Column, Action::Alter, &name);
    if changed("type") || changed("length") || changed("precision") || changed("scale") {
        alter = alter
            .up(ddl::alter_column_type(&table, after))
            .down(ddl::alter_column_type(&table, &Column { name: m.name.clone(), ..before.clone() }));
    }
    if changed("default") {
        let after_default = ddl::normalize_array_default(after);
        alter = alter
            .up(ddl::alter_column_default(&table, &m.name, after_default.as_deref()))
            .down(ddl::alter_column_default(&table, &m.name, before.default.as_deref()));
    }
    if changed("nullable") {
        alter = alter
            .up(ddl::alter_column_nullability(&table, &m.name, after.nullable))
            .down(ddl::alter_column_nullability(&table, &m.name, before.nullable));
    }
    if changed("identity") {
        if let Some(sql) = ddl::alter_column_identity(&table, &m.name, before.identity, after.identity) {
            alter = alter.up(sql);
        }
        if let Some(sql) = ddl::alter_column_identity(&table, &m.name, after.identity, before.identity) {
            alter = alter.down(sql);
        }
    }
    if changed("generated") {
        match (&before.generated, &after.generated) {
            (Some(_), None) => {
                alter = alter
                    .up(ddl::drop_column_expression(&table, &m.name))
                    .down(irreversible(&format!("dropping the generation expression of {name}")));
            }
            _ => {
                alter = alter
                    .up(format!(
                        "-- column {name}: generation expression changed; recreate the column to apply it"
                    ))
                    .down(irreversible(&format!("generation change of {name}")));
            }
        }
    }
    if !alter.up.is_empty() {
        ops.push(alter);
    }

    if changed("unique") {
        let key = ddl::unique_key_name(&table.name, &m.name);
        let add = ddl::add_constraint(&table, &Constraint::unique(&key, vec![m.name.clone()]));
        let drop = ddl::drop_constraint(&table, &key);
        let op = Operation::new(ObjectKind::Constraint, Action::Alter, &name);
        ops.push(if after.unique {
            op.up(add).down(drop)
        } else {
            op.up(drop).down(add)
        });
    }
    if changed("references") {
        let fkey = ddl::fkey_name(&table.name, &m.name);
        let swap = |fk: &Option<ForeignKeyRef>| match fk {
            Some(fk) => vec![ddl::add_constraint(
                &table,
                &Constraint::foreign_key(&fkey, vec![m.name.clone()], fk.clone()),
            )],
            None => Vec::new(),
        };
        ops.push(
            Operation::new(ObjectKind::ForeignKey, Action::Alter, &name)
                .up(ddl::drop_constraint(&table, &fkey))
                .up_all(swap(&after.references))
                .down(ddl::drop_constraint(&table, &fkey))
                .down_all(swap(&before.references)),
        );
    }
    if changed("check") {
        let check_name = |c: &Column| {
            c.check
                .as_ref()
                .and_then(|k| k.name.clone())
                .unwrap_or_else(|| ddl::check_name(&table.name, &m.name))
        };
        let swap = |from: &Column, to: &Column| {
            let mut sql = Vec::new();
            if from.check.is_some() {
                sql.push(ddl::drop_constraint(&table, &check_name(from)));
            }
            if let Some(check) = &to.check {
                sql.push(ddl::add_constraint(
                    &table,
                    &Constraint::check(check_name(to), &check.expression),
                ));
            }
            sql
        };
        ops.push(
            Operation::new(ObjectKind::Check, Action::Alter, &name)
                .up_all(swap(before, after))
                .down_all(swap(after, before)),
        );
    }
    if changed("comment") {
        ops.push(
            Operation::new(ObjectKind::ColumnComment, Action::Alter, &name)
                .up(ddl::comment_on_column(&table, &m.name, after.comment.as_deref()))
                .down(ddl::comment_on_column(&table, &m.name, before.comment.as_deref())),
        );
    }
}

fn index_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let indexes = &changes.indexes;
    for Item { parent, item } in &indexes.added {
        let table = parent_table(parent);
        ops.push(
            Operation::new(ObjectKind::Index, Action::Create, scoped_name(parent, &item.name))
                .up(ddl::create_index(&table, item))
                .down(ddl::drop_index(&table, &item.name)),
        );
        if let Some(c) = &item.comment {
            ops.push(
                Operation::new(ObjectKind::IndexComment, Action::Create, scoped_name(parent, &item.name))
                    .up(ddl::comment_on_index(&table, &item.name, Some(c))),
            );
        }
    }
    for Item { parent, item } in &indexes.removed {
        let table = parent_table(parent);
        let mut restore = vec![ddl::create_index(&table, item)];
        if let Some(c) = &item.comment {
            restore.push(ddl::comment_on_index(&table, &item.name, Some(c)));
        }
        ops.push(
            Operation::new(ObjectKind::Index, Action::Drop, scoped_name(parent, &item.name))
                .up(ddl::drop_index(&table, &item.name))
                .down_all(restore),
        );
    }
    for r in &indexes.renamed {
        let table = parent_table(&r.parent);
        ops.push(
            Operation::new(ObjectKind::Index, Action::Rename, scoped_name(&r.parent, &r.to))
                .up(ddl::rename_index(&table, &r.from, &r.to))
                .down(ddl::rename_index(&table, &r.to, &r.from)),
        );
    }
    for m in &indexes.modified {
        let table = parent_table(&m.parent);
        let name = scoped_name(&m.parent, &m.name);
        let before: Index = renamed_before(m);
        if m.changes.iter().any(|c| c.field != "comment") {
            ops.push(
                Operation::new(ObjectKind::Index, Action::Alter, &name)
                    .up(ddl::drop_index(&table, &m.name))
                    .up(ddl::create_index(&table, &m.after))
                    .down(ddl::drop_index(&table, &m.name))
                    .down(ddl::create_index(&table, &before)),
            );
        }
        if m.changes.iter().any(|c| c.field == "comment") {
            ops.push(
                Operation::new(ObjectKind::IndexComment, Action::Alter, &name)
                    .up(ddl::comment_on_index(&table, &m.name, m.after.comment.as_deref()))
                    .down(ddl::comment_on_index(&table, &m.name, before.comment.as_deref())),
            );
        }
    }
}

fn has_definition(c: &Constraint) -> bool {
    !c.render_definition().trim().is_empty()
}

fn constraint_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let constraints = &changes.constraints;
    let skipped = |c: &Constraint, table: &str| {
        format!("-- constraint \"{}\" on \"{table}\" has an empty definition and was skipped", c.name)
    };

    for Item { parent, item } in &constraints.added {
        let table = parent_table(parent);
        let op = Operation::new(item.kind.object_kind(), Action::Create, scoped_name(parent, &item.name));
        ops.push(if has_definition(item) {
            op.up(ddl::add_constraint(&table, item))
                .down(ddl::drop_constraint(&table, &item.name))
        } else {
            op.up(skipped(item, &table.name))
        });
    }
    for Item { parent, item } in &constraints.removed {
        let table = parent_table(parent);
        let op = Operation::new(item.kind.object_kind(), Action::Drop, scoped_name(parent, &item.name))
            .up(ddl::drop_constraint(&table, &item.name));
        ops.push(if has_definition(item) {
            op.down(ddl::add_constraint(&table, item))
        } else {
            op.down(skipped(item, &table.name))
        });
    }
    for r in &constraints.renamed {
        let table = parent_table(&r.parent);
        ops.push(
            Operation::new(r.after.kind.object_kind(), Action::Rename, scoped_name(&r.parent, &r.to))
                .up(ddl::rename_constraint(&table, &r.from, &r.to))
                .down(ddl::rename_constraint(&table, &r.to, &r.from)),
        );
    }
    for m in &constraints.modified {
        let table = parent_table(&m.parent);
        let was_renamed = constraints
            .renamed
            .iter()
            .any(|r| r.to == m.name && r.parent == m.parent);
        let before = if was_renamed {
            renamed_before(m)
        } else {
            m.before.clone()
        };
        let mut op = Operation::new(
            m.after.kind.object_kind(),
            Action::Alter,
            scoped_name(&m.parent, &m.name),
        )
        .up(ddl::drop_constraint(&table, &before.name));
        op = if has_definition(&m.after) {
            op.up(ddl::add_constraint(&table, &m.after))
        } else {
            op.up(skipped(&m.after, &table.name))
        };
        op = op.down(ddl::drop_constraint(&table, &m.after.name));
        op = if has_definition(&before) {
            op.down(ddl::add_constraint(&table, &before))
        } else {
            op.down(skipped(&before, &table.name))
        };
        ops.push(op);
    }
}

fn view_ops(changes: &Changes<View>, kind: ObjectKind, ops: &mut Vec<Operation>) {
    recreate_ops(
        changes,
        kind,
        ddl::create_view,
        ddl::drop_view,
        |v, from, _| ddl::rename_view(v, from),
        ops,
    );
}

fn function_kind(f: &Function) -> ObjectKind {
    if f.is_procedure {
        ObjectKind::Procedure
    } else {
        ObjectKind::Function
    }
}

fn function_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    let functions = &changes.functions;
    for Item { item, .. } in &functions.added {
        ops.push(
            Operation::new(function_kind(item), Action::Create, &item.name)
                .up(ddl::create_function(item))
                .down(ddl::drop_function(item)),
        );
    }
    for Item { item, .. } in &functions.removed {
        ops.push(
            Operation::new(function_kind(item), Action::Drop, &item.name)
                .up(ddl::drop_function(item))
                .down(ddl::create_function(item)),
        );
    }
    for r in &functions.renamed {
        let mut back = r.before.clone();
        back.name = r.from.clone();
        ops.push(
            Operation::new(function_kind(&r.after), Action::Rename, &r.to)
                .up(ddl::rename_function(&r.after, &r.from))
                .down(ddl::rename_function(&back, &r.to)),
        );
    }
    for m in &functions.modified {
        let before = renamed_before(m);
        let signature_changed = m
            .changes
            .iter()
            .any(|c| matches!(c.field.as_str(), "arguments" | "returns" | "isProcedure"));
        let mut op = Operation::new(function_kind(&m.after), Action::Alter, &m.name);
        if signature_changed {
            op = op
                .up(ddl::drop_function(&before))
                .up(ddl::create_function(&m.after))
                .down(ddl::drop_function(&m.after))
                .down(ddl::create_function(&before));
        } else {
            op = op
                .up(ddl::create_function(&m.after))
                .down(ddl::create_function(&before));
        }
        ops.push(op);
    }
}

fn trigger_ops(changes: &ChangeSet, ops: &mut Vec<Operation>) {
    recreate_ops(
        &changes.triggers,
        ObjectKind::Trigger,
        ddl::create_trigger,
        ddl::drop_trigger,
        |t, from, _| ddl::rename_trigger(t, from),
        ops,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_schemas;
    use crate::schema::{EnumType, OwnedBy, Schema, Sequence};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_before_drop_and_drops_mirrored() {
        let old = Schema::new().table(Table::new("old_t").column(Column::new("id", "int")));
        let new = Schema::new()
            .enum_type(EnumType::new("mood", &["ok"]))
            .table(Table::new("new_t").column(Column::new("m", "mood")));
        let ops = plan_operations(&diff_schemas(&old, &new));
        let kinds: Vec<(ObjectKind, Action)> = ops.iter().map(|o| (o.kind, o.action)).collect();
        assert_eq!(
            kinds,
            vec![
                (ObjectKind::Enum, Action::Create),
                (ObjectKind::Table, Action::Create),
                (ObjectKind::Table, Action::Drop),
            ]
        );
    }

    #[test]
    fn test_down_reverses_operations() {
        let new = Schema::new()
            .extension("pgcrypto")
            .table(Table::new("t").column(Column::new("id", "uuid")));
        let sql = generate(&diff_schemas(&Schema::new(), &new));
        assert_eq!(
            sql.down(),
            vec![
                "DROP TABLE IF EXISTS \"t\" CASCADE;".to_string(),
                "DROP EXTENSION IF EXISTS \"pgcrypto\";".to_string(),
            ]
        );
    }

    #[test]
    fn test_referenced_tables_created_first() {
        let new = Schema::new()
            .table(
                Table::new("a")
                    .column(Column::new("b_id", "int").references(ForeignKeyRef::new("b", "id"))),
            )
            .table(Table::new("b").column(Column::new("id", "int").primary_key()));
        let up = generate(&diff_schemas(&Schema::new(), &new)).up();
        assert!(up[0].starts_with("CREATE TABLE \"b\""));
        assert!(up[1].starts_with("CREATE TABLE \"a\""));
    }

    #[test]
    fn test_constraint_empty_definition_is_commented() {
        let c = Constraint::exclude("t_excl", "");
        let old = Schema::new().table(Table::new("t"));
        let new = Schema::new().table(Table::new("t").constraint(c));
        let up = generate(&diff_schemas(&old, &new)).up();
        assert_eq!(up.len(), 1);
        assert!(is_comment_only(&up[0]));
    }

    #[test]
    fn test_sequence_owner_set_after_columns() {
        let mut seq = Sequence::new("t_id_seq");
        seq.owned_by = Some(OwnedBy {
            table: "t".into(),
            column: "id".into(),
        });
        let new = Schema::new()
            .sequence(seq)
            .table(Table::new("t").column(Column::new("id", "int")));
        let up = generate(&diff_schemas(&Schema::new(), &new)).up();
        assert_eq!(up.len(), 3);
        assert!(up[0].starts_with("CREATE SEQUENCE"));
        assert!(up[1].starts_with("CREATE TABLE"));
        assert_eq!(up[2], "ALTER SEQUENCE \"t_id_seq\" OWNED BY \"t\".\"id\";");
    }

    #[test]
    fn test_index_modification_recreates() {
        let old = Schema::new().table(Table::new("t").index(Index::new("t_a_idx", vec!["a".into()])));
        let new = Schema::new().table(Table::new("t").index(Index::new("t_a_idx", vec!["a".into()]).unique()));
        let sql = generate(&diff_schemas(&old, &new));
        assert_eq!(
            sql.up(),
            vec![
                "DROP INDEX IF EXISTS \"t_a_idx\";".to_string(),
                "CREATE UNIQUE INDEX IF NOT EXISTS \"t_a_idx\" ON \"t\" (\"a\");".to_string(),
            ]
        );
        assert_eq!(sql.down()[1], "CREATE INDEX IF NOT EXISTS \"t_a_idx\" ON \"t\" (\"a\");");
    }

    #[test]
    fn test_cyclic_references_become_late_constraints() {
        let new = Schema::new()
            .table(
                Table::new("a")
                    .column(Column::new("id", "int").primary_key())
                    .column(Column::new("b_id", "int").references(ForeignKeyRef::new("b", "id"))),
            )
            .table(
                Table::new("b")
                    .column(Column::new("id", "int").primary_key())
                    .column(Column::new("a_id", "int").references(ForeignKeyRef::new("a", "id"))),
            );
        let sql = generate(&diff_schemas(&Schema::new(), &new));
        let up = sql.up();

        let creates: Vec<&String> = up.iter().filter(|s| s.starts_with("CREATE TABLE")).collect();
        assert_eq!(creates.len(), 2);
        assert!(creates[0].starts_with("CREATE TABLE \"a\""));
        assert!(!creates[0].contains("REFERENCES"));
        assert!(creates[1].contains("REFERENCES \"a\" (\"id\")"));

        let late = up
            .iter()
            .position(|s| s.starts_with("ALTER TABLE \"a\" ADD CONSTRAINT \"a_b_id_fkey\" FOREIGN KEY (\"b_id\")"))
            .unwrap();
        let last_create = up.iter().rposition(|s| s.starts_with("CREATE TABLE")).unwrap();
        assert!(late > last_create);
        assert!(up[late].contains("REFERENCES \"b\" (\"id\")"));

        let down = sql.down();
        let drop_fk = down
            .iter()
            .position(|s| s == "ALTER TABLE \"a\" DROP CONSTRAINT IF EXISTS \"a_b_id_fkey\";")
            .unwrap();
        assert!(drop_fk < down.iter().position(|s| s.starts_with("DROP TABLE")).unwrap());
    }

    #[test]
    fn test_dropped_cycle_restores_in_creatable_order() {
        let old = Schema::new()
            .table(Table::new("a").column(Column::new("b_id", "int").references(ForeignKeyRef::new("b", "id"))))
            .table(Table::new("b").column(Column::new("a_id", "int").references(ForeignKeyRef::new("a", "id"))));
        let down = generate(&diff_schemas(&old, &Schema::new())).down();
        let first_create = down.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
        assert!(!down[first_create].contains("REFERENCES"));
        let late = down.iter().position(|s| s.contains("ADD CONSTRAINT \"a_b_id_fkey\"")).unwrap();
        assert!(late > down.iter().rposition(|s| s.starts_with("CREATE TABLE")).unwrap());
    }

    #[test]
    fn test_self_reference_stays_inline() {
        let new = Schema::new().table(
            Table::new("nodes")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("parent_id", "int").references(ForeignKeyRef::new("nodes", "id"))),
        );
        let up = generate(&diff_schemas(&Schema::new(), &new)).up();
        assert_eq!(up.len(), 1);
        assert!(up[0].contains("REFERENCES \"nodes\" (\"id\")"));
    }

    #[test]
    fn test_moved_primary_key_is_dropped_first() {
        let old = Schema::new().table(
            Table::new("t")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("a_uuid", "uuid")),
        );
        let new = Schema::new().table(
            Table::new("t")
                .column(Column::new("id", "int"))
                .column(Column::new("a_uuid", "uuid").primary_key()),
        );
        let sql = generate(&diff_schemas(&old, &new));
        let up = sql.up();
        let at = |stmt: &str| up.iter().position(|s| s == stmt).unwrap();

        let drop_key = at("ALTER TABLE \"t\" DROP CONSTRAINT IF EXISTS \"t_pkey\";");
        let add_key = at("ALTER TABLE \"t\" ADD PRIMARY KEY (\"a_uuid\");");
        assert!(drop_key < add_key);
        assert!(drop_key < at("ALTER TABLE \"t\" ALTER COLUMN \"id\" DROP NOT NULL;"));

        let down = sql.down();
        let restore = down
            .iter()
            .position(|s| s == "ALTER TABLE \"t\" ADD PRIMARY KEY (\"id\");")
            .unwrap();
        assert!(down.iter().position(|s| s.ends_with("DROP CONSTRAINT IF EXISTS \"t_pkey\";")).unwrap() < restore);
    }

    #[test]
    fn test_reference_into_another_schema_is_qualified() {
        let new = Schema::new().table(
            Table::new("posts").column(
                Column::new("author", "uuid").references(ForeignKeyRef::new("users", "id").in_schema("auth")),
            ),
        );
        let up = generate(&diff_schemas(&Schema::new(), &new)).up();
        assert_eq!(up.len(), 1);
        assert!(up[0].contains("REFERENCES \"auth\".\"users\" (\"id\")"), "{}", up[0]);
    }

    #[test]
    fn test_same_table_name_in_two_schemas_diffs_separately() {
        let old = Schema::new()
            .table(Table::new("events").column(Column::new("id", "int")))
            .table(Table::new("events").in_schema("audit").column(Column::new("id", "int")));
        let new = Schema::new()
            .table(Table::new("events").column(Column::new("id", "int")))
            .table(
                Table::new("events")
                    .in_schema("audit")
                    .column(Column::new("id", "int"))
                    .column(Column::new("note", "text")),
            );
        let up = generate(&diff_schemas(&old, &new)).up();
        assert_eq!(
            up,
            vec!["ALTER TABLE \"audit\".\"events\" ADD COLUMN \"note\" text;".to_string()]
        );
    }
}
