//! Tracking IDs: opaque identifiers that survive renames.
//!
//! An ID is attached once (by `pull`/`import` or by hand in the source
//! file) and never changes afterwards, so the diff engine can tell a
//! rename apart from a drop followed by an add.

use std::collections::HashMap;

use uuid::Uuid;

use super::Schema;
use super::objects::{
    Collation, CompositeType, Domain, EnumType, ForeignTable, Function, Sequence, Trigger, View,
};
use super::table::{Column, Constraint, Index, PartitionChild, Table};

/// An element that has a name and may carry a tracking ID.
pub trait Tracked {
    fn name(&self) -> &str;
    fn tracking_id(&self) -> Option<&str>;
    fn set_tracking_id(&mut self, id: String);
    fn set_name(&mut self, name: &str);

    /// Schema the element lives in; `None` is the default schema.
    fn namespace(&self) -> Option<&str> {
        None
    }
}

macro_rules! impl_tracked {
    ($($ty:ty $([$ns:ident])?),* $(,)?) => {
        $(
            impl Tracked for $ty {
                fn name(&self) -> &str {
                    &self.name
                }

                $(
                    fn namespace(&self) -> Option<&str> {
                        self.$ns.as_deref()
                    }
                )?

                fn tracking_id(&self) -> Option<&str> {
                    self.tracking_id.as_deref()
                }

                fn set_tracking_id(&mut self, id: String) {
                    self.tracking_id = Some(id);
                }

                fn set_name(&mut self, name: &str) {
                    self.name = name.to_string();
                }
            }
        )*
    };
}

impl_tracked!(
    Table [schema],
    Column,
    Index,
    Constraint,
    PartitionChild,
    EnumType [schema],
    Domain [schema],
    CompositeType [schema],
    Sequence [schema],
    Function [schema],
    Trigger,
    View [schema],
    ForeignTable [schema],
    Collation [schema],
);

/// Generate a fresh ID: a one-letter kind prefix plus 12 hex characters.
pub fn generate_tracking_id(prefix: char) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &hex[..12])
}

fn fill<T: Tracked>(items: &mut [T], prefix: char) -> usize {
    let mut assigned = 0;
    for item in items.iter_mut().filter(|i| i.tracking_id().is_none()) {
        item.set_tracking_id(generate_tracking_id(prefix));
        assigned += 1;
    }
    assigned
}

/// Give every element without a tracking ID a new one. Returns how many were assigned.
pub fn assign_missing_ids(schema: &mut Schema) -> usize {
    let mut assigned = 0;
    assigned += fill(&mut schema.enums, 'e');
    assigned += fill(&mut schema.domains, 'd');
    assigned += fill(&mut schema.composite_types, 'y');
    assigned += fill(&mut schema.sequences, 's');
    assigned += fill(&mut schema.views, 'v');
    assigned += fill(&mut schema.materialized_views, 'm');
    assigned += fill(&mut schema.functions, 'f');
    assigned += fill(&mut schema.triggers, 'g');
    assigned += fill(&mut schema.foreign_tables, 'x');
    assigned += fill(&mut schema.collations, 'l');
    assigned += fill(&mut schema.tables, 't');
    for table in &mut schema.tables {
        assigned += fill(&mut table.columns, 'c');
        assigned += fill(&mut table.indexes, 'i');
        assigned += fill(&mut table.constraints, 'k');
        if let Some(partition) = &mut table.partition {
            assigned += fill(&mut partition.children, 'p');
        }
    }
    assigned
}

fn copy_ids<T: Tracked>(target: &mut [T], source: &[T]) {
    let by_name: HashMap<(Option<&str>, &str), &str> = source
        .iter()
        .filter_map(|s| s.tracking_id().map(|id| ((s.namespace(), s.name()), id)))
        .collect();
    for item in target.iter_mut().filter(|i| i.tracking_id().is_none()) {
        let key = (item.namespace(), item.name());
        if let Some(id) = by_name.get(&key).map(|id| id.to_string()) {
            item.set_tracking_id(id);
        }
    }
}

/// Copy tracking IDs from `source` onto same-named elements of `target`.
///
/// Used to decorate an introspected schema (which never has IDs) with the
/// IDs recorded in the snapshot. Elements that already carry an ID keep it.
pub fn merge_tracking_ids(target: &mut Schema, source: &Schema) {
    copy_ids(&mut target.enums, &source.enums);
    copy_ids(&mut target.domains, &source.domains);
    copy_ids(&mut target.composite_types, &source.composite_types);
    copy_ids(&mut target.sequences, &source.sequences);
    copy_ids(&mut target.views, &source.views);
    copy_ids(&mut target.materialized_views, &source.materialized_views);
    copy_ids(&mut target.functions, &source.functions);
    copy_ids(&mut target.triggers, &source.triggers);
    copy_ids(&mut target.foreign_tables, &source.foreign_tables);
    copy_ids(&mut target.collations, &source.collations);
    copy_ids(&mut target.tables, &source.tables);

    for table in &mut target.tables {
        let Some(src) = source
            .tables
            .iter()
            .find(|t| t.schema == table.schema && t.name == table.name)
        else {
            continue;
        };
        copy_ids(&mut table.columns, &src.columns);
        copy_ids(&mut table.indexes, &src.indexes);
        copy_ids(&mut table.constraints, &src.constraints);
        if let (Some(dst), Some(src)) = (&mut table.partition, &src.partition) {
            copy_ids(&mut dst.children, &src.children);
        }
    }
}

/// Report tracking IDs used twice within one kind.
pub(crate) fn duplicate_ids<T: Tracked>(kind: &str, items: &[T], out: &mut Vec<String>) {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for item in items {
        if let Some(id) = item.tracking_id() {
            if let Some(first) = seen.insert(id, item.name()) {
                out.push(format!(
                    "{kind} tracking id {id} is shared by '{first}' and '{}'",
                    item.name()
                ));
            }
        }
    }
}
