//! Dropping ignored entries from a change set.

use super::{ChangeSet, Changes, Item, Modified, Named, Parent, Renamed};
use crate::ignore::IgnoreSet;
use crate::schema::ObjectKind;

impl<T: Named> Changes<T> {
    /// Keep entries for which `keep(name, parent)` holds. Renames are judged
    /// by both names: ignoring either side hides the rename.
    fn retain(&mut self, keep: impl Fn(&str, Option<&str>, &T) -> bool) {
        let parent = |p: &Option<Parent>| p.as_ref().map(|p| p.name.clone());
        self.added
            .retain(|i: &Item<T>| keep(i.item.sort_name(), parent(&i.parent).as_deref(), &i.item));
        self.removed
            .retain(|i: &Item<T>| keep(i.item.sort_name(), parent(&i.parent).as_deref(), &i.item));
        self.renamed.retain(|r: &Renamed<T>| {
            let p = parent(&r.parent);
            keep(&r.from, p.as_deref(), &r.before) && keep(&r.to, p.as_deref(), &r.after)
        });
        self.modified
            .retain(|m: &Modified<T>| keep(&m.name, parent(&m.parent).as_deref(), &m.after));
    }
}

impl ChangeSet {
    /// Remove every entry an ignore pattern matches. Scoped entries also go
    /// when their table is ignored.
    pub fn filter(mut self, ignore: &IgnoreSet) -> Self {
        let top = |kind: ObjectKind| move |name: &str, _: Option<&str>| !ignore.is_ignored(kind, name, None);
        let scoped = |kind: ObjectKind| {
            move |name: &str, parent: Option<&str>| {
                let table_kept = parent.is_none_or(|p| !ignore.is_ignored(ObjectKind::Table, p, None));
                table_kept && !ignore.is_ignored(kind, name, parent)
            }
        };

        let keep = top(ObjectKind::Extension);
        self.extensions.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::Collation);
        self.collations.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::Enum);
        self.enums.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::Domain);
        self.domains.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::CompositeType);
        self.composite_types.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::Sequence);
        self.sequences.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::ForeignTable);
        self.foreign_tables.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::Table);
        self.tables.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::View);
        self.views.retain(|n, p, _| keep(n, p));
        let keep = top(ObjectKind::MaterializedView);
        self.materialized_views.retain(|n, p, _| keep(n, p));
        self.functions.retain(|n, _, f| {
            let kind = if f.is_procedure {
                ObjectKind::Procedure
            } else {
                ObjectKind::Function
            };
            !ignore.is_ignored(kind, n, None)
        });
        self.triggers.retain(|n, _, t| {
            scoped(ObjectKind::Trigger)(n, Some(t.table.as_str()))
        });

        let keep = scoped(ObjectKind::Column);
        self.columns.retain(|n, p, _| keep(n, p));
        let keep = scoped(ObjectKind::Index);
        self.indexes.retain(|n, p, _| keep(n, p));
        let keep = scoped(ObjectKind::Partition);
        self.partitions.retain(|n, p, _| keep(n, p));
        self.constraints
            .retain(|n, p, c| scoped(c.kind.object_kind())(n, p));
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::diff::diff_schemas;
    use crate::ignore::IgnoreSet;
    use crate::schema::{Column, Schema, Table, Trigger, TriggerTiming};

    fn with_password(table: &str, keep: bool) -> Table {
        let t = Table::new(table).column(Column::new("id", "int"));
        if keep {
            t.column(Column::new("password_hash", "text"))
        } else {
            t
        }
    }

    #[test]
    fn test_column_pattern_is_table_scoped() {
        let old = Schema::new()
            .table(with_password("users", true))
            .table(with_password("admins", true));
        let new = Schema::new()
            .table(with_password("users", false))
            .table(with_password("admins", false));
        let cs = diff_schemas(&old, &new).filter(&IgnoreSet::parse("COLUMN:users.password_hash"));
        assert_eq!(cs.columns.removed.len(), 1);
        assert_eq!(cs.columns.removed[0].parent.as_ref().map(|p| p.name.as_str()), Some("admins"));
    }

    #[test]
    fn test_ignored_table_hides_its_children() {
        let old = Schema::new().table(with_password("legacy", true));
        let new = Schema::new().table(with_password("legacy", false)).table(Table::new("tmp_x"));
        let cs = diff_schemas(&old, &new).filter(&IgnoreSet::parse("legacy"));
        assert!(cs.is_empty());
    }

    #[test]
    fn test_trigger_uses_its_table_as_parent() {
        let trigger = Trigger {
            name: "touch".into(),
            table: "users".into(),
            table_schema: None,
            timing: TriggerTiming::Before,
            events: vec!["UPDATE".into()],
            for_each_row: true,
            function: "touch()".into(),
            when: None,
            tracking_id: None,
        };
        let mut new = Schema::new();
        new.triggers.push(trigger);
        let cs = diff_schemas(&Schema::new(), &new);
        assert_eq!(cs.triggers.added.len(), 1);
        let filtered = cs.clone().filter(&IgnoreSet::parse("TRIGGER:users.*"));
        assert!(filtered.triggers.added.is_empty());
        let filtered = cs.filter(&IgnoreSet::parse("TRIGGER:admins.*"));
        assert_eq!(filtered.triggers.added.len(), 1);
    }
}
