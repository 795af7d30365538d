//! Emission order of DDL operations.

use crate::schema::ObjectKind;

impl ObjectKind {
    /// Creation priority; lower runs first.
    pub fn priority(self) -> u8 {
        match self {
            ObjectKind::Extension => 1,
            ObjectKind::Collation | ObjectKind::Enum => 3,
            ObjectKind::EnumValue => 4,
            ObjectKind::Domain => 5,
            ObjectKind::CompositeType => 6,
            ObjectKind::Sequence | ObjectKind::ForeignServer => 7,
            ObjectKind::ForeignTable => 8,
            ObjectKind::Table | ObjectKind::TableComment => 10,
            ObjectKind::Partition => 11,
            ObjectKind::PartitionChild => 12,
            ObjectKind::Column => 13,
            ObjectKind::ColumnComment => 14,
            ObjectKind::Index => 15,
            ObjectKind::IndexComment => 16,
            ObjectKind::PrimaryKey
            | ObjectKind::Check
            | ObjectKind::Exclusion
            | ObjectKind::Constraint => 17,
            ObjectKind::ForeignKey => 18,
            ObjectKind::View => 20,
            ObjectKind::MaterializedView => 21,
            ObjectKind::Function => 30,
            ObjectKind::Procedure => 31,
            ObjectKind::Trigger => 40,
        }
    }

    /// Priority used when the object is dropped: dependents go first.
    pub fn drop_priority(self) -> u8 {
        100 - self.priority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_precede_dependents() {
        assert!(ObjectKind::Extension.priority() < ObjectKind::Enum.priority());
        assert!(ObjectKind::Enum.priority() < ObjectKind::Table.priority());
        assert!(ObjectKind::Table.priority() < ObjectKind::Index.priority());
        assert!(ObjectKind::Constraint.priority() < ObjectKind::ForeignKey.priority());
        assert!(ObjectKind::Function.priority() < ObjectKind::Trigger.priority());
    }

    #[test]
    fn test_drop_order_is_mirrored() {
        assert!(ObjectKind::Trigger.drop_priority() < ObjectKind::Table.drop_priority());
        assert!(ObjectKind::ForeignKey.drop_priority() < ObjectKind::Table.drop_priority());
        assert!(ObjectKind::Table.drop_priority() < ObjectKind::Enum.drop_priority());
    }
}
