//! Object kinds shared by the ignore grammar, the diff and the emitter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every kind of schema object relq knows how to name, ignore or emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    Extension,
    Collation,
    Enum,
    EnumValue,
    Domain,
    CompositeType,
    Sequence,
    ForeignServer,
    ForeignTable,
    Table,
    TableComment,
    Partition,
    PartitionChild,
    Column,
    ColumnComment,
    Index,
    IndexComment,
    PrimaryKey,
    Check,
    Exclusion,
    Constraint,
    ForeignKey,
    View,
    MaterializedView,
    Function,
    Procedure,
    Trigger,
}

impl ObjectKind {
    /// Kinds accepted as the `TYPE:` prefix of an ignore pattern.
    pub const IGNORABLE: [ObjectKind; 21] = [
        ObjectKind::Table,
        ObjectKind::Column,
        ObjectKind::Index,
        ObjectKind::Constraint,
        ObjectKind::Check,
        ObjectKind::PrimaryKey,
        ObjectKind::ForeignKey,
        ObjectKind::Exclusion,
        ObjectKind::Partition,
        ObjectKind::Enum,
        ObjectKind::Domain,
        ObjectKind::Sequence,
        ObjectKind::CompositeType,
        ObjectKind::Function,
        ObjectKind::Procedure,
        ObjectKind::Trigger,
        ObjectKind::View,
        ObjectKind::MaterializedView,
        ObjectKind::ForeignTable,
        ObjectKind::Extension,
        ObjectKind::Collation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Extension => "EXTENSION",
            ObjectKind::Collation => "COLLATION",
            ObjectKind::Enum => "ENUM",
            ObjectKind::EnumValue => "ENUM_VALUE",
            ObjectKind::Domain => "DOMAIN",
            ObjectKind::CompositeType => "COMPOSITE_TYPE",
            ObjectKind::Sequence => "SEQUENCE",
            ObjectKind::ForeignServer => "FOREIGN_SERVER",
            ObjectKind::ForeignTable => "FOREIGN_TABLE",
            ObjectKind::Table => "TABLE",
            ObjectKind::TableComment => "TABLE_COMMENT",
            ObjectKind::Partition => "PARTITION",
            ObjectKind::PartitionChild => "PARTITION_CHILD",
            ObjectKind::Column => "COLUMN",
            ObjectKind::ColumnComment => "COLUMN_COMMENT",
            ObjectKind::Index => "INDEX",
            ObjectKind::IndexComment => "INDEX_COMMENT",
            ObjectKind::PrimaryKey => "PRIMARY_KEY",
            ObjectKind::Check => "CHECK",
            ObjectKind::Exclusion => "EXCLUSION",
            ObjectKind::Constraint => "CONSTRAINT",
            ObjectKind::ForeignKey => "FOREIGN_KEY",
            ObjectKind::View => "VIEW",
            ObjectKind::MaterializedView => "MATERIALIZED_VIEW",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Procedure => "PROCEDURE",
            ObjectKind::Trigger => "TRIGGER",
        }
    }

    /// Kinds that live inside a table (or, for triggers, attach to one).
    pub fn requires_parent(self) -> bool {
        matches!(
            self,
            ObjectKind::Column
                | ObjectKind::Index
                | ObjectKind::Constraint
                | ObjectKind::Check
                | ObjectKind::PrimaryKey
                | ObjectKind::ForeignKey
                | ObjectKind::Exclusion
                | ObjectKind::Partition
                | ObjectKind::Trigger
        )
    }

    /// True for the constraint sub-kinds.
    pub fn is_constraint(self) -> bool {
        matches!(
            self,
            ObjectKind::Constraint
                | ObjectKind::Check
                | ObjectKind::PrimaryKey
                | ObjectKind::ForeignKey
                | ObjectKind::Exclusion
        )
    }

    /// Lowercase words for messages, e.g. `materialized view`.
    pub fn label(self) -> String {
        self.as_str().to_lowercase().replace('_', " ")
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    /// Parses an ignore-pattern type keyword (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        ObjectKind::IGNORABLE
            .iter()
            .copied()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| format!("unknown object type '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignorable_kinds() {
        assert_eq!("column".parse::<ObjectKind>(), Ok(ObjectKind::Column));
        assert_eq!(
            "MATERIALIZED_VIEW".parse::<ObjectKind>(),
            Ok(ObjectKind::MaterializedView)
        );
        assert!("ENUM_VALUE".parse::<ObjectKind>().is_err());
        assert!("widget".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn test_parent_requirement() {
        assert!(ObjectKind::Trigger.requires_parent());
        assert!(ObjectKind::Partition.requires_parent());
        assert!(!ObjectKind::Enum.requires_parent());
        assert!(!ObjectKind::Table.requires_parent());
    }
}
