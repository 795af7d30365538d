//! Tables and everything that lives inside them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::expr::ExprNode;
use crate::types::{TypeParams, parse_type_spec};

fn default_true() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A table definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<Partitioning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

/// A column definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// Canonical type name (see [`crate::types::normalize_type`]).
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "TypeParams::is_empty")]
    pub params: TypeParams,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expr: Option<ExprNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<Generated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

/// Generated (computed) column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generated {
    pub kind: GeneratedKind,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<ExprNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedKind {
    Stored,
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Identity {
    Always,
    ByDefault,
}

impl Identity {
    pub fn sql(self) -> &'static str {
        match self {
            Identity::Always => "GENERATED ALWAYS AS IDENTITY",
            Identity::ByDefault => "GENERATED BY DEFAULT AS IDENTITY",
        }
    }
}

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FkAction {
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
    NoAction,
}

impl FkAction {
    /// Parse the SQL spelling, e.g. `SET NULL`.
    pub fn from_sql(text: &str) -> Option<Self> {
        let words = text.split_whitespace().collect::<Vec<_>>().join(" ");
        match words.to_uppercase().as_str() {
            "CASCADE" => Some(FkAction::Cascade),
            "RESTRICT" => Some(FkAction::Restrict),
            "SET NULL" => Some(FkAction::SetNull),
            "SET DEFAULT" => Some(FkAction::SetDefault),
            "NO ACTION" => Some(FkAction::NoAction),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            FkAction::Cascade => "CASCADE",
            FkAction::Restrict => "RESTRICT",
            FkAction::SetNull => "SET NULL",
            FkAction::SetDefault => "SET DEFAULT",
            FkAction::NoAction => "NO ACTION",
        }
    }
}

/// MATCH mode of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Simple,
    Full,
    Partial,
}

impl MatchType {
    pub fn sql(self) -> &'static str {
        match self {
            MatchType::Simple => "SIMPLE",
            MatchType::Full => "FULL",
            MatchType::Partial => "PARTIAL",
        }
    }
}

/// Target of a foreign key. The table is a symbolic name, resolved at emit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<FkAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<FkAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deferrable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub initially_deferred: bool,
}

impl ForeignKeyRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: vec![column.into()],
            ..Self::default()
        }
    }

    /// Target a table outside the default schema.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// [`object_key`](super::object_key) of the referenced table.
    pub fn target(&self) -> String {
        super::object_key(self.schema.as_deref(), &self.table)
    }

    pub fn on_delete(mut self, action: FkAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(mut self, action: FkAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// NO ACTION is the implicit default; compare it as absent.
    pub fn effective_on_delete(&self) -> FkAction {
        self.on_delete.unwrap_or(FkAction::NoAction)
    }

    pub fn effective_on_update(&self) -> FkAction {
        self.on_update.unwrap_or(FkAction::NoAction)
    }
}

/// An inline CHECK on a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<ExprNode>,
}

/// An index definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    /// Column names or expression text, in key order.
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_expr: Option<ExprNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    /// Operator class per key column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub opclasses: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            ..Self::default()
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    /// Index method with the implicit default spelled out.
    pub fn method_or_default(&self) -> String {
        self.method
            .as_deref()
            .unwrap_or("btree")
            .to_lowercase()
    }
}

/// Kind of a table-level constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
    Exclude,
}

impl ConstraintKind {
    pub fn sql(self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Check => "CHECK",
            ConstraintKind::Exclude => "EXCLUDE",
        }
    }

    /// Object kind used for ignore matching and emit priority.
    pub fn object_kind(self) -> super::ObjectKind {
        use super::ObjectKind;
        match self {
            ConstraintKind::PrimaryKey => ObjectKind::PrimaryKey,
            ConstraintKind::Unique => ObjectKind::Constraint,
            ConstraintKind::ForeignKey => ObjectKind::ForeignKey,
            ConstraintKind::Check => ObjectKind::Check,
            ConstraintKind::Exclude => ObjectKind::Exclusion,
        }
    }
}

/// A table-level constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Body after `CONSTRAINT name`, e.g. `CHECK (price > 0)`.
    #[serde(default)]
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

impl Constraint {
    pub fn primary_key(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self::keyed(name, ConstraintKind::PrimaryKey, columns)
    }

    pub fn unique(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self::keyed(name, ConstraintKind::Unique, columns)
    }

    fn keyed(name: impl Into<String>, kind: ConstraintKind, columns: Vec<String>) -> Self {
        let mut c = Self {
            name: name.into(),
            kind,
            columns,
            definition: String::new(),
            references: None,
            expression: None,
            tracking_id: None,
        };
        c.definition = c.render_definition();
        c
    }

    pub fn foreign_key(
        name: impl Into<String>,
        columns: Vec<String>,
        references: ForeignKeyRef,
    ) -> Self {
        let mut c = Self {
            name: name.into(),
            kind: ConstraintKind::ForeignKey,
            columns,
            definition: String::new(),
            references: Some(references),
            expression: None,
            tracking_id: None,
        };
        c.definition = c.render_definition();
        c
    }

    pub fn check(name: impl Into<String>, expression: impl Into<String>) -> Self {
        let mut c = Self {
            name: name.into(),
            kind: ConstraintKind::Check,
            columns: Vec::new(),
            definition: String::new(),
            references: None,
            expression: Some(expression.into()),
            tracking_id: None,
        };
        c.definition = c.render_definition();
        c
    }

    pub fn exclude(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::Exclude,
            columns: Vec::new(),
            definition: definition.into(),
            references: None,
            expression: None,
            tracking_id: None,
        }
    }

    /// Canonical definition text for structured kinds; EXCLUDE keeps its raw text.
    pub fn render_definition(&self) -> String {
        use crate::emit::quote::{qualified, quote_idents};

        match self.kind {
            ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
                format!("{} ({})", self.kind.sql(), quote_idents(&self.columns))
            }
            ConstraintKind::ForeignKey => {
                let Some(fk) = &self.references else {
                    return self.definition.clone();
                };
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {}",
                    quote_idents(&self.columns),
                    qualified(fk.schema.as_deref(), &fk.table)
                );
                if !fk.columns.is_empty() {
                    sql.push_str(&format!(" ({})", quote_idents(&fk.columns)));
                }
                sql.push_str(&crate::emit::ddl::fk_tail(fk));
                sql
            }
            ConstraintKind::Check => match &self.expression {
                Some(expr) => format!("CHECK ({expr})"),
                None => self.definition.clone(),
            },
            ConstraintKind::Exclude => self.definition.clone(),
        }
    }
}

/// Partitioning strategy of a partitioned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionStrategy {
    Range,
    List,
    Hash,
}

impl PartitionStrategy {
    pub fn sql(self) -> &'static str {
        match self {
            PartitionStrategy::Range => "RANGE",
            PartitionStrategy::List => "LIST",
            PartitionStrategy::Hash => "HASH",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_uppercase().as_str() {
            "RANGE" => Some(PartitionStrategy::Range),
            "LIST" => Some(PartitionStrategy::List),
            "HASH" => Some(PartitionStrategy::Hash),
            _ => None,
        }
    }
}

/// `PARTITION BY` metadata plus the partitions attached to the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partitioning {
    pub strategy: PartitionStrategy,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PartitionChild>,
}

/// A child partition; inherits the parent's key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionChild {
    pub name: String,
    /// Bound clause, e.g. `FOR VALUES FROM ('2024-01-01') TO ('2025-01-01')` or `DEFAULT`.
    pub bound: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Place the table in a non-default schema.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn column(mut self, col: Column) -> Self {
        self.columns.push(col);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn partition_by(mut self, strategy: PartitionStrategy, columns: Vec<String>) -> Self {
        self.partition = Some(Partitioning {
            strategy,
            columns,
            children: Vec::new(),
        });
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }

    pub fn id(mut self, tracking_id: impl Into<String>) -> Self {
        self.tracking_id = Some(tracking_id.into());
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn find_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Primary-key column names, from column flags or a PRIMARY KEY constraint.
    pub fn primary_key_columns(&self) -> Vec<String> {
        if let Some(pk) = self
            .constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
        {
            return pk.columns.clone();
        }
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    /// [`object_key`](super::object_key) of this table.
    pub fn key(&self) -> String {
        super::object_key(self.schema.as_deref(), &self.name)
    }

    /// Keys of the tables this one references through foreign keys (inline or table-level).
    pub fn referenced_tables(&self) -> Vec<String> {
        let own = self.key();
        let mut refs: Vec<String> = self
            .columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(ForeignKeyRef::target))
            .chain(
                self.constraints
                    .iter()
                    .filter_map(|c| c.references.as_ref().map(ForeignKeyRef::target)),
            )
            .filter(|t| t != &own)
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Turn constraints carrying PostgreSQL's default inline names back
    /// into column flags: `{t}_pkey`, single-column `{t}_{c}_key`,
    /// `{t}_{c}_fkey` and `{t}_{c}_check`.
    ///
    /// The catalog reports every inline clause as a named constraint; the
    /// source file writes most of them on the column.
    pub fn fold_inline_constraints(&mut self) {
        use crate::emit::ddl::{check_name, fkey_name, pkey_name, unique_key_name};

        let table = self.name.clone();
        let constraints = std::mem::take(&mut self.constraints);
        for constraint in constraints {
            let single = match constraint.columns.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            };
            let folded = match constraint.kind {
                ConstraintKind::PrimaryKey if constraint.name == pkey_name(&table) => {
                    let all_present = constraint
                        .columns
                        .iter()
                        .all(|c| self.find_column(c).is_some());
                    if all_present {
                        for name in &constraint.columns {
                            if let Some(col) = self.find_column_mut(name) {
                                col.primary_key = true;
                                col.nullable = false;
                            }
                        }
                    }
                    all_present
                }
                ConstraintKind::Unique => match &single {
                    Some(c) if constraint.name == unique_key_name(&table, c) => {
                        match self.find_column_mut(c) {
                            Some(col) => {
                                col.unique = true;
                                true
                            }
                            None => false,
                        }
                    }
                    _ => false,
                },
                ConstraintKind::ForeignKey => match (&single, &constraint.references) {
                    (Some(c), Some(fk)) if constraint.name == fkey_name(&table, c) => {
                        match self.find_column_mut(c) {
                            Some(col) if col.references.is_none() => {
                                col.references = Some(fk.clone());
                                true
                            }
                            _ => false,
                        }
                    }
                    _ => false,
                },
                ConstraintKind::Check => {
                    let owner = self
                        .columns
                        .iter()
                        .position(|col| constraint.name == check_name(&table, &col.name));
                    match (owner, &constraint.expression) {
                        (Some(at), Some(expression)) if self.columns[at].check.is_none() => {
                            self.columns[at].check = Some(CheckConstraint {
                                name: None,
                                expression: expression.clone(),
                                expr: None,
                            });
                            true
                        }
                        _ => false,
                    }
                }
                _ => false,
            };
            if !folded {
                self.constraints.push(constraint);
            }
        }
    }
}

impl Column {
    /// Create a column from a raw type spelling; parameters are split off.
    pub fn new(name: impl Into<String>, data_type: &str) -> Self {
        let spec = parse_type_spec(data_type);
        Self {
            name: name.into(),
            data_type: spec.name,
            params: spec.params,
            nullable: true,
            ..Default::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, val: impl Into<String>) -> Self {
        self.default = Some(val.into());
        self
    }

    pub fn references(mut self, fk: ForeignKeyRef) -> Self {
        self.references = Some(fk);
        self
    }

    pub fn check(mut self, expression: impl Into<String>) -> Self {
        self.check = Some(CheckConstraint {
            name: None,
            expression: expression.into(),
            expr: None,
        });
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self.nullable = false;
        self
    }

    pub fn generated_stored(mut self, expression: impl Into<String>) -> Self {
        self.generated = Some(Generated {
            kind: GeneratedKind::Stored,
            expression: expression.into(),
            expr: None,
        });
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }

    pub fn id(mut self, tracking_id: impl Into<String>) -> Self {
        self.tracking_id = Some(tracking_id.into());
        self
    }

    /// Full SQL type including parameters, e.g. `character varying(255)`.
    pub fn sql_type(&self) -> String {
        crate::types::render_type(&self.data_type, &self.params)
    }

    pub fn is_array(&self) -> bool {
        self.data_type.ends_with("[]")
    }

    /// Sequence named by a `nextval('seq')` default, unqualified.
    pub fn default_sequence(&self) -> Option<String> {
        static NEXTVAL: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?i)nextval\s*\(\s*'([^']+)'").expect("nextval pattern")
        });
        let default = self.default.as_deref()?;
        let caps = NEXTVAL.captures(default)?;
        Some(crate::emit::quote::base_name(&caps[1]))
    }
}
