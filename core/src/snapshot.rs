//! Snapshot store: the last schema state relq applied or pulled.
//!
//! The snapshot is a versioned JSON document in the repository directory.
//! It carries the tracking IDs that the live database cannot hold, so the
//! next diff can still tell renames from drop-and-add pairs.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::schema::{
    Collation, CompositeType, Domain, EnumType, ForeignTable, Function, Schema, Sequence, Table,
    Trigger, View,
};

/// Current snapshot document version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// File name of the snapshot inside the repository directory.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Persisted schema state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrations_table: Option<String>,
    /// Tables keyed by name, `namespace.name` when qualified.
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
    #[serde(default)]
    pub enums: Vec<EnumType>,
    #[serde(default)]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub composite_types: Vec<CompositeType>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
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
    /// Names of the migrations recorded when the snapshot was taken.
    #[serde(default)]
    pub applied_migrations: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn table_key(table: &Table) -> String {
    match &table.schema {
        Some(ns) => format!("{ns}.{}", table.name),
        None => table.name.clone(),
    }
}

impl Snapshot {
    /// Capture `schema` as of now.
    pub fn from_schema(schema: &Schema) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            database: None,
            migrations_table: None,
            tables: schema
                .tables
                .iter()
                .map(|t| (table_key(t), t.clone()))
                .collect(),
            enums: schema.enums.clone(),
            domains: schema.domains.clone(),
            composite_types: schema.composite_types.clone(),
            sequences: schema.sequences.clone(),
            views: schema.views.clone(),
            materialized_views: schema.materialized_views.clone(),
            functions: schema.functions.clone(),
            triggers: schema.triggers.clone(),
            foreign_tables: schema.foreign_tables.clone(),
            collations: schema.collations.clone(),
            applied_migrations: Vec::new(),
            extensions: schema.extensions.clone(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_migrations(mut self, table: impl Into<String>, applied: Vec<String>) -> Self {
        self.migrations_table = Some(table.into());
        self.applied_migrations = applied;
        self
    }

    /// The schema model held by this snapshot. Tables come back in key order.
    pub fn to_schema(&self) -> Schema {
        Schema {
            extensions: self.extensions.clone(),
            enums: self.enums.clone(),
            domains: self.domains.clone(),
            composite_types: self.composite_types.clone(),
            sequences: self.sequences.clone(),
            tables: self.tables.values().cloned().collect(),
            views: self.views.clone(),
            materialized_views: self.materialized_views.clone(),
            functions: self.functions.clone(),
            triggers: self.triggers.clone(),
            foreign_tables: self.foreign_tables.clone(),
            collations: self.collations.clone(),
        }
    }

    /// Load a snapshot. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!(path = %path.display(), "no snapshot yet");
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    /// Atomic write: `<file>.tmp` first, then rename over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, &content)?;
        debug!(path = %path.display(), tables = self.tables.len(), "snapshot saved");
        Ok(())
    }
}

/// Write `content` to `<path>.tmp` and rename it into place, creating parent directories.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}
