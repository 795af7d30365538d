//! Schema model back to annotated DDL source.
//!
//! `pull` and `import` write their result through here. The output reads
//! back through [`super::parse_schema`] into the same model, tracking IDs
//! included.

use crate::emit::ddl;
use crate::emit::{defer_forward_references, dependency_order};
use crate::schema::{Schema, Table};

/// Output options for [`render_schema_sql`].
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Comment lines written at the top, without the `-- ` prefix.
    pub header: Vec<String>,
    /// Write `-- @id` annotations.
    pub tracking_ids: bool,
}

struct Writer<'a> {
    out: String,
    options: &'a RenderOptions,
}

impl Writer<'_> {
    fn section(&mut self, title: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out.push_str(&format!("-- {title}\n"));
    }

    fn statement(&mut self, id: Option<&str>, sql: &str) {
        if let (true, Some(id)) = (self.options.tracking_ids, id) {
            self.out.push_str(&format!("-- @id {id}\n"));
        }
        self.out.push_str(sql);
        self.out.push('\n');
    }
}

/// Render `schema` as a DDL source file.
///
/// ```
/// use relq_core::parser::{RenderOptions, parse_schema, render_schema_sql};
/// use relq_core::schema::{Column, Schema, Table};
///
/// let schema = Schema::new().table(
///     Table::new("users")
///         .id("t000000000001")
///         .column(Column::new("id", "uuid").primary_key().id("c000000000001")),
/// );
/// let options = RenderOptions { tracking_ids: true, ..RenderOptions::default() };
/// let sql = render_schema_sql(&schema, &options);
/// assert!(sql.contains("-- @id t000000000001\nCREATE TABLE \"users\""));
/// assert_eq!(parse_schema(&sql).unwrap(), schema);
/// ```
pub fn render_schema_sql(schema: &Schema, options: &RenderOptions) -> String {
    let mut w = Writer {
        out: String::new(),
        options,
    };
    for line in &options.header {
        w.out.push_str(&format!("-- {line}\n"));
    }

    if !schema.extensions.is_empty() {
        w.section("Extensions");
        for ext in &schema.extensions {
            w.statement(None, &ddl::create_extension(ext));
        }
    }
    if !schema.collations.is_empty() {
        w.section("Collations");
        for c in &schema.collations {
            w.statement(c.tracking_id.as_deref(), &ddl::create_collation(c));
        }
    }
    if !schema.enums.is_empty() || !schema.domains.is_empty() || !schema.composite_types.is_empty()
    {
        w.section("Types");
        for e in &schema.enums {
            w.statement(e.tracking_id.as_deref(), &ddl::create_enum(e));
        }
        for d in &schema.domains {
            w.statement(d.tracking_id.as_deref(), &ddl::create_domain(d));
        }
        for c in &schema.composite_types {
            w.statement(c.tracking_id.as_deref(), &ddl::create_composite(c));
        }
    }
    if !schema.sequences.is_empty() {
        w.section("Sequences");
        for s in &schema.sequences {
            w.statement(s.tracking_id.as_deref(), &ddl::create_sequence(s));
        }
    }

    if !schema.tables.is_empty() {
        w.section("Tables");
        let tables: Vec<&Table> = schema.tables.iter().collect();
        let ordered = dependency_order(&tables);
        let deferred = defer_forward_references(&ordered);
        for (i, (table, (create, _))) in ordered.iter().zip(&deferred).enumerate() {
            if i > 0 {
                w.out.push('\n');
            }
            w.statement(
                table.tracking_id.as_deref(),
                &ddl::create_table_annotated(create, options.tracking_ids),
            );
            if let Some(partition) = &table.partition {
                for child in &partition.children {
                    w.statement(
                        child.tracking_id.as_deref(),
                        &ddl::create_partition_child(table, child),
                    );
                }
            }
            for index in &table.indexes {
                w.statement(index.tracking_id.as_deref(), &ddl::create_index(table, index));
            }
        }

        let foreign_keys: Vec<_> = ordered
            .iter()
            .zip(&deferred)
            .flat_map(|(t, (_, late))| {
                ddl::table_foreign_keys(t).chain(late).map(move |fk| (*t, fk))
            })
            .collect();
        if !foreign_keys.is_empty() {
            w.section("Foreign keys");
            for (table, fk) in foreign_keys {
                w.statement(fk.tracking_id.as_deref(), &ddl::add_constraint(table, fk));
            }
        }

        let mut comments = Vec::new();
        for table in &ordered {
            if let Some(c) = &table.comment {
                comments.push(ddl::comment_on_table(table, Some(c)));
            }
            for col in &table.columns {
                if let Some(c) = &col.comment {
                    comments.push(ddl::comment_on_column(table, &col.name, Some(c)));
                }
            }
            for idx in &table.indexes {
                if let Some(c) = &idx.comment {
                    comments.push(ddl::comment_on_index(table, &idx.name, Some(c)));
                }
            }
        }
        if !comments.is_empty() {
            w.section("Comments");
            for c in comments {
                w.statement(None, &c);
            }
        }
    }

    if !schema.views.is_empty() || !schema.materialized_views.is_empty() {
        w.section("Views");
        for v in schema.views.iter().chain(&schema.materialized_views) {
            w.statement(v.tracking_id.as_deref(), &ddl::create_view(v));
        }
    }
    if !schema.functions.is_empty() {
        w.section("Functions");
        for f in &schema.functions {
            w.statement(f.tracking_id.as_deref(), &ddl::create_function(f));
        }
    }
    if !schema.triggers.is_empty() {
        w.section("Triggers");
        for t in &schema.triggers {
            w.statement(t.tracking_id.as_deref(), &ddl::create_trigger(t));
        }
    }
    if !schema.foreign_tables.is_empty() {
        w.section("Foreign tables");
        for t in &schema.foreign_tables {
            w.statement(t.tracking_id.as_deref(), &ddl::create_foreign_table(t));
        }
    }

    let owned: Vec<_> = schema
        .sequences
        .iter()
        .filter(|s| s.owned_by.is_some())
        .collect();
    if !owned.is_empty() {
        w.section("Sequence ownership");
        for s in owned {
            w.statement(None, &ddl::sequence_owned_by(s));
        }
    }
    w.out
}
