//! Live schema introspection for PostgreSQL.
//!
//! The catalog is read into plain rows, rendered back as DDL (using the
//! server's own `pg_get_*def` deparsers where they exist) and parsed with
//! the same parser as the desired source, so both sides normalize alike.

use std::path::Path;

use relq_core::emit::quote::{quote_ident, quote_literal};
use relq_core::parser::parse_source;
use relq_core::schema::Schema;
use relq_core::{RelqError, Result};
use sqlx::{PgConnection, Row};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ColumnRow {
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// `a` (always), `d` (by default) or empty.
    pub identity: String,
    /// `s` for stored generated columns, else empty.
    pub generated: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceRow {
    pub name: String,
    pub data_type: String,
    pub start: i64,
    pub increment: i64,
    pub min: i64,
    pub max: i64,
    pub cache: i64,
    pub cycle: bool,
    pub owned_by: Option<(String, String)>,
}

/// Everything read from the catalog, one schema (`current_schema()`).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub extensions: Vec<String>,
    pub enums: Vec<(String, Vec<String>)>,
    pub sequences: Vec<SequenceRow>,
    pub tables: Vec<(String, Option<String>)>,
    pub columns: Vec<ColumnRow>,
    /// `(table, name, definition)` from `pg_get_constraintdef`.
    pub constraints: Vec<(String, String, String)>,
    /// `(table, name, CREATE INDEX ..., comment)` from `pg_get_indexdef`.
    pub indexes: Vec<(String, String, String, Option<String>)>,
    /// `(name, query, materialized)`.
    pub views: Vec<(String, String, bool)>,
    pub functions: Vec<String>,
    /// `(table, CREATE TRIGGER ...)`.
    pub triggers: Vec<(String, String)>,
}

fn introspection_error(e: sqlx::Error) -> RelqError {
    RelqError::Introspection(e.to_string())
}

/// Read the live schema, leaving out `hidden` tables.
pub async fn introspect(conn: &mut PgConnection, hidden: &[String]) -> Result<Schema> {
    let catalog = read_catalog(conn).await.map_err(introspection_error)?;
    let catalog = catalog.without_tables(hidden);
    debug!(
        tables = catalog.tables.len(),
        enums = catalog.enums.len(),
        functions = catalog.functions.len(),
        "read catalog"
    );
    let sql = catalog.to_sql();
    let parsed = parse_source(&sql, Path::new("<database>"))
        .map_err(|e| RelqError::Introspection(format!("cannot read catalog DDL: {e}")))?;
    for skipped in &parsed.skipped {
        debug!(statement = %skipped.statement, "catalog statement not modelled");
    }
    Ok(parsed.schema)
}

async fn read_catalog(conn: &mut PgConnection) -> std::result::Result<Catalog, sqlx::Error> {
    let mut catalog = Catalog::default();

    catalog.extensions = sqlx::query_scalar(
        "SELECT extname::text FROM pg_extension WHERE extname <> 'plpgsql' ORDER BY extname",
    )
    .fetch_all(&mut *conn)
    .await?;

    let rows = sqlx::query(
        "SELECT t.typname::text AS name, array_agg(e.enumlabel::text ORDER BY e.enumsortorder) AS labels
         FROM pg_type t
         JOIN pg_enum e ON e.enumtypid = t.oid
         JOIN pg_namespace n ON n.oid = t.typnamespace
         WHERE n.nspname = current_schema()
         GROUP BY t.typname
         ORDER BY t.typname",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        catalog.enums.push((row.try_get("name")?, row.try_get("labels")?));
    }

    let rows = sqlx::query(
        "SELECT c.relname::text AS name, obj_description(c.oid, 'pg_class') AS comment
         FROM pg_class c
         JOIN pg_namespace n ON n.oid = c.relnamespace
         WHERE n.nspname = current_schema() AND c.relkind IN ('r', 'p') AND NOT c.relispartition
         ORDER BY c.relname",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        catalog.tables.push((row.try_get("name")?, row.try_get("comment")?));
    }

    let rows = sqlx::query(
        "SELECT c.relname::text AS table_name, a.attname::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type, a.attnotnull AS not_null,
                pg_get_expr(ad.adbin, ad.adrelid) AS default_expr,
                a.attidentity::text AS identity, a.attgenerated::text AS generated,
                col_description(c.oid, a.attnum) AS comment
         FROM pg_attribute a
         JOIN pg_class c ON c.oid = a.attrelid
         JOIN pg_namespace n ON n.oid = c.relnamespace
         LEFT JOIN pg_attrdef ad ON ad.adrelid = a.attrelid AND ad.adnum = a.attnum
         WHERE n.nspname = current_schema() AND c.relkind IN ('r', 'p') AND NOT c.relispartition
           AND a.attnum > 0 AND NOT a.attisdropped
         ORDER BY c.relname, a.attnum",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        catalog.columns.push(ColumnRow {
            table: row.try_get("table_name")?,
            name: row.try_get("column_name")?,
            data_type: row.try_get("data_type")?,
            not_null: row.try_get("not_null")?,
            default: row.try_get("default_expr")?,
            identity: row.try_get("identity")?,
            generated: row.try_get("generated")?,
            comment: row.try_get("comment")?,
        });
    }

    let rows = sqlx::query(
        "SELECT c.relname::text AS name, format_type(s.seqtypid, NULL) AS data_type,
                s.seqstart, s.seqincrement, s.seqmin, s.seqmax, s.seqcache, s.seqcycle,
                d.deptype::text AS deptype, ot.relname::text AS owned_table, oa.attname::text AS owned_column
         FROM pg_sequence s
         JOIN pg_class c ON c.oid = s.seqrelid
         JOIN pg_namespace n ON n.oid = c.relnamespace
         LEFT JOIN pg_depend d ON d.objid = c.oid AND d.classid = 'pg_class'::regclass
              AND d.refclassid = 'pg_class'::regclass AND d.deptype IN ('a', 'i')
         LEFT JOIN pg_class ot ON ot.oid = d.refobjid
         LEFT JOIN pg_attribute oa ON oa.attrelid = d.refobjid AND oa.attnum = d.refobjsubid
         WHERE n.nspname = current_schema()
         ORDER BY c.relname",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        let deptype: Option<String> = row.try_get("deptype")?;
        // Identity sequences belong to their column.
        if deptype.as_deref() == Some("i") {
            continue;
        }
        let owned_table: Option<String> = row.try_get("owned_table")?;
        let owned_column: Option<String> = row.try_get("owned_column")?;
        catalog.sequences.push(SequenceRow {
            name: row.try_get("name")?,
            data_type: row.try_get("data_type")?,
            start: row.try_get("seqstart")?,
            increment: row.try_get("seqincrement")?,
            min: row.try_get("seqmin")?,
            max: row.try_get("seqmax")?,
            cache: row.try_get("seqcache")?,
            cycle: row.try_get("seqcycle")?,
            owned_by: owned_table.zip(owned_column),
        });
    }

    let rows = sqlx::query(
        "SELECT c.relname::text AS table_name, con.conname::text AS name,
                pg_get_constraintdef(con.oid, true) AS definition
         FROM pg_constraint con
         JOIN pg_class c ON c.oid = con.conrelid
         JOIN pg_namespace n ON n.oid = c.relnamespace
         WHERE n.nspname = current_schema() AND c.relkind IN ('r', 'p') AND NOT c.relispartition
           AND con.contype IN ('p', 'u', 'c', 'f', 'x')
         ORDER BY c.relname, con.contype, con.conname",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        catalog.constraints.push((
            row.try_get("table_name")?,
            row.try_get("name")?,
            row.try_get("definition")?,
        ));
    }

    let rows = sqlx::query(
        "SELECT t.relname::text AS table_name, i.relname::text AS name,
                pg_get_indexdef(i.oid) AS definition,
                obj_description(i.oid, 'pg_class') AS comment
         FROM pg_index x
         JOIN pg_class i ON i.oid = x.indexrelid
         JOIN pg_class t ON t.oid = x.indrelid
         JOIN pg_namespace n ON n.oid = t.relnamespace
         WHERE n.nspname = current_schema() AND t.relkind IN ('r', 'p') AND NOT t.relispartition
           AND NOT EXISTS (
               SELECT 1 FROM pg_constraint con
               WHERE con.conindid = x.indexrelid AND con.contype IN ('p', 'u', 'x'))
         ORDER BY t.relname, i.relname",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        catalog.indexes.push((
            row.try_get("table_name")?,
            row.try_get("name")?,
            row.try_get("definition")?,
            row.try_get("comment")?,
        ));
    }

    let rows = sqlx::query(
        "SELECT c.relname::text AS name, pg_get_viewdef(c.oid, true) AS definition,
                c.relkind = 'm' AS materialized
         FROM pg_class c
         JOIN pg_namespace n ON n.oid = c.relnamespace
         WHERE n.nspname = current_schema() AND c.relkind IN ('v', 'm')
         ORDER BY c.relname",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        catalog.views.push((
            row.try_get("name")?,
            row.try_get("definition")?,
            row.try_get("materialized")?,
        ));
    }

    // Functions installed by extensions are left out.
    catalog.functions = sqlx::query_scalar(
        "SELECT pg_get_functiondef(p.oid)
         FROM pg_proc p
         JOIN pg_namespace n ON n.oid = p.pronamespace
         WHERE n.nspname = current_schema() AND p.prokind IN ('f', 'p')
           AND NOT EXISTS (
               SELECT 1 FROM pg_depend d WHERE d.objid = p.oid AND d.deptype = 'e')
         ORDER BY p.proname, p.oid",
    )
    .fetch_all(&mut *conn)
    .await?;

    let rows = sqlx::query(
        "SELECT c.relname::text AS table_name, pg_get_triggerdef(t.oid, true) AS definition
         FROM pg_trigger t
         JOIN pg_class c ON c.oid = t.tgrelid
         JOIN pg_namespace n ON n.oid = c.relnamespace
         WHERE n.nspname = current_schema() AND NOT t.tgisinternal AND NOT c.relispartition
         ORDER BY c.relname, t.tgname",
    )
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        catalog
            .triggers
            .push((row.try_get("table_name")?, row.try_get("definition")?));
    }

    Ok(catalog)
}

/// `nextval('name'::regclass)` names this sequence.
fn is_serial_default(default: Option<&str>, sequence: &str) -> bool {
    default.is_some_and(|d| {
        d.starts_with("nextval(")
            && (d.contains(&format!("'{sequence}'")) || d.contains(&format!("'\"{sequence}\"'")))
    })
}

impl Catalog {
    fn without_tables(mut self, hidden: &[String]) -> Self {
        let hide = |t: &str| hidden.iter().any(|h| h == t);
        self.tables.retain(|(t, _)| !hide(t));
        self.columns.retain(|c| !hide(&c.table));
        self.constraints.retain(|(t, _, _)| !hide(t));
        self.indexes.retain(|(t, _, _, _)| !hide(t));
        self.triggers.retain(|(t, _)| !hide(t));
        self.sequences
            .retain(|s| !s.owned_by.as_ref().is_some_and(|(t, _)| hide(t)));
        self
    }

    /// Sequences created implicitly by `serial` columns.
    fn is_serial_sequence(&self, sequence: &SequenceRow) -> bool {
        let Some((table, column)) = &sequence.owned_by else {
            return false;
        };
        self.columns
            .iter()
            .find(|c| &c.table == table && &c.name == column)
            .is_some_and(|c| is_serial_default(c.default.as_deref(), &sequence.name))
    }

    /// Render the catalog as DDL the schema parser understands.
    pub fn to_sql(&self) -> String {
        let mut out = Vec::new();

        for ext in &self.extensions {
            out.push(format!("CREATE EXTENSION IF NOT EXISTS {};", quote_ident(ext)));
        }
        for (name, labels) in &self.enums {
            let labels: Vec<String> = labels.iter().map(|l| quote_literal(l)).collect();
            out.push(format!(
                "CREATE TYPE {} AS ENUM ({});",
                quote_ident(name),
                labels.join(", ")
            ));
        }
        for seq in &self.sequences {
            if self.is_serial_sequence(seq) {
                continue;
            }
            let mut sql = format!(
                "CREATE SEQUENCE {} AS {} INCREMENT BY {} MINVALUE {} MAXVALUE {} START WITH {} CACHE {}",
                quote_ident(&seq.name),
                seq.data_type,
                seq.increment,
                seq.min,
                seq.max,
                seq.start,
                seq.cache
            );
            if seq.cycle {
                sql.push_str(" CYCLE");
            }
            sql.push(';');
            out.push(sql);
        }

        for (table, comment) in &self.tables {
            let columns: Vec<String> = self
                .columns
                .iter()
                .filter(|c| &c.table == table)
                .map(column_sql)
                .collect();
            out.push(format!(
                "CREATE TABLE {} (\n    {}\n);",
                quote_ident(table),
                columns.join(",\n    ")
            ));
            if let Some(comment) = comment {
                out.push(format!(
                    "COMMENT ON TABLE {} IS {};",
                    quote_ident(table),
                    quote_literal(comment)
                ));
            }
            for col in self.columns.iter().filter(|c| &c.table == table) {
                if let Some(comment) = &col.comment {
                    out.push(format!(
                        "COMMENT ON COLUMN {}.{} IS {};",
                        quote_ident(table),
                        quote_ident(&col.name),
                        quote_literal(comment)
                    ));
                }
            }
        }

        for seq in &self.sequences {
            if let (false, Some((table, column))) = (self.is_serial_sequence(seq), &seq.owned_by) {
                out.push(format!(
                    "ALTER SEQUENCE {} OWNED BY {}.{};",
                    quote_ident(&seq.name),
                    quote_ident(table),
                    quote_ident(column)
                ));
            }
        }
        for (table, name, definition) in &self.constraints {
            out.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {};",
                quote_ident(table),
                quote_ident(name),
                definition
            ));
        }
        for (_, name, definition, comment) in &self.indexes {
            out.push(format!("{definition};"));
            if let Some(comment) = comment {
                out.push(format!(
                    "COMMENT ON INDEX {} IS {};",
                    quote_ident(name),
                    quote_literal(comment)
                ));
            }
        }
        for (name, query, materialized) in &self.views {
            let kind = if *materialized { "MATERIALIZED VIEW" } else { "VIEW" };
            out.push(format!(
                "CREATE {kind} {} AS {};",
                quote_ident(name),
                query.trim().trim_end_matches(';')
            ));
        }
        for function in &self.functions {
            out.push(format!("{};", function.trim_end()));
        }
        for (_, trigger) in &self.triggers {
            out.push(format!("{trigger};"));
        }

        out.join("\n\n")
    }
}

fn column_sql(col: &ColumnRow) -> String {
    let mut sql = format!("{} {}", quote_ident(&col.name), col.data_type);
    match (col.generated.as_str(), col.default.as_deref()) {
        ("s", Some(expr)) => sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) STORED")),
        (_, Some(default)) => sql.push_str(&format!(" DEFAULT {default}")),
        _ => {}
    }
    match col.identity.as_str() {
        "a" => sql.push_str(" GENERATED ALWAYS AS IDENTITY"),
        "d" => sql.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
        _ => {}
    }
    if col.not_null {
        sql.push_str(" NOT NULL");
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relq_core::parser::parse_schema;

    fn column(table: &str, name: &str, data_type: &str) -> ColumnRow {
        ColumnRow {
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
            ..ColumnRow::default()
        }
    }

    fn catalog() -> Catalog {
        Catalog {
            extensions: vec!["pgcrypto".into()],
            enums: vec![("status".into(), vec!["active".into(), "gone".into()])],
            sequences: vec![SequenceRow {
                name: "users_id_seq".into(),
                data_type: "integer".into(),
                start: 1,
                increment: 1,
                min: 1,
                max: 2147483647,
                cache: 1,
                cycle: false,
                owned_by: Some(("users".into(), "id".into())),
            }],
            tables: vec![("users".into(), Some("people".into())), ("posts".into(), None)],
            columns: vec![
                ColumnRow {
                    not_null: true,
                    default: Some("nextval('users_id_seq'::regclass)".into()),
                    ..column("users", "id", "integer")
                },
                ColumnRow {
                    not_null: true,
                    ..column("users", "email", "character varying(255)")
                },
                ColumnRow {
                    default: Some("'active'::status".into()),
                    ..column("users", "state", "status")
                },
                ColumnRow {
                    not_null: true,
                    identity: "a".into(),
                    ..column("posts", "id", "bigint")
                },
                column("posts", "user_id", "integer"),
            ],
            constraints: vec![
                ("posts".into(), "posts_pkey".into(), "PRIMARY KEY (id)".into()),
                (
                    "posts".into(),
                    "posts_user_id_fkey".into(),
                    "FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE".into(),
                ),
                ("users".into(), "users_pkey".into(), "PRIMARY KEY (id)".into()),
                ("users".into(), "users_email_key".into(), "UNIQUE (email)".into()),
            ],
            indexes: vec![(
                "posts".into(),
                "posts_user_idx".into(),
                "CREATE INDEX posts_user_idx ON public.posts USING btree (user_id)".into(),
                None,
            )],
            views: vec![(
                "active_users".into(),
                " SELECT users.id\n   FROM users\n  WHERE users.state = 'active'::status;".into(),
                false,
            )],
            functions: Vec::new(),
            triggers: Vec::new(),
        }
    }

    #[test]
    fn test_catalog_parses_into_schema() {
        let schema = parse_schema(&catalog().to_sql()).unwrap();
        assert_eq!(schema.extensions, vec!["pgcrypto".to_string()]);
        assert_eq!(schema.enums[0].values, vec!["active", "gone"]);
        // users_id_seq backs a serial-style default, not a standalone sequence.
        assert!(schema.sequences.is_empty());

        let users = schema.find_table("users").unwrap();
        assert_eq!(users.comment.as_deref(), Some("people"));
        let id = users.find_column("id").unwrap();
        assert!(id.primary_key);
        assert!(users.find_column("email").unwrap().unique);

        let posts = schema.find_table("posts").unwrap();
        let fk = posts.find_column("user_id").unwrap().references.as_ref().unwrap();
        assert_eq!(fk.table, "users");
        assert_eq!(posts.indexes.len(), 1);
        assert_eq!(schema.views.len(), 1);
    }

    #[test]
    fn test_hidden_tables_are_dropped() {
        let mut catalog = catalog();
        catalog.tables.push(("_relq_history".into(), None));
        catalog.columns.push(column("_relq_history", "id", "integer"));
        catalog.indexes.push((
            "_relq_history".into(),
            "_relq_history_idx".into(),
            "CREATE INDEX _relq_history_idx ON public._relq_history USING btree (id)".into(),
            None,
        ));
        let catalog = catalog.without_tables(&["_relq_history".to_string()]);
        assert!(!catalog.to_sql().contains("_relq_history"));
    }

    #[test]
    fn test_standalone_sequence_is_kept() {
        let mut catalog = catalog();
        catalog.sequences[0].owned_by = None;
        let sql = catalog.to_sql();
        assert!(sql.contains("CREATE SEQUENCE \"users_id_seq\" AS integer"));
        let schema = parse_schema(&sql).unwrap();
        assert_eq!(schema.sequences.len(), 1);
    }

    #[test]
    fn test_serial_default_detection() {
        assert!(is_serial_default(Some("nextval('a_id_seq'::regclass)"), "a_id_seq"));
        assert!(is_serial_default(Some("nextval('\"A_id_seq\"'::regclass)"), "A_id_seq"));
        assert!(!is_serial_default(Some("0"), "a_id_seq"));
        assert!(!is_serial_default(None, "a_id_seq"));
    }
}
