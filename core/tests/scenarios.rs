//! End-to-end diff and emit scenarios on small schemas.

use pretty_assertions::assert_eq;
use relq_core::diff::diff_schemas;
use relq_core::emit::{self, is_comment_only};
use relq_core::ignore::IgnoreSet;
use relq_core::parser::parse_schema;
use relq_core::schema::{Column, EnumType, ForeignKeyRef, Schema, Table};

fn users(second: &str) -> Schema {
    Schema::new().table(
        Table::new("users")
            .id("t00000000001")
            .column(Column::new("id", "uuid").primary_key().id("c00000000001"))
            .column(Column::new(second, "text").id("c00000000002")),
    )
}

#[test]
fn test_rename_column_by_tracking_id() {
    let changes = diff_schemas(&users("name"), &users("full_name"));
    assert_eq!(changes.columns.renamed.len(), 1);
    assert!(changes.columns.added.is_empty());
    assert!(changes.columns.removed.is_empty());

    let sql = emit::generate(&changes);
    assert_eq!(
        sql.up(),
        vec![r#"ALTER TABLE "users" RENAME COLUMN "name" TO "full_name";"#.to_string()]
    );
    assert_eq!(
        sql.down(),
        vec![r#"ALTER TABLE "users" RENAME COLUMN "full_name" TO "name";"#.to_string()]
    );
}

#[test]
fn test_add_not_null_with_default() {
    let old = Schema::new().table(Table::new("users").column(Column::new("email", "VARCHAR(255)")));
    let new = Schema::new().table(
        Table::new("users").column(Column::new("email", "VARCHAR(255)").not_null().default("''")),
    );
    let changes = diff_schemas(&old, &new);
    let fields: Vec<&str> = changes.columns.modified[0]
        .changes
        .iter()
        .map(|c| c.field.as_str())
        .collect();
    assert!(!fields.contains(&"type"));

    let sql = emit::generate(&changes);
    assert_eq!(
        sql.up(),
        vec![
            r#"ALTER TABLE "users" ALTER COLUMN "email" SET DEFAULT '';"#.to_string(),
            r#"ALTER TABLE "users" ALTER COLUMN "email" SET NOT NULL;"#.to_string(),
        ]
    );
    assert_eq!(
        sql.down(),
        vec![
            r#"ALTER TABLE "users" ALTER COLUMN "email" DROP DEFAULT;"#.to_string(),
            r#"ALTER TABLE "users" ALTER COLUMN "email" DROP NOT NULL;"#.to_string(),
        ]
    );
}

#[test]
fn test_enum_value_addition_is_irreversible() {
    let old = Schema::new().enum_type(EnumType::new("status", &["a", "b"]));
    let new = Schema::new().enum_type(EnumType::new("status", &["a", "b", "c"]));
    let sql = emit::generate(&diff_schemas(&old, &new));
    assert_eq!(
        sql.up(),
        vec![r#"ALTER TYPE "status" ADD VALUE IF NOT EXISTS 'c';"#.to_string()]
    );
    let down = sql.down();
    assert_eq!(down.len(), 1);
    assert!(is_comment_only(&down[0]));
    assert!(down[0].contains("cannot be removed"));
}

#[test]
fn test_strip_destructive_leaves_additive_changes() {
    let old = Schema::new()
        .table(Table::new("x").column(Column::new("id", "int")))
        .table(
            Table::new("y")
                .column(Column::new("id", "int"))
                .column(Column::new("z", "int")),
        );
    let new = Schema::new()
        .table(
            Table::new("y")
                .column(Column::new("id", "bigint"))
                .column(Column::new("w", "text")),
        )
        .table(Table::new("v").column(Column::new("id", "int")));

    let changes = diff_schemas(&old, &new);
    assert!(changes.has_destructive());
    let stripped = changes.strip_destructive();
    assert!(!stripped.has_destructive());
    assert!(stripped.tables.removed.is_empty());
    assert!(stripped.columns.removed.is_empty());
    assert_eq!(stripped.tables.added.len(), 1);
    assert_eq!(stripped.columns.added.len(), 1);
    assert_eq!(stripped.columns.modified.len(), 1);

    let up = emit::generate(&stripped).up();
    assert!(up.iter().all(|s| !s.contains("DROP TABLE") && !s.contains("DROP COLUMN")));
}

#[test]
fn test_foreign_key_ordering() {
    let new = Schema::new()
        .table(
            Table::new("A")
                .column(Column::new("id", "int").primary_key())
                .column(Column::new("b_id", "int").references(ForeignKeyRef::new("B", "id"))),
        )
        .table(Table::new("B").column(Column::new("id", "int").primary_key()));
    let up = emit::generate(&diff_schemas(&Schema::new(), &new)).up();
    let position = |prefix: &str| up.iter().position(|s| s.starts_with(prefix));
    let create_b = position(r#"CREATE TABLE "B""#).unwrap();
    let create_a = position(r#"CREATE TABLE "A""#).unwrap();
    assert!(create_b < create_a);
}

#[test]
fn test_table_level_foreign_key_follows_both_tables() {
    let new = parse_schema(
        r#"
        CREATE TABLE a (id int PRIMARY KEY, b_id int);
        CREATE TABLE b (id int PRIMARY KEY);
        ALTER TABLE a ADD CONSTRAINT a_b_fk FOREIGN KEY (b_id) REFERENCES b (id);
        "#,
    )
    .unwrap();
    let up = emit::generate(&diff_schemas(&Schema::new(), &new)).up();
    let fk = up.iter().position(|s| s.contains("ADD CONSTRAINT \"a_b_fk\"")).unwrap();
    let last_create = up.iter().rposition(|s| s.starts_with("CREATE TABLE")).unwrap();
    assert!(fk > last_create);
    assert_eq!(fk, up.len() - 1);
}

#[test]
fn test_reference_cycle_between_new_tables() {
    let new = parse_schema(
        r#"
        CREATE TABLE a (id int PRIMARY KEY, c_id int REFERENCES c (id));
        CREATE TABLE b (id int PRIMARY KEY, a_id int REFERENCES a (id));
        CREATE TABLE c (id int PRIMARY KEY, b_id int REFERENCES b (id));
        "#,
    )
    .unwrap();
    let up = emit::generate(&diff_schemas(&Schema::new(), &new)).up();

    let mut created: Vec<&str> = Vec::new();
    for stmt in &up {
        if let Some(rest) = stmt.strip_prefix("CREATE TABLE \"") {
            for target in ["a", "b", "c"] {
                if stmt.contains(&format!("REFERENCES \"{target}\"")) {
                    assert!(created.contains(&target), "{stmt}");
                }
            }
            created.push(&rest[..1]);
        }
    }
    assert_eq!(created.len(), 3);
    assert!(up.last().unwrap().contains("ADD CONSTRAINT \"a_c_id_fkey\" FOREIGN KEY (\"c_id\")"));
}

#[test]
fn test_column_ignore_pattern_is_scoped_to_its_table() {
    let with_hash = |t: &str| {
        Table::new(t)
            .column(Column::new("id", "int"))
            .column(Column::new("password_hash", "text"))
    };
    let old = Schema::new().table(with_hash("users")).table(with_hash("admins"));
    let new = Schema::new()
        .table(Table::new("users").column(Column::new("id", "int")))
        .table(Table::new("admins").column(Column::new("id", "int")));

    let ignore = IgnoreSet::parse("COLUMN:users.password_hash\n");
    let changes = ignore.filter_changes(diff_schemas(&old, &new));
    let removed: Vec<(String, String)> = changes
        .columns
        .removed
        .iter()
        .map(|i| (i.parent.as_ref().unwrap().name.clone(), i.item.name.clone()))
        .collect();
    assert_eq!(removed, vec![("admins".to_string(), "password_hash".to_string())]);
}
