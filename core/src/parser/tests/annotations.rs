use pretty_assertions::assert_eq;

use crate::parser::parse_schema;

// ========================================================================
// Statement annotations
// ========================================================================

#[test]
fn test_annotation_on_line_before_statement() {
    let schema = parse_schema(
        "-- @id t00000000000a
CREATE TABLE a (id int);

-- Orders placed by users
-- @id t00000000000b
CREATE TABLE b (id int);",
    )
    .unwrap();
    assert_eq!(schema.tables[0].tracking_id.as_deref(), Some("t00000000000a"));
    assert_eq!(schema.tables[1].tracking_id.as_deref(), Some("t00000000000b"));
}

#[test]
fn test_annotation_after_semicolon_belongs_to_that_statement() {
    let schema = parse_schema(
        "CREATE TABLE a (id int); -- @id t00000000000a
CREATE TABLE b (id int);",
    )
    .unwrap();
    assert_eq!(schema.tables[0].tracking_id.as_deref(), Some("t00000000000a"));
    assert_eq!(schema.tables[1].tracking_id, None);
}

#[test]
fn test_unannotated_statements_have_no_id() {
    let schema = parse_schema("CREATE TABLE a (id int);\nCREATE TYPE mood AS ENUM ('ok');")
        .unwrap();
    assert_eq!(schema.tables[0].tracking_id, None);
    assert_eq!(schema.enums[0].tracking_id, None);
}

#[test]
fn test_annotations_on_other_statement_kinds() {
    let schema = parse_schema(
        "-- @id e00000000001
CREATE TYPE mood AS ENUM ('ok', 'meh');
-- @id q00000000001
CREATE SEQUENCE counter;
-- @id f00000000001
CREATE FUNCTION one() RETURNS int LANGUAGE sql AS $$ SELECT 1 $$;
-- @id v00000000001
CREATE VIEW ones AS SELECT one();",
    )
    .unwrap();
    assert_eq!(schema.enums[0].tracking_id.as_deref(), Some("e00000000001"));
    assert_eq!(schema.sequences[0].tracking_id.as_deref(), Some("q00000000001"));
    assert_eq!(schema.functions[0].tracking_id.as_deref(), Some("f00000000001"));
    assert_eq!(schema.views[0].tracking_id.as_deref(), Some("v00000000001"));
}

// ========================================================================
// Element annotations
// ========================================================================

#[test]
fn test_column_and_constraint_annotations() {
    let schema = parse_schema(
        "CREATE TABLE users ( -- @id t00000000001
    id uuid PRIMARY KEY, -- @id c00000000001
    \"Email\" text NOT NULL, -- @id c00000000002
    age int,
    CONSTRAINT users_age_adult CHECK (age >= 18) -- @id k00000000001
);",
    )
    .unwrap();
    let users = &schema.tables[0];
    assert_eq!(users.tracking_id.as_deref(), Some("t00000000001"));
    let ids: Vec<Option<&str>> = users
        .columns
        .iter()
        .map(|c| c.tracking_id.as_deref())
        .collect();
    assert_eq!(
        ids,
        vec![Some("c00000000001"), Some("c00000000002"), None]
    );
    assert_eq!(
        users.constraints[0].tracking_id.as_deref(),
        Some("k00000000001")
    );
}

#[test]
fn test_index_partition_and_late_constraint_annotations() {
    let schema = parse_schema(
        "CREATE TABLE users (id int PRIMARY KEY);
CREATE TABLE events (id int, user_id int, kind text) PARTITION BY LIST (kind);
-- @id p00000000001
CREATE TABLE events_today PARTITION OF events DEFAULT;
-- @id i00000000001
CREATE INDEX events_kind_idx ON events (kind);
-- @id k00000000001
ALTER TABLE events ADD CONSTRAINT events_user_fk FOREIGN KEY (user_id) REFERENCES users (id);",
    )
    .unwrap();
    let events = schema.find_table("events").unwrap();
    let partition = events.partition.as_ref().unwrap();
    assert_eq!(
        partition.children[0].tracking_id.as_deref(),
        Some("p00000000001")
    );
    assert_eq!(events.indexes[0].tracking_id.as_deref(), Some("i00000000001"));
    assert_eq!(
        events.constraints[0].tracking_id.as_deref(),
        Some("k00000000001")
    );
}
