use pretty_assertions::assert_eq;

use crate::parser::{RenderOptions, parse_schema, render_schema_sql};
use crate::schema::Schema;

// Tables are listed in the order the renderer writes them: dependencies
// first, otherwise as written.
const SOURCE: &str = r#"
CREATE EXTENSION IF NOT EXISTS pgcrypto;

-- @id l00000000001
CREATE COLLATION german (provider = icu, locale = 'de-DE', deterministic = false);

-- @id e00000000001
CREATE TYPE mood AS ENUM ('happy', 'sad');
-- @id d00000000001
CREATE DOMAIN positive_int AS integer DEFAULT 1 NOT NULL CHECK (VALUE > 0);
-- @id y00000000001
CREATE TYPE address AS (street text, zip varchar(10));

-- @id q00000000001
CREATE SEQUENCE invoice_seq AS bigint INCREMENT BY 2 START WITH 1000 CACHE 5;

-- @id t00000000004
CREATE TABLE events (
    id bigint NOT NULL, -- @id c00000000031
    created_at date NOT NULL -- @id c00000000032
) PARTITION BY RANGE (created_at);
-- @id p00000000001
CREATE TABLE events_2024 PARTITION OF events FOR VALUES FROM ('2024-01-01') TO ('2025-01-01');

-- @id t00000000001
CREATE TABLE users (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(), -- @id c00000000001
    email varchar(255) NOT NULL UNIQUE, -- @id c00000000002
    current_mood mood, -- @id c00000000003
    tags text[] NOT NULL DEFAULT '{}', -- @id c00000000004
    created_at timestamptz NOT NULL DEFAULT now() -- @id c00000000005
);
-- @id i00000000001
CREATE INDEX users_tags_idx ON users USING gin (tags);

-- @id t00000000002
CREATE TABLE orders (
    id bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, -- @id c00000000011
    user_id uuid NOT NULL REFERENCES users (id) MATCH FULL ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED, -- @id c00000000012
    invoice bigint DEFAULT nextval('invoice_seq'), -- @id c00000000013
    price numeric(10,2) NOT NULL, -- @id c00000000014
    qty int NOT NULL CONSTRAINT qty_positive CHECK (qty > 0), -- @id c00000000015
    total numeric(12,2) GENERATED ALWAYS AS (price * qty) STORED, -- @id c00000000016
    deleted_at timestamptz, -- @id c00000000017
    CONSTRAINT orders_total_sane CHECK (total < 1000000) -- @id k00000000001
);
-- @id i00000000002
CREATE UNIQUE INDEX orders_invoice_idx ON orders (invoice) WHERE deleted_at IS NULL;

-- @id t00000000003
CREATE TABLE order_lines (
    order_id bigint, -- @id c00000000021
    line_no int, -- @id c00000000022
    during tsrange, -- @id c00000000023
    PRIMARY KEY (order_id, line_no),
    CONSTRAINT order_lines_no_overlap EXCLUDE USING gist (order_id WITH =, during WITH &&) -- @id k00000000002
);
-- @id k00000000003
ALTER TABLE order_lines ADD CONSTRAINT order_lines_order_fk FOREIGN KEY (order_id) REFERENCES orders (id) ON DELETE CASCADE;

COMMENT ON TABLE users IS 'Application users';
COMMENT ON COLUMN users.email IS 'Login, it''s unique';
COMMENT ON INDEX orders_invoice_idx IS 'One live invoice';

-- @id v00000000001
CREATE VIEW live_orders AS SELECT id, total FROM orders WHERE deleted_at IS NULL;
-- @id v00000000002
CREATE MATERIALIZED VIEW order_totals AS SELECT user_id, sum(total) AS spent FROM orders GROUP BY user_id;

-- @id f00000000001
CREATE FUNCTION touch() RETURNS trigger LANGUAGE plpgsql AS $$
BEGIN
    NEW.deleted_at = NULL;
    RETURN NEW;
END;
$$;

-- @id g00000000001
CREATE TRIGGER orders_touch BEFORE UPDATE OF price OR INSERT ON orders FOR EACH ROW WHEN (NEW.qty > 1) EXECUTE FUNCTION touch();

-- @id r00000000001
CREATE FOREIGN TABLE remote_users (id integer NOT NULL, name text) SERVER remote OPTIONS (table_name 'users');

ALTER SEQUENCE invoice_seq OWNED BY orders.invoice;
"#;

fn comparable(mut schema: Schema) -> Schema {
    schema.clear_expression_trees();
    schema
}

#[test]
fn test_rendered_source_parses_back_to_the_same_model() {
    let original = parse_schema(SOURCE).unwrap();
    assert_eq!(original.tables.len(), 4);
    assert_eq!(original.object_count(), parse_schema(SOURCE).unwrap().object_count());

    let options = RenderOptions {
        header: vec!["Generated by relq".to_string()],
        tracking_ids: true,
    };
    let rendered = render_schema_sql(&original, &options);
    assert!(rendered.starts_with("-- Generated by relq\n"));

    let reparsed = parse_schema(&rendered).unwrap();
    assert_eq!(comparable(reparsed), comparable(original));
}

#[test]
fn test_render_twice_is_stable() {
    let options = RenderOptions {
        tracking_ids: true,
        ..RenderOptions::default()
    };
    let first = render_schema_sql(&parse_schema(SOURCE).unwrap(), &options);
    let second = render_schema_sql(&parse_schema(&first).unwrap(), &options);
    assert_eq!(first, second);
}

#[test]
fn test_render_without_tracking_ids() {
    let schema = parse_schema(SOURCE).unwrap();
    let rendered = render_schema_sql(&schema, &RenderOptions::default());
    assert!(!rendered.contains("@id"));

    let reparsed = parse_schema(&rendered).unwrap();
    assert!(reparsed.tables.iter().all(|t| t.tracking_id.is_none()));
    assert_eq!(reparsed.tables.len(), schema.tables.len());
}

#[test]
fn test_reference_cycle_renders_loadable_source() {
    let source = "CREATE TABLE a (id int PRIMARY KEY, b_id int REFERENCES b (id));
                  CREATE TABLE b (id int PRIMARY KEY, a_id int REFERENCES a (id));";
    let schema = parse_schema(source).unwrap();
    let rendered = render_schema_sql(&schema, &RenderOptions::default());

    let create_a = rendered.find("CREATE TABLE \"a\"").unwrap();
    let create_b = rendered.find("CREATE TABLE \"b\"").unwrap();
    let late = rendered
        .find("ALTER TABLE \"a\" ADD CONSTRAINT \"a_b_id_fkey\"")
        .unwrap();
    assert!(create_a < create_b && create_b < late);
    assert!(!rendered[create_a..create_b].contains("REFERENCES"));

    assert_eq!(comparable(parse_schema(&rendered).unwrap()), comparable(schema));
}
