//! Binary smoke tests. None of these need a database.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

const CONNECTION_VARS: &[&str] = &[
    "DATABASE_URL",
    "POSTGRES_URL",
    "MYSQL_URL",
    "SQLITE_URL",
    "TURSO_URL",
    "XATA_DATABASE_URL",
    "PGHOST",
    "PGDATABASE",
    "MYSQL_HOST",
    "AWS_DSQL_HOSTNAME",
    "RELQ_DIALECT",
    "RELQ_CONFIG",
    "RELQ_LOG",
];

fn relq(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_relq"));
    cmd.current_dir(dir);
    for var in CONNECTION_VARS {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    relq(dir).args(args).output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn project(schema: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    assert!(run(dir.path(), &["init"]).status.success());
    std::fs::write(dir.path().join("db/schema.sql"), schema).unwrap();
    dir
}

#[test]
fn test_help_lists_every_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    for command in [
        "init", "status", "diff", "pull", "push", "generate", "migrate", "rollback", "import",
        "export", "validate", "seed", "introspect",
    ] {
        assert!(help.contains(command), "missing {command} in\n{help}");
    }
}

#[test]
fn test_init_scaffolds_project() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["init"]);
    assert!(output.status.success(), "{}", stderr(&output));
    for path in ["relq.toml", ".relqignore", "db/schema.sql"] {
        assert!(dir.path().join(path).is_file(), "{path} not created");
    }
    for path in ["db/migrations", "db/seeds", ".relq"] {
        assert!(dir.path().join(path).is_dir(), "{path} not created");
    }

    std::fs::write(dir.path().join("db/schema.sql"), "-- mine\n").unwrap();
    let again = run(dir.path(), &["init"]);
    assert!(again.status.success());
    assert!(stdout(&again).contains("(exists)"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("db/schema.sql")).unwrap(),
        "-- mine\n"
    );
}

#[test]
fn test_validate_accepts_a_good_schema() {
    let dir = project(
        "CREATE TABLE users (id uuid PRIMARY KEY, email text NOT NULL UNIQUE);\n\
         CREATE INDEX users_email_idx ON users (email);\n",
    );
    let output = run(dir.path(), &["validate"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Schema is valid"));
}

#[test]
fn test_validate_json_report() {
    let dir = project("CREATE TABLE users (id uuid PRIMARY KEY);\n");
    let output = run(dir.path(), &["validate", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["valid"], serde_json::Value::Bool(true));
    assert_eq!(report["objects"], serde_json::json!(1));
}

#[test]
fn test_validate_rejects_a_broken_schema() {
    let dir = project("CREATE INDEX orphan_idx ON missing (id);\n");
    let output = run(dir.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("unknown table missing"));
}

#[test]
fn test_validate_missing_file_is_a_user_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["validate", "nope.sql"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_introspect_file_prints_builder_code() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("schema.sql");
    std::fs::write(&file, "CREATE TABLE users (id uuid PRIMARY KEY, name text);\n").unwrap();
    let output = run(dir.path(), &["introspect", "--file", file.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    let code = stdout(&output);
    assert!(code.contains("use relq_core::schema::*;"));
    assert!(code.contains(r#"Table::new("users")"#));
    assert!(code.contains(r#"Column::new("id", "uuid").primary_key()"#));
}

#[test]
fn test_introspect_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = relq(dir.path())
        .args(["introspect", "--stdin"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"CREATE TYPE mood AS ENUM ('ok', 'meh');\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains(r#"EnumType::new("mood", &["ok", "meh"])"#));
}

#[test]
fn test_push_without_connection_settings() {
    let dir = project("CREATE TABLE users (id uuid PRIMARY KEY);\n");
    let output = run(dir.path(), &["push", "--dry-run"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("no database connection configured"), "{err}");
    assert!(err.contains("hint:"));
}

#[test]
fn test_export_without_snapshot() {
    let dir = project("CREATE TABLE users (id uuid PRIMARY KEY);\n");
    let output = run(dir.path(), &["export"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no snapshot yet"));
}

#[test]
fn test_generate_dry_run_prints_migration() {
    let dir = project("CREATE TABLE users (id uuid PRIMARY KEY);\n");
    let output = run(dir.path(), &["generate", "--dry-run", "create_users"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("-- UP"));
    assert!(out.contains(r#"CREATE TABLE "users""#));
    assert!(std::fs::read_dir(dir.path().join("db/migrations")).unwrap().next().is_none());
}

#[test]
fn test_import_writes_schema_source() {
    let dir = project("");
    let dump = dir.path().join("dump.sql");
    std::fs::write(&dump, "CREATE TABLE accounts (id bigint PRIMARY KEY, name text);\n").unwrap();
    let output = run(dir.path(), &["import", "dump.sql", "--force"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let source = std::fs::read_to_string(dir.path().join("db/schema.sql")).unwrap();
    assert!(source.contains("accounts"));
    assert!(source.contains("-- @id"));
}
