//! Planner workflows against the in-memory database.

mod common;

use common::{FakeDb, Project};
use pretty_assertions::assert_eq;
use relq_core::RelqError;
use relq_core::commit::CommitLog;
use relq_core::parser::parse_schema;
use relq_core::plan::{
    GenerateOptions, ImportOptions, MigrateOptions, Planner, PushOptions, RollbackOptions,
    SeedOptions,
};
use relq_core::prompt::{AlwaysNo, AlwaysYes, Scripted};
use relq_core::schema::Schema;
use relq_core::snapshot::Snapshot;

const USERS: &str = "CREATE TABLE users (id uuid PRIMARY KEY, email text NOT NULL);\n";
const USERS_AND_POSTS: &str = "CREATE TABLE users (id uuid PRIMARY KEY, email text NOT NULL);\nCREATE TABLE posts (id uuid PRIMARY KEY, title text);\n";

const USERS_MIGRATION: &str = "-- UP\nCREATE TABLE users (id int);\n\n-- DOWN\nDROP TABLE users;\n";

fn snapshot(project: &Project) -> Snapshot {
    Snapshot::load(&project.ctx.config.snapshot_path())
        .unwrap()
        .expect("snapshot written")
}

#[tokio::test]
async fn test_push_applies_records_and_snapshots() {
    let project = Project::new(USERS);
    let mut db = FakeDb::new(Schema::new()).will_become(parse_schema(USERS).unwrap());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let report = planner.push(&mut db, &PushOptions::default()).await.unwrap();
    assert!(report.applied);
    assert!(report.transactional);
    assert!(report.snapshot_saved);
    assert!(report.up[0].starts_with("CREATE TABLE \"users\""));
    assert_eq!(report.down, vec!["DROP TABLE IF EXISTS \"users\" CASCADE;".to_string()]);
    assert_eq!(db.commits, 1);

    assert_eq!(db.migrations.len(), 1);
    let row = &db.migrations[0];
    assert_eq!(row.source, "push");
    assert!(row.name.starts_with("push_"));
    assert_eq!(row.sql_down.as_deref(), Some("DROP TABLE IF EXISTS \"users\" CASCADE;"));

    let snap = snapshot(&project);
    assert!(snap.tables.contains_key("users"));
    assert_eq!(snap.applied_migrations, vec![row.name.clone()]);

    let log = CommitLog::load(&project.ctx.config.commits_path()).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log.head().unwrap().source, "push");
    assert_eq!(report.commit.as_deref(), Some(log.head().unwrap().hash.as_str()));
    assert!(log.head().unwrap().mirrored);

    let again = planner.push(&mut db, &PushOptions::default()).await.unwrap();
    assert!(again.is_empty());
    assert!(!again.applied);
}

#[tokio::test]
async fn test_push_dry_run_executes_nothing() {
    let project = Project::new(USERS);
    let mut db = FakeDb::new(Schema::new());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let report = planner
        .push(&mut db, &PushOptions { dry_run: true, ..PushOptions::default() })
        .await
        .unwrap();
    assert_eq!(report.up.len(), 1);
    assert!(!report.applied);
    assert!(db.executed.is_empty());
    assert!(!project.ctx.config.snapshot_path().exists());
}

#[tokio::test]
async fn test_push_failure_rolls_back_and_keeps_snapshot() {
    let project = Project::new(USERS_AND_POSTS);
    let mut db = FakeDb::new(Schema::new());
    db.fail_on = Some("CREATE TABLE \"users\"".to_string());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let err = planner.push(&mut db, &PushOptions::default()).await.unwrap_err();
    match err {
        RelqError::Execution { index, rolled_back, statement, .. } => {
            assert!(rolled_back);
            assert!(statement.starts_with("CREATE TABLE \"users\""));
            assert_eq!(index, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(db.rollbacks, 1);
    assert!(db.migrations.is_empty());
    assert!(!project.ctx.config.snapshot_path().exists());
    assert!(!project.ctx.config.commits_path().exists());
}

#[tokio::test]
async fn test_declined_destructive_changes_are_stripped() {
    let project = Project::new(USERS);
    let live = parse_schema(USERS_AND_POSTS).unwrap();
    let mut db = FakeDb::new(live);
    let mut prompt = Scripted::new(&[false, true]);
    let mut planner = Planner::new(&project.ctx, &mut prompt);

    let report = planner.push(&mut db, &PushOptions::default()).await.unwrap();
    assert!(report.stripped);
    assert!(report.is_empty());
    assert!(db.ddl().is_empty());
    assert_eq!(prompt.asked.len(), 2);
}

#[tokio::test]
async fn test_declining_everything_cancels() {
    let project = Project::new(USERS);
    let mut db = FakeDb::new(parse_schema(USERS_AND_POSTS).unwrap());
    let mut planner = Planner::new(&project.ctx, AlwaysNo);

    let err = planner.push(&mut db, &PushOptions::default()).await.unwrap_err();
    assert!(matches!(err, RelqError::UserCancel));
    assert_eq!(err.exit_code(), 0);
    assert!(db.executed.is_empty());
}

#[tokio::test]
async fn test_force_applies_drops_without_asking() {
    let project = Project::new(USERS);
    let mut db = FakeDb::new(parse_schema(USERS_AND_POSTS).unwrap());
    let mut prompt = Scripted::new(&[]);
    let mut planner = Planner::new(&project.ctx, &mut prompt);

    let report = planner
        .push(&mut db, &PushOptions { force: true, ..PushOptions::default() })
        .await
        .unwrap();
    assert!(report.applied);
    assert_eq!(db.ddl(), vec!["DROP TABLE IF EXISTS \"posts\" CASCADE;"]);
    assert!(prompt.asked.is_empty());
}

#[tokio::test]
async fn test_push_without_transactional_ddl_runs_statement_by_statement() {
    let project = Project::new(USERS_AND_POSTS);
    let mut db = FakeDb::new(Schema::new()).will_become(parse_schema(USERS_AND_POSTS).unwrap());
    db.refuse_transactions = true;
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let report = planner.push(&mut db, &PushOptions::default()).await.unwrap();
    assert!(report.applied);
    assert!(!report.transactional);
    assert_eq!(db.commits, 0);
    assert_eq!(db.migrations.len(), 1);
}

#[tokio::test]
async fn test_generate_writes_file_and_advances_snapshot() {
    let project = Project::new(USERS);
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let options = GenerateOptions {
        name: Some("create users".to_string()),
        ..GenerateOptions::default()
    };
    let report = planner.generate(&options).unwrap();
    assert!(report.written);
    let path = report.path.unwrap();
    let filename = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(filename.ends_with("_create_users.sql"));
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("-- UP\n"));
    assert!(content.contains("-- DOWN\n"));
    assert!(content.contains("CREATE TABLE \"users\""));
    assert!(snapshot(&project).tables.contains_key("users"));

    let second = planner.generate(&options).unwrap();
    assert!(!second.written);
    assert!(second.path.is_none());
}

#[tokio::test]
async fn test_generate_dry_run_and_no_down() {
    let project = Project::new(USERS);
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let report = planner
        .generate(&GenerateOptions {
            dry_run: true,
            no_down: true,
            ..GenerateOptions::default()
        })
        .unwrap();
    assert!(!report.written);
    let content = report.content.unwrap();
    assert!(!content.contains("-- DOWN"));
    assert!(!report.path.unwrap().exists());
    assert!(!project.ctx.config.snapshot_path().exists());
}

#[tokio::test]
async fn test_migrate_then_rollback() {
    let project = Project::new(USERS);
    project.write_migration("0001_users.sql", USERS_MIGRATION);
    project.write_migration("0002_posts.sql", "-- UP\nCREATE TABLE posts (id int);\n-- DOWN\nDROP TABLE posts;\n");
    let mut db = FakeDb::new(Schema::new());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let report = planner
        .migrate(&mut db, &MigrateOptions { step: Some(1), ..MigrateOptions::default() })
        .await
        .unwrap();
    assert_eq!(report.batch, 1);
    let names: Vec<&str> = report.migrations.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["0001_users"]);
    assert_eq!(db.migrations[0].source, "generate");
    assert_eq!(db.migrations[0].filename.as_deref(), Some("0001_users.sql"));

    let report = planner.migrate(&mut db, &MigrateOptions::default()).await.unwrap();
    assert_eq!(report.batch, 2);
    assert_eq!(report.migrations.len(), 1);
    assert_eq!(db.migrations.len(), 2);
    assert_eq!(db.ddl(), vec!["CREATE TABLE users (id int);", "CREATE TABLE posts (id int);"]);

    let rolled = planner
        .rollback(&mut db, &RollbackOptions { force: true, ..RollbackOptions::default() })
        .await
        .unwrap();
    assert_eq!(rolled.entries.len(), 1);
    assert_eq!(rolled.entries[0].name, "0002_posts");
    assert_eq!(rolled.entries[0].statements, vec!["DROP TABLE posts;".to_string()]);
    assert_eq!(db.migrations.len(), 1);
    assert_eq!(db.migrations[0].name, "0001_users");
}

#[tokio::test]
async fn test_rollback_to_is_exclusive_and_uses_stored_down_for_push_rows() {
    let project = Project::new(USERS);
    project.write_migration("0001_users.sql", USERS_MIGRATION);
    let mut db = FakeDb::new(Schema::new());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);
    planner.migrate(&mut db, &MigrateOptions::default()).await.unwrap();

    project.write_schema(USERS_AND_POSTS);
    db.next = Some(parse_schema(USERS_AND_POSTS).unwrap());
    db.live = parse_schema(USERS).unwrap();
    planner.push(&mut db, &PushOptions::default()).await.unwrap();
    assert_eq!(db.migrations.len(), 2);

    let dry = planner
        .rollback(
            &mut db,
            &RollbackOptions {
                to: Some("0001_users".to_string()),
                dry_run: true,
                ..RollbackOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(dry.entries.len(), 1);
    assert_eq!(dry.entries[0].source, "push");
    assert_eq!(dry.entries[0].statements, vec!["DROP TABLE IF EXISTS \"posts\" CASCADE;".to_string()]);
    assert!(!dry.applied);
    assert_eq!(db.migrations.len(), 2);
}

#[tokio::test]
async fn test_edited_migration_is_rejected_unless_forced() {
    let project = Project::new(USERS);
    project.write_migration("0001_users.sql", USERS_MIGRATION);
    let mut db = FakeDb::new(Schema::new());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);
    planner.migrate(&mut db, &MigrateOptions::default()).await.unwrap();

    project.write_migration("0001_users.sql", "-- UP\nCREATE TABLE users (id bigint);\n");
    let err = planner.migrate(&mut db, &MigrateOptions::default()).await.unwrap_err();
    assert!(matches!(err, RelqError::Config(_)));

    let forced = planner
        .migrate(&mut db, &MigrateOptions { force: true, ..MigrateOptions::default() })
        .await
        .unwrap();
    assert!(forced.migrations.is_empty());
}

#[tokio::test]
async fn test_migration_failure_leaves_no_record() {
    let project = Project::new(USERS);
    project.write_migration("0001_users.sql", "-- UP\nCREATE TABLE users (id int);\nCREATE TABLE broken (id int);\n");
    let mut db = FakeDb::new(Schema::new());
    db.fail_on = Some("broken".to_string());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let err = planner.migrate(&mut db, &MigrateOptions::default()).await.unwrap_err();
    assert!(matches!(err, RelqError::Execution { index: 1, rolled_back: true, .. }));
    assert!(db.migrations.is_empty());
}

#[tokio::test]
async fn test_pull_writes_annotated_source() {
    let project = Project::new("");
    let mut db = FakeDb::new(parse_schema(USERS_AND_POSTS).unwrap());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let report = planner.pull(&mut db).await.unwrap();
    assert_eq!(report.objects, 2);
    assert!(report.ids_assigned >= 2);
    let source = std::fs::read_to_string(project.ctx.config.schema_path()).unwrap();
    assert!(source.contains("-- @id t"));
    assert!(source.contains("CREATE TABLE"));

    // A second pull keeps the IDs it wrote.
    let first = snapshot(&project);
    let again = planner.pull(&mut db).await.unwrap();
    assert_eq!(again.ids_assigned, 0);
    assert_eq!(snapshot(&project).tables, first.tables);
}

#[tokio::test]
async fn test_import_dry_run_and_overwrite_prompt() {
    let project = Project::new(USERS);
    let raw = project.root().join("dump.sql");
    std::fs::write(&raw, USERS_AND_POSTS).unwrap();

    let mut planner = Planner::new(&project.ctx, AlwaysNo);
    let options = ImportOptions {
        file: raw.clone(),
        ..ImportOptions::default()
    };
    let dry = planner
        .import(&ImportOptions { dry_run: true, ..options.clone() })
        .unwrap();
    assert_eq!(dry.objects, 2);
    assert!(!dry.written);
    assert!(matches!(planner.import(&options), Err(RelqError::UserCancel)));

    let mut planner = Planner::new(&project.ctx, AlwaysYes);
    let report = planner.import(&options).unwrap();
    assert!(report.written);
    let source = std::fs::read_to_string(project.ctx.config.schema_path()).unwrap();
    assert!(source.contains("posts"));
}

#[tokio::test]
async fn test_status_and_diff() {
    let project = Project::new(USERS_AND_POSTS);
    let mut db = FakeDb::new(parse_schema(USERS).unwrap());
    let planner = Planner::new(&project.ctx, AlwaysYes);

    let status = planner.status::<FakeDb>(None, 5).await.unwrap();
    assert!(status.schema_exists);
    assert!(status.snapshot_taken.is_none());
    assert!(status.local_changes.is_none());
    assert!(status.pending_migrations.is_none());
    assert_eq!(status.commits, 0);

    let diff = planner.diff(&mut db).await.unwrap();
    assert_eq!(diff.push.tables.added.len(), 1);
    assert_eq!(diff.pull.tables.removed.len(), 1);
    assert!(diff.sql.up()[0].starts_with("CREATE TABLE \"posts\""));
}

#[tokio::test]
async fn test_validate_reports_ignored_dependencies() {
    let project = Project::with_ignore(
        "CREATE TYPE mood AS ENUM ('ok');\nCREATE TABLE people (id int, feeling mood);\n",
        "ENUM:mood\n",
    );
    let planner = Planner::new(&project.ctx, AlwaysYes);
    let report = planner.validate(None, None).unwrap();
    assert_eq!(report.objects, 2);
    assert_eq!(report.violations.len(), 1);
    assert!(!report.is_valid(false));
}

#[tokio::test]
async fn test_seed_runs_files_in_order() {
    let project = Project::new(USERS);
    let seeds = project.ctx.config.seeds_dir();
    std::fs::create_dir_all(&seeds).unwrap();
    std::fs::write(seeds.join("02_posts.sql"), "INSERT INTO posts VALUES (1);").unwrap();
    std::fs::write(seeds.join("01_users.sql"), "INSERT INTO users VALUES (1);\nINSERT INTO users VALUES (2);").unwrap();
    let mut db = FakeDb::new(Schema::new());
    let mut planner = Planner::new(&project.ctx, AlwaysYes);

    let report = planner.seed(&mut db, &SeedOptions::default()).await.unwrap();
    assert!(report.applied);
    assert_eq!(
        report.files,
        vec![("01_users.sql".to_string(), 2), ("02_posts.sql".to_string(), 1)]
    );
    assert_eq!(db.executed.len(), 3);
    assert_eq!(db.commits, 2);
}
