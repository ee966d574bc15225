//! End-to-end migration runs against SQLite databases on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ordo_migrate::{
    ApplyEvent, Ledger, MigrateOptions, MigrateOutcome, MigrationConfig, MigrationEngine,
    MigrationError, ProcedureRunner, RollbackOutcome, RunnerSet, ScriptRunner,
};
use ordo_sqlite::{SqliteConfig, SqliteDatabase, SqliteExecutor, SqliteLedger, SqliteSnapshotter};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Project {
    temp: TempDir,
    migrations: PathBuf,
}

impl Project {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let migrations = temp.path().join("migrations");
        std::fs::create_dir_all(&migrations).unwrap();
        Self { temp, migrations }
    }

    fn write(&self, name: &str, body: &str) {
        std::fs::write(self.migrations.join(name), body).unwrap();
    }

    fn db_path(&self) -> PathBuf {
        self.temp.path().join("app.db")
    }

    fn backups(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    async fn open(&self) -> (SqliteDatabase, MigrationEngine<SqliteLedger>) {
        let db = SqliteDatabase::open(SqliteConfig::file(self.db_path()))
            .await
            .unwrap();
        let runners = RunnerSet::new()
            .with(ScriptRunner::new(Arc::new(SqliteExecutor::new(db.clone()))))
            .with(ProcedureRunner::new());
        let engine = MigrationEngine::new(
            MigrationConfig::new().migrations_dir(&self.migrations),
            SqliteLedger::new(db.clone()),
            runners,
        )
        .with_snapshotter(Arc::new(SqliteSnapshotter::new(db.clone(), self.backups())));
        engine.initialize().await.unwrap();
        (db, engine)
    }
}

fn backup_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_fresh_database_applies_in_natural_order() {
    let project = Project::new();
    project.write("10_posts.sql", "CREATE TABLE posts (id INTEGER, user_id INTEGER REFERENCES users(id));");
    project.write("2_users.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY);");
    let (db, engine) = project.open().await;

    let mut started = Vec::new();
    let outcome = engine
        .migrate(&MigrateOptions::new(), |event| {
            if let ApplyEvent::Started(artifact) = event {
                started.push(artifact.filename.clone());
            }
        })
        .await
        .unwrap();

    assert_eq!(started, vec!["2_users.sql", "10_posts.sql"]);
    match outcome {
        MigrateOutcome::Applied(report) => {
            assert_eq!(report.batch, 1);
            assert_eq!(report.applied_count(), 2);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(db.table_exists("users").await.unwrap());
    assert!(db.table_exists("posts").await.unwrap());

    let again = engine.migrate(&MigrateOptions::new(), |_| {}).await.unwrap();
    assert!(matches!(again, MigrateOutcome::UpToDate));
}

#[tokio::test]
async fn test_ledger_survives_reopen() {
    let project = Project::new();
    project.write("001_users.sql", "CREATE TABLE users (id INTEGER);");
    {
        let (_db, engine) = project.open().await;
        engine.migrate(&MigrateOptions::new(), |_| {}).await.unwrap();
    }

    project.write("002_posts.sql", "CREATE TABLE posts (id INTEGER);");
    let (_db, engine) = project.open().await;
    let plan = engine.plan(None).await.unwrap();

    assert_eq!(plan.filenames(), vec!["002_posts.sql"]);
    assert_eq!(engine.ledger().max_batch().await.unwrap(), 1);
}

#[tokio::test]
async fn test_tampered_migration_is_detected() {
    let project = Project::new();
    project.write("001_users.sql", "CREATE TABLE users (id INTEGER);");
    let (_db, engine) = project.open().await;
    engine.migrate(&MigrateOptions::new(), |_| {}).await.unwrap();

    project.write("001_users.sql", "CREATE TABLE users (id INTEGER, name TEXT);");
    let err = engine.migrate(&MigrateOptions::new(), |_| {}).await.unwrap_err();

    match err {
        MigrationError::ChecksumMismatch { filename, .. } => assert_eq!(filename, "001_users.sql"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failed_script_records_earlier_successes() {
    let project = Project::new();
    project.write("001_users.sql", "CREATE TABLE users (id INTEGER);");
    project.write("002_broken.sql", "CREATE TABLE oops (;");
    project.write("003_posts.sql", "CREATE TABLE posts (id INTEGER);");
    let (db, engine) = project.open().await;

    let err = engine.migrate(&MigrateOptions::new(), |_| {}).await.unwrap_err();

    assert!(matches!(err, MigrationError::ExecutionFailure { filename, .. } if filename == "002_broken.sql"));
    let recorded = engine.ledger().recorded_entries().await.unwrap();
    assert_eq!(recorded.keys().collect::<Vec<_>>(), vec!["001_users.sql"]);
    assert!(!db.table_exists("posts").await.unwrap());
}

#[tokio::test]
async fn test_backup_and_rollback_restore_previous_state() {
    let project = Project::new();
    project.write("001_users.sql", "CREATE TABLE users (id INTEGER);");
    let (db, engine) = project.open().await;
    engine.migrate(&MigrateOptions::new(), |_| {}).await.unwrap();

    project.write("002_posts.sql", "CREATE TABLE posts (id INTEGER);");
    project.write("003_tags.sql", "CREATE TABLE tags (id INTEGER);");
    let outcome = engine
        .migrate(&MigrateOptions::new().backup(true), |_| {})
        .await
        .unwrap();
    let backup = match outcome {
        MigrateOutcome::Applied(report) => report.backup.unwrap(),
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(backup_count(&project.backups()), 1);
    assert!(db.table_exists("tags").await.unwrap());

    let outcome = engine.rollback(true, |_| false).await.unwrap();

    match outcome {
        RollbackOutcome::Restored { batch, backup: restored, .. } => {
            assert_eq!(batch, 2);
            assert_eq!(restored, backup);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(db.table_exists("users").await.unwrap());
    assert!(!db.table_exists("posts").await.unwrap());
    assert!(!db.table_exists("tags").await.unwrap());

    let status = engine.status().await.unwrap();
    let applied: Vec<_> = status
        .iter()
        .filter(|s| s.is_applied())
        .map(|s| s.filename.as_str())
        .collect();
    assert_eq!(applied, vec!["001_users.sql"]);

    // The rolled-back migrations are pending again.
    let plan = engine.plan(None).await.unwrap();
    assert_eq!(plan.filenames(), vec!["002_posts.sql", "003_tags.sql"]);
}

#[tokio::test]
async fn test_rollback_declined_keeps_state() {
    let project = Project::new();
    project.write("001_users.sql", "CREATE TABLE users (id INTEGER);");
    let (db, engine) = project.open().await;
    engine
        .migrate(&MigrateOptions::new().backup(true), |_| {})
        .await
        .unwrap();

    let outcome = engine.rollback(false, |_| false).await.unwrap();

    assert!(matches!(outcome, RollbackOutcome::Declined { batch: 1, .. }));
    assert!(db.table_exists("users").await.unwrap());
    assert_eq!(engine.ledger().max_batch().await.unwrap(), 1);
}

#[tokio::test]
async fn test_rollback_with_deleted_backup_file() {
    let project = Project::new();
    project.write("001_users.sql", "CREATE TABLE users (id INTEGER);");
    let (_db, engine) = project.open().await;
    engine
        .migrate(&MigrateOptions::new().backup(true), |_| {})
        .await
        .unwrap();
    std::fs::remove_dir_all(project.backups()).unwrap();

    let err = engine.rollback(true, |_| true).await.unwrap_err();

    assert!(matches!(err, MigrationError::BackupMissing(_)));
    assert_eq!(engine.ledger().max_batch().await.unwrap(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_procedures_run_between_scripts() {
    let project = Project::new();
    let marker = project.temp.path().join("marker.txt");
    project.write("001_users.sql", "CREATE TABLE users (id INTEGER);");
    project.write(
        "002_seed.sh",
        &format!("echo \"$ORDO_MIGRATION $ORDO_BATCH\" > '{}'\n", marker.display()),
    );
    let (_db, engine) = project.open().await;

    engine.migrate(&MigrateOptions::new(), |_| {}).await.unwrap();

    assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "002_seed.sh 1");
    let recorded = engine.ledger().recorded_entries().await.unwrap();
    assert!(recorded.contains_key("002_seed.sh"));
}
