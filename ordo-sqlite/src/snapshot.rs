//! Snapshots via the SQLite online backup API.

use std::path::PathBuf;

use chrono::Utc;
use ordo_migrate::{BackupRef, MigrateResult, MigrationError, Snapshotter, backup_file_name};
use rusqlite::DatabaseName;
use rusqlite::backup::Progress;
use tracing::debug;

use crate::database::SqliteDatabase;

/// Default directory for snapshot files.
pub const DEFAULT_BACKUPS_DIR: &str = "backups";

/// Copies the whole database to a file before a batch and copies it back on
/// rollback. Works for in-memory databases too.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotter {
    db: SqliteDatabase,
    backups_dir: PathBuf,
    prefix: String,
}

impl SqliteSnapshotter {
    /// Create a snapshotter writing into `backups_dir`.
    pub fn new(db: SqliteDatabase, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            backups_dir: backups_dir.into(),
            prefix: "ordo".to_string(),
        }
    }

    /// Set the snapshot file prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Directory snapshots are written to.
    pub fn backups_dir(&self) -> &std::path::Path {
        &self.backups_dir
    }
}

#[async_trait::async_trait]
impl Snapshotter for SqliteSnapshotter {
    async fn snapshot(&self, batch: u32) -> MigrateResult<BackupRef> {
        tokio::fs::create_dir_all(&self.backups_dir)
            .await
            .map_err(|e| MigrationError::snapshot(format!("cannot create backups dir: {}", e)))?;

        let path = self
            .backups_dir
            .join(backup_file_name(&self.prefix, batch, Utc::now()))
            .with_extension("db");

        debug!(path = %path.display(), "Copying database to snapshot");
        let dst = path.clone();
        self.db
            .connection()
            .call(move |conn| Ok(conn.backup(DatabaseName::Main, &dst, None)?))
            .await
            .map_err(|e| MigrationError::snapshot(format!("{}: {}", path.display(), e)))?;

        Ok(BackupRef::new(path))
    }

    async fn restore(&self, backup: &BackupRef) -> MigrateResult<()> {
        let src = backup.path().to_path_buf();
        debug!(backup = %backup, "Copying snapshot over database");
        self.db
            .connection()
            .call(move |conn| {
                Ok(conn.restore(DatabaseName::Main, &src, None::<fn(Progress)>)?)
            })
            .await
            .map_err(|e| MigrationError::restore(format!("{}: {}", backup, e)))
    }
}
