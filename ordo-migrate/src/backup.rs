//! Point-in-time snapshots and rollback.
//!
//! Rollback here means restoring the snapshot taken before the most recent
//! backed-up batch and forgetting that batch in the ledger. There are no
//! per-migration down scripts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{BatchBackup, Ledger};

/// Reference to a snapshot artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupRef(PathBuf);

impl BackupRef {
    /// Create a reference from a path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for BackupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Name of the snapshot file for a batch.
pub fn backup_file_name(prefix: &str, batch: u32, at: DateTime<Utc>) -> String {
    format!(
        "{}_backup_{}_batch{}.sql",
        prefix,
        at.format("%Y%m%d_%H%M%S"),
        batch
    )
}

/// Snapshot and restore capability for the live database.
#[async_trait::async_trait]
pub trait Snapshotter: Send + Sync {
    /// Take a snapshot ahead of applying `batch`.
    async fn snapshot(&self, batch: u32) -> MigrateResult<BackupRef>;

    /// Replace the entire live database with the snapshot content.
    async fn restore(&self, backup: &BackupRef) -> MigrateResult<()>;

    /// Whether the snapshot is still accessible.
    async fn exists(&self, backup: &BackupRef) -> MigrateResult<bool> {
        Ok(tokio::fs::try_exists(backup.path()).await?)
    }
}

/// Snapshots through external dump and restore tools.
///
/// The dump command's stdout becomes the snapshot file; the restore command
/// reads the snapshot file on stdin. For MySQL that is `mysqldump` and `mysql`.
#[derive(Debug, Clone)]
pub struct CommandSnapshotter {
    backups_dir: PathBuf,
    prefix: String,
    dump: Vec<String>,
    restore: Vec<String>,
}

impl CommandSnapshotter {
    /// Create a snapshotter writing into `backups_dir`.
    pub fn new<D, R, S>(backups_dir: impl Into<PathBuf>, dump: D, restore: R) -> Self
    where
        D: IntoIterator<Item = S>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backups_dir: backups_dir.into(),
            prefix: "ordo".to_string(),
            dump: dump.into_iter().map(Into::into).collect(),
            restore: restore.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the snapshot file prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

fn split_command(command: &[String]) -> MigrateResult<(&String, &[String])> {
    command
        .split_first()
        .ok_or_else(|| MigrationError::invalid("backup command is empty"))
}

#[async_trait::async_trait]
impl Snapshotter for CommandSnapshotter {
    async fn snapshot(&self, batch: u32) -> MigrateResult<BackupRef> {
        let (program, args) = split_command(&self.dump)?;

        tokio::fs::create_dir_all(&self.backups_dir)
            .await
            .map_err(|e| MigrationError::snapshot(format!("cannot create backups dir: {}", e)))?;

        let path = self
            .backups_dir
            .join(backup_file_name(&self.prefix, batch, Utc::now()));
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| MigrationError::snapshot(format!("{}: {}", path.display(), e)))?
            .into_std()
            .await;

        debug!(program = %program, path = %path.display(), "Running dump command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .output()
            .await;

        let failure = match output {
            Ok(output) if output.status.success() => None,
            Ok(output) => Some(format!(
                "'{}' exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(e) => Some(format!("failed to launch '{}': {}", program, e)),
        };

        if let Some(reason) = failure {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Could not remove partial backup");
            }
            return Err(MigrationError::snapshot(reason));
        }

        Ok(BackupRef::new(path))
    }

    async fn restore(&self, backup: &BackupRef) -> MigrateResult<()> {
        let (program, args) = split_command(&self.restore)?;

        let file = tokio::fs::File::open(backup.path())
            .await
            .map_err(|e| MigrationError::restore(format!("{}: {}", backup, e)))?
            .into_std()
            .await;

        debug!(program = %program, backup = %backup, "Running restore command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::from(file))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| MigrationError::restore(format!("failed to launch '{}': {}", program, e)))?;

        if !output.status.success() {
            return Err(MigrationError::restore(format!(
                "'{}' exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Result of a rollback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The snapshot was restored and the batch removed from the ledger.
    Restored {
        /// Batch that was rolled back.
        batch: u32,
        /// Snapshot restored.
        backup: BackupRef,
        /// Ledger entries removed.
        removed: u64,
    },
    /// The operator declined the confirmation. Nothing changed.
    Declined {
        /// Batch that would have been rolled back.
        batch: u32,
        /// Snapshot that would have been restored.
        backup: BackupRef,
    },
}

/// Wraps batch application with snapshots and offers restore.
pub struct BackupCoordinator<'a> {
    ledger: &'a dyn Ledger,
    snapshotter: &'a dyn Snapshotter,
}

impl<'a> BackupCoordinator<'a> {
    /// Create a coordinator.
    pub fn new(ledger: &'a dyn Ledger, snapshotter: &'a dyn Snapshotter) -> Self {
        Self {
            ledger,
            snapshotter,
        }
    }

    /// Snapshot the live database ahead of `batch`.
    pub async fn create_snapshot(&self, batch: u32) -> MigrateResult<BackupRef> {
        let backup = self.snapshotter.snapshot(batch).await.map_err(|e| match e {
            MigrationError::SnapshotFailure(_) => e,
            other => MigrationError::snapshot(other.to_string()),
        })?;
        info!(batch, backup = %backup, "Backup created");
        Ok(backup)
    }

    /// Restore the most recent backup and drop its batch from the ledger.
    ///
    /// `confirm` is consulted unless `force` is set; declining leaves
    /// everything untouched. The discarded migrations are not re-verified.
    pub async fn rollback(
        &self,
        force: bool,
        confirm: impl FnOnce(&BatchBackup) -> bool,
    ) -> MigrateResult<RollbackOutcome> {
        let target = self
            .ledger
            .most_recent_backup()
            .await?
            .ok_or(MigrationError::NoBackupAvailable)?;

        if !self.snapshotter.exists(&target.backup).await? {
            return Err(MigrationError::BackupMissing(
                target.backup.path().to_path_buf(),
            ));
        }

        if !force && !confirm(&target) {
            return Ok(RollbackOutcome::Declined {
                batch: target.batch,
                backup: target.backup,
            });
        }

        info!(batch = target.batch, backup = %target.backup, "Restoring from backup");
        self.snapshotter
            .restore(&target.backup)
            .await
            .map_err(|e| match e {
                MigrationError::RestoreFailure(_) => e,
                other => MigrationError::restore(other.to_string()),
            })?;

        let removed = self.ledger.delete_batch(target.batch).await?;
        info!(batch = target.batch, removed, "Rollback complete");

        Ok(RollbackOutcome::Restored {
            batch: target.batch,
            backup: target.backup,
            removed,
        })
    }
}
