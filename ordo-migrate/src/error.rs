//! Error types for the migration engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
///
/// Every variant is fatal for the run that produced it. Nothing is retried.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error outside of a migration body.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid migration file or configuration.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// An applied migration changed on disk after it was recorded.
    #[error(
        "Checksum mismatch for applied migration '{filename}'. \
         Applied checksum: {expected}, current checksum: {actual}"
    )]
    ChecksumMismatch {
        /// Migration filename.
        filename: String,
        /// Checksum recorded in the ledger.
        expected: String,
        /// Checksum of the file on disk.
        actual: String,
    },

    /// The ledger already holds an entry for this filename.
    #[error("Migration '{0}' is already recorded in the ledger")]
    DuplicateFilename(String),

    /// A migration's change unit failed.
    #[error("Migration '{filename}' failed: {reason}")]
    ExecutionFailure {
        /// Migration filename.
        filename: String,
        /// Failure reported by the executor.
        reason: String,
    },

    /// A migration ran but could not be recorded.
    #[error("Migration '{filename}' was applied but could not be recorded: {reason}")]
    LedgerWriteFailure {
        /// Migration filename.
        filename: String,
        /// Failure reported by the ledger.
        reason: String,
    },

    /// Rollback was requested but no batch carries a backup.
    #[error("No backups found in the ledger to roll back")]
    NoBackupAvailable,

    /// The backup referenced by the ledger is not accessible.
    #[error("Backup file not found: {}", .0.display())]
    BackupMissing(PathBuf),

    /// The snapshot capability failed.
    #[error("Backup failed: {0}")]
    SnapshotFailure(String),

    /// The restore capability failed.
    #[error("Restore failed: {0}")]
    RestoreFailure(String),

    /// A migration file or directory could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an invalid migration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create an execution failure for a migration.
    pub fn execution_failure(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Create a ledger write failure for a migration.
    pub fn ledger_write(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LedgerWriteFailure {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Create a snapshot failure.
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::SnapshotFailure(msg.into())
    }

    /// Create a restore failure.
    pub fn restore(msg: impl Into<String>) -> Self {
        Self::RestoreFailure(msg.into())
    }

    /// Create a read error for a path.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Whether the error means the ledger and the source disagree.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::DuplicateFilename(_)
        )
    }
}
