//! The persisted record of applied migrations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backup::BackupRef;
use crate::error::{MigrateResult, MigrationError};

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "ordo_migrations";

/// A record of an applied migration.
///
/// Entries are written once, when a migration succeeds, and only ever
/// removed again by a rollback of their batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration filename.
    pub filename: String,
    /// Checksum captured at apply time.
    pub checksum: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
    /// Batch the migration was applied in.
    pub batch: u32,
    /// Snapshot taken immediately before the batch, if any.
    pub backup: Option<BackupRef>,
}

impl LedgerEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        filename: impl Into<String>,
        checksum: impl Into<String>,
        batch: u32,
        backup: Option<BackupRef>,
    ) -> Self {
        Self {
            filename: filename.into(),
            checksum: checksum.into(),
            applied_at: Utc::now(),
            batch,
            backup,
        }
    }
}

/// The batch a backup was taken for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchBackup {
    /// Batch number.
    pub batch: u32,
    /// Snapshot taken before that batch.
    pub backup: BackupRef,
}

/// Storage for applied migrations.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Create the ledger storage if it does not exist yet.
    ///
    /// Must be idempotent and must upgrade older ledgers that lack the
    /// backup column.
    async fn initialize(&self) -> MigrateResult<()>;

    /// All recorded entries keyed by filename.
    async fn recorded_entries(&self) -> MigrateResult<BTreeMap<String, LedgerEntry>>;

    /// Highest batch number, 0 when the ledger is empty.
    async fn max_batch(&self) -> MigrateResult<u32>;

    /// The most recently applied entry that carries a backup.
    async fn most_recent_backup(&self) -> MigrateResult<Option<BatchBackup>>;

    /// Record an entry. Fails with `DuplicateFilename` if already present.
    async fn insert(&self, entry: &LedgerEntry) -> MigrateResult<()>;

    /// Remove every entry of a batch, returning how many were removed.
    async fn delete_batch(&self, batch: u32) -> MigrateResult<u64>;
}

/// In-process ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger pre-populated with entries.
    pub fn with_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    /// Snapshot of the entries in insertion order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn initialize(&self) -> MigrateResult<()> {
        Ok(())
    }

    async fn recorded_entries(&self) -> MigrateResult<BTreeMap<String, LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|e| (e.filename.clone(), e.clone()))
            .collect())
    }

    async fn max_batch(&self) -> MigrateResult<u32> {
        Ok(self.entries.lock().iter().map(|e| e.batch).max().unwrap_or(0))
    }

    async fn most_recent_backup(&self) -> MigrateResult<Option<BatchBackup>> {
        let entries = self.entries.lock();
        let latest = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.backup.is_some())
            .max_by(|(i, a), (j, b)| a.applied_at.cmp(&b.applied_at).then(i.cmp(j)));

        Ok(latest.and_then(|(_, e)| {
            e.backup.clone().map(|backup| BatchBackup {
                batch: e.batch,
                backup,
            })
        }))
    }

    async fn insert(&self, entry: &LedgerEntry) -> MigrateResult<()> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.filename == entry.filename) {
            return Err(MigrationError::DuplicateFilename(entry.filename.clone()));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn delete_batch(&self, batch: u32) -> MigrateResult<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.batch != batch);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(filename: &str, batch: u32, backup: Option<&str>) -> LedgerEntry {
        LedgerEntry::new(filename, "abc", batch, backup.map(BackupRef::new))
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let ledger = MemoryLedger::new();
        ledger.initialize().await.unwrap();

        assert_eq!(ledger.max_batch().await.unwrap(), 0);
        assert!(ledger.recorded_entries().await.unwrap().is_empty());
        assert!(ledger.most_recent_backup().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let ledger = MemoryLedger::new();
        ledger.insert(&entry("001.sql", 1, None)).await.unwrap();

        let err = ledger.insert(&entry("001.sql", 2, None)).await.unwrap_err();

        assert!(matches!(err, MigrationError::DuplicateFilename(name) if name == "001.sql"));
        assert_eq!(ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_max_batch_and_delete() {
        let ledger = MemoryLedger::with_entries([
            entry("001.sql", 1, None),
            entry("002.sql", 2, None),
            entry("003.sql", 2, None),
        ]);

        assert_eq!(ledger.max_batch().await.unwrap(), 2);
        assert_eq!(ledger.delete_batch(2).await.unwrap(), 2);
        assert_eq!(ledger.delete_batch(7).await.unwrap(), 0);

        let remaining = ledger.recorded_entries().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key("001.sql"));
    }

    #[tokio::test]
    async fn test_most_recent_backup_uses_latest_timestamp() {
        let now = Utc::now();
        let mut older = entry("001.sql", 1, Some("/b/one.sql"));
        older.applied_at = now - Duration::minutes(5);
        let mut newer = entry("002.sql", 2, Some("/b/two.sql"));
        newer.applied_at = now;
        let mut unbacked = entry("003.sql", 3, None);
        unbacked.applied_at = now + Duration::minutes(5);

        let ledger = MemoryLedger::with_entries([newer, older, unbacked]);
        let latest = ledger.most_recent_backup().await.unwrap().unwrap();

        assert_eq!(latest.batch, 2);
        assert_eq!(latest.backup, BackupRef::new("/b/two.sql"));
    }
}
