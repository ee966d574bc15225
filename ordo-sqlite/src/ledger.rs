//! Ledger table stored in the migrated database itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ordo_migrate::{
    BackupRef, BatchBackup, DEFAULT_LEDGER_TABLE, Ledger, LedgerEntry, MigrateResult,
    MigrationError,
};
use rusqlite::params;
use tracing::{debug, info};

use crate::database::SqliteDatabase;
use crate::error::{SqliteError, SqliteResult};

/// Ledger backed by a table in the SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    db: SqliteDatabase,
    table: String,
}

impl SqliteLedger {
    /// Create a ledger using the default table name.
    pub fn new(db: SqliteDatabase) -> Self {
        Self {
            db,
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    /// Create a ledger using a custom table name.
    pub fn with_table(db: SqliteDatabase, table: impl Into<String>) -> SqliteResult<Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && !table.starts_with(|c: char| c.is_ascii_digit())
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(SqliteError::config(format!(
                "invalid ledger table name '{}'",
                table
            )));
        }
        Ok(Self { db, table })
    }

    /// Name of the ledger table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The database this ledger lives in.
    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }
}

type EntryRow = (String, String, DateTime<Utc>, u32, Option<String>);

fn into_entry((filename, checksum, applied_at, batch, backup): EntryRow) -> LedgerEntry {
    LedgerEntry {
        filename,
        checksum,
        applied_at,
        batch,
        backup: backup.map(BackupRef::new),
    }
}

#[async_trait::async_trait]
impl Ledger for SqliteLedger {
    async fn initialize(&self) -> MigrateResult<()> {
        let table = self.table.clone();
        let upgraded = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute_batch(&format!(
                    r#"CREATE TABLE IF NOT EXISTS "{table}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL UNIQUE,
    checksum TEXT NOT NULL,
    applied_at TEXT NOT NULL,
    batch INTEGER NOT NULL,
    backup_file TEXT DEFAULT NULL
);"#
                ))?;

                // Ledgers created before backups existed lack the column.
                let mut stmt = conn.prepare(&format!(r#"PRAGMA table_info("{table}")"#))?;
                let columns = stmt
                    .query_map([], |row| row.get::<_, String>(1))?
                    .collect::<Result<Vec<_>, _>>()?;
                drop(stmt);
                if columns.iter().any(|c| c == "backup_file") {
                    return Ok(false);
                }

                conn.execute_batch(&format!(
                    r#"ALTER TABLE "{table}" ADD COLUMN backup_file TEXT DEFAULT NULL;"#
                ))?;
                Ok(true)
            })
            .await
            .map_err(SqliteError::from)?;

        if upgraded {
            info!(table = %self.table, "Added backup_file column to ledger");
        }
        debug!(table = %self.table, "Ledger ready");
        Ok(())
    }

    async fn recorded_entries(&self) -> MigrateResult<BTreeMap<String, LedgerEntry>> {
        let sql = format!(
            r#"SELECT filename, checksum, applied_at, batch, backup_file FROM "{}" ORDER BY id"#,
            self.table
        );
        let rows = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?
                    .collect::<Result<Vec<EntryRow>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(SqliteError::from)?;

        Ok(rows
            .into_iter()
            .map(into_entry)
            .map(|e| (e.filename.clone(), e))
            .collect())
    }

    async fn max_batch(&self) -> MigrateResult<u32> {
        let sql = format!(r#"SELECT COALESCE(MAX(batch), 0) FROM "{}""#, self.table);
        let batch = self
            .db
            .connection()
            .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get::<_, u32>(0))?))
            .await
            .map_err(SqliteError::from)?;
        Ok(batch)
    }

    async fn most_recent_backup(&self) -> MigrateResult<Option<BatchBackup>> {
        let sql = format!(
            r#"SELECT batch, backup_file FROM "{}"
WHERE backup_file IS NOT NULL
ORDER BY applied_at DESC, id DESC
LIMIT 1"#,
            self.table
        );
        let row = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
                })?;
                let latest = rows.next().transpose()?;
                Ok(latest)
            })
            .await
            .map_err(SqliteError::from)?;

        Ok(row.map(|(batch, backup)| BatchBackup {
            batch,
            backup: BackupRef::new(backup),
        }))
    }

    async fn insert(&self, entry: &LedgerEntry) -> MigrateResult<()> {
        let sql = format!(
            r#"INSERT INTO "{}" (filename, checksum, applied_at, batch, backup_file)
VALUES (?1, ?2, ?3, ?4, ?5)"#,
            self.table
        );
        let filename = entry.filename.clone();
        let checksum = entry.checksum.clone();
        let applied_at = entry.applied_at;
        let batch = entry.batch;
        let backup = entry
            .backup
            .as_ref()
            .map(|b| b.path().to_string_lossy().into_owned());

        let name = filename.clone();
        let result = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(&sql, params![name, checksum, applied_at, batch, backup])?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from);

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_unique_violation() => Err(MigrationError::DuplicateFilename(filename)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_batch(&self, batch: u32) -> MigrateResult<u64> {
        let sql = format!(r#"DELETE FROM "{}" WHERE batch = ?1"#, self.table);
        let removed = self
            .db
            .connection()
            .call(move |conn| Ok(conn.execute(&sql, [batch])?))
            .await
            .map_err(SqliteError::from)?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn ledger() -> SqliteLedger {
        let ledger = SqliteLedger::new(SqliteDatabase::memory().await.unwrap());
        ledger.initialize().await.unwrap();
        ledger
    }

    fn entry(filename: &str, batch: u32, backup: Option<&str>) -> LedgerEntry {
        LedgerEntry::new(filename, "abc123", batch, backup.map(BackupRef::new))
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let ledger = ledger().await;
        ledger.initialize().await.unwrap();

        assert!(ledger.database().table_exists("ordo_migrations").await.unwrap());
        assert_eq!(ledger.max_batch().await.unwrap(), 0);
        assert!(ledger.recorded_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_upgrades_old_table() {
        let db = SqliteDatabase::memory().await.unwrap();
        db.execute_batch(
            "CREATE TABLE ordo_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL UNIQUE,
                checksum TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                batch INTEGER NOT NULL
            );",
        )
        .await
        .unwrap();
        let ledger = SqliteLedger::new(db);

        ledger.initialize().await.unwrap();
        ledger
            .insert(&entry("001.sql", 1, Some("/tmp/b1.db")))
            .await
            .unwrap();

        let backup = ledger.most_recent_backup().await.unwrap().unwrap();
        assert_eq!(backup.backup, BackupRef::new("/tmp/b1.db"));
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let ledger = ledger().await;
        let first = entry("001_users.sql", 1, None);
        ledger.insert(&first).await.unwrap();
        ledger
            .insert(&entry("002_posts.sql", 2, Some("/backups/b2.db")))
            .await
            .unwrap();

        let entries = ledger.recorded_entries().await.unwrap();
        assert_eq!(entries.len(), 2);

        let read = &entries["001_users.sql"];
        assert_eq!(read.checksum, "abc123");
        assert_eq!(read.batch, 1);
        assert_eq!(read.backup, None);
        assert_eq!(read.applied_at, first.applied_at);
        assert_eq!(
            entries["002_posts.sql"].backup,
            Some(BackupRef::new("/backups/b2.db"))
        );
        assert_eq!(ledger.max_batch().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_filename_rejected() {
        let ledger = ledger().await;
        ledger.insert(&entry("001.sql", 1, None)).await.unwrap();

        let err = ledger.insert(&entry("001.sql", 2, None)).await.unwrap_err();

        assert!(matches!(err, MigrationError::DuplicateFilename(name) if name == "001.sql"));
        assert_eq!(ledger.max_batch().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_most_recent_backup_prefers_latest_then_id() {
        let ledger = ledger().await;
        assert!(ledger.most_recent_backup().await.unwrap().is_none());

        let now = Utc::now();
        let mut old = entry("001.sql", 1, Some("b1.db"));
        old.applied_at = now - Duration::hours(1);
        let mut tie_a = entry("002.sql", 2, Some("b2.db"));
        tie_a.applied_at = now;
        let mut tie_b = entry("003.sql", 3, Some("b3.db"));
        tie_b.applied_at = now;
        let mut plain = entry("004.sql", 4, None);
        plain.applied_at = now + Duration::hours(1);

        for e in [&old, &tie_a, &tie_b, &plain] {
            ledger.insert(e).await.unwrap();
        }

        let latest = ledger.most_recent_backup().await.unwrap().unwrap();
        assert_eq!(latest.batch, 3);
        assert_eq!(latest.backup, BackupRef::new("b3.db"));
    }

    #[tokio::test]
    async fn test_delete_batch() {
        let ledger = ledger().await;
        ledger.insert(&entry("001.sql", 1, None)).await.unwrap();
        ledger.insert(&entry("002.sql", 2, None)).await.unwrap();
        ledger.insert(&entry("003.sql", 2, None)).await.unwrap();

        assert_eq!(ledger.delete_batch(2).await.unwrap(), 2);
        assert_eq!(ledger.delete_batch(2).await.unwrap(), 0);

        let entries = ledger.recorded_entries().await.unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["001.sql"]);
        assert_eq!(ledger.max_batch().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_custom_table_name() {
        let db = SqliteDatabase::memory().await.unwrap();
        assert!(SqliteLedger::with_table(db.clone(), "bad name").is_err());
        assert!(SqliteLedger::with_table(db.clone(), "1st").is_err());

        let ledger = SqliteLedger::with_table(db.clone(), "schema_log").unwrap();
        ledger.initialize().await.unwrap();

        assert_eq!(ledger.table(), "schema_log");
        assert!(db.table_exists("schema_log").await.unwrap());
    }
}
