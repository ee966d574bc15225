//! Shared SQLite connection handle.

use std::sync::Arc;

use tokio_rusqlite::Connection;
use tracing::debug;

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};

/// An open SQLite database.
///
/// Cloning is cheap; every clone talks to the same background connection, so
/// the ledger, the script executor and the snapshotter all observe one
/// consistent database.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Connection,
    config: Arc<SqliteConfig>,
}

impl SqliteDatabase {
    /// Open a database and apply the configured pragmas.
    pub async fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.path {
            DatabasePath::Memory => Connection::open_in_memory().await?,
            DatabasePath::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        SqliteError::config(format!("{}: {}", parent.display(), e))
                    })?;
                }
                Connection::open(path).await?
            }
        };

        let init_sql = config.init_sql();
        conn.call(move |conn| Ok(conn.execute_batch(&init_sql)?))
            .await?;

        debug!(path = config.path.as_str(), "Opened SQLite database");

        Ok(Self {
            conn,
            config: Arc::new(config),
        })
    }

    /// Open a database from a URL.
    pub async fn connect(url: &str) -> SqliteResult<Self> {
        Self::open(SqliteConfig::from_url(url)?).await
    }

    /// Open an in-memory database.
    pub async fn memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory()).await
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run one or more statements separated by semicolons.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await?;
        Ok(())
    }

    /// Whether a table exists in the main schema.
    pub async fn table_exists(&self, name: &str) -> SqliteResult<bool> {
        let name = name.to_string();
        let count = self
            .conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [&name],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await?;
        Ok(count > 0)
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.config.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_memory() {
        let db = SqliteDatabase::memory().await.unwrap();
        db.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY);")
            .await
            .unwrap();

        assert!(db.table_exists("users").await.unwrap());
        assert!(!db.table_exists("posts").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_file_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("app.db");

        let db = SqliteDatabase::open(SqliteConfig::file(&path)).await.unwrap();
        db.execute_batch("CREATE TABLE t (x INTEGER);").await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_clones_share_connection() {
        let db = SqliteDatabase::memory().await.unwrap();
        let other = db.clone();
        db.execute_batch("CREATE TABLE shared (x INTEGER);").await.unwrap();

        assert!(other.table_exists("shared").await.unwrap());
    }

    #[tokio::test]
    async fn test_execute_batch_error() {
        let db = SqliteDatabase::memory().await.unwrap();
        assert!(db.execute_batch("CREATE TABLE (").await.is_err());
    }
}
