//! Script execution against SQLite.

use ordo_migrate::{MigrateResult, ScriptExecutor};
use tracing::trace;

use crate::database::SqliteDatabase;

/// Executes `.sql` migration content on a SQLite database.
///
/// Statements run in order as one batch. SQLite commits DDL per statement, so
/// a failure midway leaves the earlier statements in place.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    db: SqliteDatabase,
}

impl SqliteExecutor {
    /// Create an executor.
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ScriptExecutor for SqliteExecutor {
    async fn execute_script(&self, sql: &str) -> MigrateResult<()> {
        trace!(bytes = sql.len(), "Executing script");
        self.db.execute_batch(sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_script() {
        let db = SqliteDatabase::memory().await.unwrap();
        let executor = SqliteExecutor::new(db.clone());

        executor
            .execute_script(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);\n\
                 CREATE INDEX idx_users_email ON users (email);",
            )
            .await
            .unwrap();

        assert!(db.table_exists("users").await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_statements() {
        let db = SqliteDatabase::memory().await.unwrap();
        let executor = SqliteExecutor::new(db.clone());

        let err = executor
            .execute_script("CREATE TABLE kept (id INTEGER); INSERT INTO missing VALUES (1);")
            .await
            .unwrap_err();

        assert!(matches!(err, ordo_migrate::MigrationError::Database(_)));
        assert!(db.table_exists("kept").await.unwrap());
    }
}
