//! SQLite backend for ordo.
//!
//! Provides the three database capabilities the migration engine needs,
//! all sharing a single `tokio-rusqlite` connection:
//!
//! - [`SqliteLedger`] - the ledger table, created on demand
//! - [`SqliteExecutor`] - runs `.sql` migration content
//! - [`SqliteSnapshotter`] - whole-database snapshots via the online backup API
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ordo_migrate::{MigrationConfig, MigrationEngine, ProcedureRunner, RunnerSet, ScriptRunner};
//! use ordo_sqlite::{SqliteDatabase, SqliteExecutor, SqliteLedger, SqliteSnapshotter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::connect("sqlite://./app.db").await?;
//!     let runners = RunnerSet::new()
//!         .with(ScriptRunner::new(Arc::new(SqliteExecutor::new(db.clone()))))
//!         .with(ProcedureRunner::new());
//!
//!     let engine = MigrationEngine::new(MigrationConfig::new(), SqliteLedger::new(db.clone()), runners)
//!         .with_snapshotter(Arc::new(SqliteSnapshotter::new(db, "./backups")));
//!
//!     engine.initialize().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod snapshot;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use database::SqliteDatabase;
pub use error::{SqliteError, SqliteResult};
pub use executor::SqliteExecutor;
pub use ledger::SqliteLedger;
pub use snapshot::{DEFAULT_BACKUPS_DIR, SqliteSnapshotter};
