//! # ordo-migrate
//!
//! Ledger-based migration engine.
//!
//! This crate provides functionality for:
//! - Discovering migration files and checksumming their contents
//! - Tracking applied migrations, with batch numbers, in a ledger
//! - Verifying that applied migrations have not changed on disk
//! - Applying pending migrations in natural filename order, optionally up to a target
//! - Snapshotting the database before a batch and restoring it on rollback
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Source (fs)  │────▶│    Planner     │◀────│   Ledger    │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                              │                     ▲
//!                              ▼                     │
//!                      ┌────────────────┐            │
//!                      │    Applier     │────────────┘
//!                      └────────────────┘
//!                              ▲
//!                              │
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │  Coordinator   │────▶│ Snapshotter │
//!                      └────────────────┘     └─────────────┘
//! ```
//!
//! The database itself stays behind three capabilities: a [`Ledger`], a
//! [`ScriptExecutor`] for `.sql` files and a [`Snapshotter`] for backups.
//! `ordo-sqlite` implements all three for SQLite.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ordo_migrate::{MigrateOptions, MigrationConfig, MigrationEngine, RunnerSet, ScriptRunner};
//!
//! async fn run(ledger: impl ordo_migrate::Ledger, executor: Arc<dyn ordo_migrate::ScriptExecutor>)
//!     -> ordo_migrate::MigrateResult<()>
//! {
//!     let runners = RunnerSet::new().with(ScriptRunner::new(executor));
//!     let engine = MigrationEngine::new(
//!         MigrationConfig::new().migrations_dir("./migrations"),
//!         ledger,
//!         runners,
//!     );
//!
//!     engine.initialize().await?;
//!     let outcome = engine
//!         .migrate(&MigrateOptions::new().target("002_create_users"), |_| {})
//!         .await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! Migrations are flat files ordered by natural filename order:
//!
//! ```text
//! migrations/
//! ├── 001_create_users.sql
//! ├── 002_add_index.sql
//! └── 010_backfill.sh
//! ```
//!
//! `.sql` files are handed to the script executor, `.sh` files are run by an
//! interpreter. Other extensions are skipped with a warning.

pub mod applier;
pub mod backup;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod planner;
pub mod runner;
pub mod source;

// Re-exports
pub use applier::{ApplyEvent, ApplyReport, Applier, RunContext};
pub use backup::{
    BackupCoordinator, BackupRef, CommandSnapshotter, RollbackOutcome, Snapshotter,
    backup_file_name,
};
pub use engine::{MigrateOptions, MigrateOutcome, MigrationConfig, MigrationEngine};
pub use error::{MigrateResult, MigrationError};
pub use ledger::{BatchBackup, DEFAULT_LEDGER_TABLE, Ledger, LedgerEntry, MemoryLedger};
pub use planner::{ArtifactStatus, MigrationPlan};
pub use runner::{ArtifactRunner, ProcedureRunner, RunnerSet, ScriptExecutor, ScriptRunner};
pub use source::{ArtifactKind, MigrationArtifact, MigrationSource, compute_checksum, natural_cmp};
