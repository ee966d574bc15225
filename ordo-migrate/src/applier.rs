//! Ordered application of pending migrations.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backup::BackupRef;
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{Ledger, LedgerEntry};
use crate::runner::RunnerSet;
use crate::source::MigrationArtifact;

/// State shared by every step of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Batch number assigned to everything applied in this run.
    pub batch: u32,
    /// Snapshot taken before the run, if any.
    pub backup: Option<BackupRef>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Create a context for a batch.
    pub fn new(batch: u32) -> Self {
        Self {
            batch,
            backup: None,
            started_at: Utc::now(),
        }
    }

    /// Attach the snapshot taken before this batch.
    pub fn with_backup(mut self, backup: BackupRef) -> Self {
        self.backup = Some(backup);
        self
    }
}

/// Progress notifications emitted while applying.
#[derive(Debug, Clone, Copy)]
pub enum ApplyEvent<'a> {
    /// Execution of a migration is starting.
    Started(&'a MigrationArtifact),
    /// A migration ran and was recorded.
    Recorded(&'a MigrationArtifact),
    /// A migration has no runner for its kind and was skipped.
    Skipped(&'a MigrationArtifact),
}

/// Outcome of a completed apply.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Batch number used.
    pub batch: u32,
    /// Migrations applied and recorded, in order.
    pub applied: Vec<String>,
    /// Migrations skipped for lack of a runner.
    pub skipped: Vec<String>,
    /// Snapshot attached to the batch.
    pub backup: Option<BackupRef>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
}

impl ApplyReport {
    /// Number of migrations applied.
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Get a summary of the report.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Applied batch {} with {} migration(s)",
            self.batch,
            self.applied.len()
        );
        if !self.skipped.is_empty() {
            summary.push_str(&format!(", {} skipped", self.skipped.len()));
        }
        summary
    }
}

/// Executes pending migrations and writes them through to the ledger.
pub struct Applier<'a> {
    ledger: &'a dyn Ledger,
    runners: &'a RunnerSet,
}

impl<'a> Applier<'a> {
    /// Create an applier.
    pub fn new(ledger: &'a dyn Ledger, runners: &'a RunnerSet) -> Self {
        Self { ledger, runners }
    }

    /// Apply `pending` in order under one batch.
    ///
    /// The first failure aborts the run. Migrations recorded before it stay
    /// recorded; the failing one is not recorded. A migration that ran but
    /// could not be recorded surfaces as `LedgerWriteFailure`.
    pub async fn apply(
        &self,
        ctx: &RunContext,
        pending: &[MigrationArtifact],
        mut on_event: impl FnMut(ApplyEvent<'_>),
    ) -> MigrateResult<ApplyReport> {
        let start = Instant::now();
        let mut report = ApplyReport {
            batch: ctx.batch,
            applied: Vec::new(),
            skipped: Vec::new(),
            backup: ctx.backup.clone(),
            duration_ms: 0,
        };

        for artifact in pending {
            let Some(runner) = self.runners.get(&artifact.kind) else {
                warn!(
                    migration = %artifact.filename,
                    kind = artifact.kind.label(),
                    "Skipping unknown migration file type"
                );
                on_event(ApplyEvent::Skipped(artifact));
                report.skipped.push(artifact.filename.clone());
                continue;
            };

            on_event(ApplyEvent::Started(artifact));

            runner.run(artifact, ctx).await.map_err(|e| match e {
                MigrationError::ExecutionFailure { .. } => e,
                other => MigrationError::execution_failure(&artifact.filename, other.to_string()),
            })?;

            let entry = LedgerEntry::new(
                &artifact.filename,
                &artifact.checksum,
                ctx.batch,
                ctx.backup.clone(),
            );
            self.ledger.insert(&entry).await.map_err(|e| match e {
                MigrationError::DuplicateFilename(_) => e,
                other => MigrationError::ledger_write(&artifact.filename, other.to_string()),
            })?;

            info!(migration = %artifact.filename, batch = ctx.batch, "Migration applied");
            on_event(ApplyEvent::Recorded(artifact));
            report.applied.push(artifact.filename.clone());
        }

        report.duration_ms = start.elapsed().as_millis() as i64;
        Ok(report)
    }
}
