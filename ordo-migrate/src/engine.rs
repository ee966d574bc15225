//! Migration engine implementation.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::applier::{ApplyEvent, ApplyReport, Applier, RunContext};
use crate::backup::{BackupCoordinator, RollbackOutcome, Snapshotter};
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{BatchBackup, Ledger};
use crate::planner::{self, ArtifactStatus, MigrationPlan};
use crate::runner::RunnerSet;
use crate::source::{DEFAULT_EXTENSIONS, MigrationSource};

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// File extensions treated as migrations.
    pub extensions: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the migration file extensions.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

/// Options for a single `migrate` run.
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Inclusive upper bound, matched against filenames.
    pub target: Option<String>,
    /// Snapshot the database before applying.
    pub backup: bool,
    /// Compute the plan without applying it.
    pub pretend: bool,
}

impl MigrateOptions {
    /// Default options: apply everything, no backup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the run by a target filename.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Request a snapshot before applying.
    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Only report what would be applied.
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }
}

/// Result of a `migrate` run.
#[derive(Debug)]
pub enum MigrateOutcome {
    /// No pending migrations.
    UpToDate,
    /// Pretend mode: the plan that would have been applied.
    Pretend(MigrationPlan),
    /// A batch was applied.
    Applied(ApplyReport),
}

/// The main migration engine.
///
/// Wires the source, ledger, runners and optional snapshot capability
/// together. Runs are strictly sequential; concurrent engines against the
/// same ledger are only guarded by the ledger's uniqueness check.
pub struct MigrationEngine<L: Ledger> {
    config: MigrationConfig,
    ledger: L,
    source: MigrationSource,
    runners: RunnerSet,
    snapshotter: Option<Arc<dyn Snapshotter>>,
}

impl<L: Ledger> MigrationEngine<L> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, ledger: L, runners: RunnerSet) -> Self {
        let source =
            MigrationSource::new(&config.migrations_dir).extensions(config.extensions.clone());
        Self {
            config,
            ledger,
            source,
            runners,
            snapshotter: None,
        }
    }

    /// Attach a snapshot capability, enabling backups and rollback.
    pub fn with_snapshotter(mut self, snapshotter: Arc<dyn Snapshotter>) -> Self {
        self.snapshotter = Some(snapshotter);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Get the ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Get the migration source.
    pub fn source(&self) -> &MigrationSource {
        &self.source
    }

    /// Create the migrations directory and the ledger storage.
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.source.ensure_dir().await?;
        self.ledger.initialize().await?;
        Ok(())
    }

    /// Applied/pending status of every migration, in filename order.
    pub async fn status(&self) -> MigrateResult<Vec<ArtifactStatus>> {
        let artifacts = self.source.list_artifacts().await?;
        let entries = self.ledger.recorded_entries().await?;
        Ok(planner::classify(&artifacts, &entries))
    }

    /// Compute the pending set, verifying applied checksums on the way.
    pub async fn plan(&self, target: Option<&str>) -> MigrateResult<MigrationPlan> {
        let artifacts = self.source.list_artifacts().await?;
        let entries = self.ledger.recorded_entries().await?;
        let pending = planner::plan(&artifacts, &entries, target)?;

        debug!(
            discovered = artifacts.len(),
            applied = entries.len(),
            pending = pending.len(),
            "Planned migrations"
        );

        Ok(MigrationPlan {
            pending,
            target: target.map(str::to_string),
        })
    }

    /// Apply pending migrations as one batch.
    pub async fn migrate(
        &self,
        options: &MigrateOptions,
        on_event: impl FnMut(ApplyEvent<'_>),
    ) -> MigrateResult<MigrateOutcome> {
        let plan = self.plan(options.target.as_deref()).await?;

        if plan.is_up_to_date() {
            return Ok(MigrateOutcome::UpToDate);
        }

        if options.pretend {
            return Ok(MigrateOutcome::Pretend(plan));
        }

        let batch = self.ledger.max_batch().await? + 1;
        let mut ctx = RunContext::new(batch);

        if options.backup {
            let snapshotter = self.snapshotter.as_deref().ok_or_else(|| {
                MigrationError::snapshot("no snapshot capability is configured")
            })?;
            let backup = BackupCoordinator::new(&self.ledger, snapshotter)
                .create_snapshot(batch)
                .await?;
            ctx = ctx.with_backup(backup);
        }

        info!(batch, count = plan.pending.len(), "Applying migrations");
        let report = Applier::new(&self.ledger, &self.runners)
            .apply(&ctx, &plan.pending, on_event)
            .await?;
        info!("{}", report.summary());

        Ok(MigrateOutcome::Applied(report))
    }

    /// Restore the most recent backup and drop its batch.
    pub async fn rollback(
        &self,
        force: bool,
        confirm: impl FnOnce(&BatchBackup) -> bool,
    ) -> MigrateResult<RollbackOutcome> {
        let Some(snapshotter) = self.snapshotter.as_deref() else {
            if self.ledger.most_recent_backup().await?.is_none() {
                return Err(MigrationError::NoBackupAvailable);
            }
            return Err(MigrationError::restore(
                "no snapshot capability is configured",
            ));
        };

        BackupCoordinator::new(&self.ledger, snapshotter)
            .rollback(force, confirm)
            .await
    }
}
