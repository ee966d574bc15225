//! Execution strategies, one per artifact kind.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::debug;

use crate::applier::RunContext;
use crate::error::{MigrateResult, MigrationError};
use crate::source::{ArtifactKind, MigrationArtifact};

/// Applies a declarative SQL script to the live database.
#[async_trait::async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute every statement in `sql`.
    async fn execute_script(&self, sql: &str) -> MigrateResult<()>;
}

/// Executes one kind of migration artifact.
#[async_trait::async_trait]
pub trait ArtifactRunner: Send + Sync {
    /// The kind this runner handles.
    fn kind(&self) -> ArtifactKind;

    /// Run the artifact as a single unit of change.
    async fn run(&self, artifact: &MigrationArtifact, ctx: &RunContext) -> MigrateResult<()>;
}

/// Runs `.sql` files through a [`ScriptExecutor`].
pub struct ScriptRunner {
    executor: Arc<dyn ScriptExecutor>,
}

impl ScriptRunner {
    /// Create a script runner.
    pub fn new(executor: Arc<dyn ScriptExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait::async_trait]
impl ArtifactRunner for ScriptRunner {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Script
    }

    async fn run(&self, artifact: &MigrationArtifact, _ctx: &RunContext) -> MigrateResult<()> {
        let sql = artifact.read_content().await?;
        debug!(migration = %artifact.filename, bytes = sql.len(), "Executing script");
        self.executor.execute_script(&sql).await
    }
}

/// Runs executable procedures through an interpreter.
///
/// The procedure sees `ORDO_MIGRATION` and `ORDO_BATCH` plus any configured
/// variables (typically `DATABASE_URL`).
#[derive(Debug, Clone)]
pub struct ProcedureRunner {
    interpreter: Vec<String>,
    env: Vec<(String, String)>,
}

impl Default for ProcedureRunner {
    fn default() -> Self {
        Self {
            interpreter: vec!["sh".to_string()],
            env: Vec::new(),
        }
    }
}

impl ProcedureRunner {
    /// Create a procedure runner using `sh`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interpreter command; the artifact path is appended as last argument.
    pub fn interpreter<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreter = command.into_iter().map(Into::into).collect();
        self
    }

    /// Export an environment variable to every procedure.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[async_trait::async_trait]
impl ArtifactRunner for ProcedureRunner {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Procedure
    }

    async fn run(&self, artifact: &MigrationArtifact, ctx: &RunContext) -> MigrateResult<()> {
        let (program, args) = self
            .interpreter
            .split_first()
            .ok_or_else(|| MigrationError::invalid("procedure interpreter is empty"))?;

        debug!(migration = %artifact.filename, interpreter = %program, "Running procedure");

        let output = Command::new(program)
            .args(args)
            .arg(&artifact.path)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("ORDO_MIGRATION", &artifact.filename)
            .env("ORDO_BATCH", ctx.batch.to_string())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                MigrationError::execution_failure(
                    &artifact.filename,
                    format!("failed to launch '{}': {}", program, e),
                )
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(migration = %artifact.filename, "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MigrationError::execution_failure(
                &artifact.filename,
                format!("procedure exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}

/// Registered runners keyed by artifact kind.
#[derive(Clone, Default)]
pub struct RunnerSet {
    runners: HashMap<ArtifactKind, Arc<dyn ArtifactRunner>>,
}

impl RunnerSet {
    /// Create an empty set. Every artifact would be skipped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner, replacing any previous one for its kind.
    pub fn with(mut self, runner: impl ArtifactRunner + 'static) -> Self {
        self.register(Arc::new(runner));
        self
    }

    /// Register a shared runner.
    pub fn register(&mut self, runner: Arc<dyn ArtifactRunner>) {
        self.runners.insert(runner.kind(), runner);
    }

    /// Runner for a kind, if any.
    pub fn get(&self, kind: &ArtifactKind) -> Option<&Arc<dyn ArtifactRunner>> {
        self.runners.get(kind)
    }

    /// Whether a kind can be executed.
    pub fn supports(&self, kind: &ArtifactKind) -> bool {
        self.runners.contains_key(kind)
    }
}

impl std::fmt::Debug for RunnerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.runners.keys().map(|k| k.label().to_string()).collect();
        kinds.sort();
        f.debug_struct("RunnerSet").field("kinds", &kinds).finish()
    }
}
