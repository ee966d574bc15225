//! CLI command implementations.

use std::sync::Arc;

use ordo_migrate::{
    CommandSnapshotter, MigrationConfig, MigrationEngine, ProcedureRunner, RunnerSet,
    ScriptRunner, Snapshotter,
};
use ordo_sqlite::{SqliteConfig, SqliteDatabase, SqliteExecutor, SqliteLedger, SqliteSnapshotter};
use tracing::debug;

use crate::config::Config;
use crate::error::{CliError, CliResult};

pub mod init;
pub mod migrate;
pub mod rollback;
pub mod status;
pub mod version;

/// A connected database with an engine wired to it.
pub struct Session {
    /// Resolved database URL.
    pub url: String,
    /// The migration engine.
    pub engine: MigrationEngine<SqliteLedger>,
}

impl Session {
    /// Connect to the configured database and prepare the ledger.
    pub async fn open(config: &Config) -> CliResult<Self> {
        let url = config.database_url()?;
        if url.contains("://") && !SqliteConfig::is_sqlite_url(&url) {
            return Err(CliError::Config(format!(
                "Unsupported database URL '{}'. Only sqlite: URLs are supported",
                url
            )));
        }

        let db = SqliteDatabase::connect(&url).await?;
        let ledger = SqliteLedger::with_table(db.clone(), &config.migrations.table_name)?;

        let runners = RunnerSet::new()
            .with(ScriptRunner::new(Arc::new(SqliteExecutor::new(db.clone()))))
            .with(
                ProcedureRunner::new()
                    .interpreter(config.procedures.interpreter.clone())
                    .env("DATABASE_URL", &url),
            );

        let backup = &config.backup;
        let snapshotter: Arc<dyn Snapshotter> =
            match (&backup.dump_command, &backup.restore_command) {
                (Some(dump), Some(restore)) => Arc::new(
                    CommandSnapshotter::new(&backup.directory, dump.clone(), restore.clone())
                        .prefix(&backup.prefix),
                ),
                (None, None) => Arc::new(
                    SqliteSnapshotter::new(db.clone(), &backup.directory).prefix(&backup.prefix),
                ),
                _ => {
                    return Err(CliError::Config(
                        "[backup] dump_command and restore_command must be set together"
                            .to_string(),
                    ));
                }
            };

        let engine = MigrationEngine::new(
            MigrationConfig::new()
                .migrations_dir(&config.migrations.directory)
                .extensions(config.migrations.extensions.clone()),
            ledger,
            runners,
        )
        .with_snapshotter(snapshotter);

        engine.initialize().await?;
        debug!(url = %url, "Session ready");

        Ok(Self { url, engine })
    }
}
