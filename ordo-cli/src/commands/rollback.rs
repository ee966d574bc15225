//! `ordo rollback` command - Restore the most recent backup.

use ordo_migrate::RollbackOutcome;

use crate::cli::RollbackArgs;
use crate::commands::Session;
use crate::config::Config;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the rollback command
pub async fn run(args: RollbackArgs, config: &Config) -> CliResult<()> {
    output::header("Rollback");

    let session = Session::open(config).await?;
    let url = session.url.clone();

    let outcome = session
        .engine
        .rollback(args.force, |target| {
            output::kv("Batch", &target.batch.to_string());
            output::kv("Backup", &target.backup.to_string());
            output::newline();
            output::warn(&format!(
                "This will overwrite {} with the contents of {}.",
                url, target.backup
            ));
            output::confirm("Continue with the restore?")
        })
        .await?;

    match outcome {
        RollbackOutcome::Restored { batch, .. } => {
            success(&format!(
                "Rollback successful. Removed migrations for batch {}.",
                batch
            ));
        }
        RollbackOutcome::Declined { .. } => {
            output::info("Rollback cancelled.");
        }
    }

    Ok(())
}
