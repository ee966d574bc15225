//! `ordo migrate` command - Apply pending migrations.

use ordo_migrate::{ApplyEvent, MigrateOptions, MigrateOutcome};

use crate::cli::MigrateArgs;
use crate::commands::Session;
use crate::config::Config;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the migrate command
pub async fn run(args: MigrateArgs, config: &Config) -> CliResult<()> {
    output::header("Migrate");

    let session = Session::open(config).await?;

    let mut options = MigrateOptions::new()
        .backup(args.backup)
        .pretend(args.pretend);
    if let Some(target) = args.target {
        output::kv("Target", &target);
        options = options.target(target);
    }

    let outcome = session
        .engine
        .migrate(&options, |event| match event {
            ApplyEvent::Started(artifact) => output::applying(&artifact.filename),
            ApplyEvent::Skipped(artifact) => output::warn(&format!(
                "Skipped {} (no runner for '{}' files)",
                artifact.filename,
                artifact.kind.label()
            )),
            ApplyEvent::Recorded(_) => {}
        })
        .await?;

    match outcome {
        MigrateOutcome::UpToDate if args.pretend => {
            output::info("No pending migrations.");
        }
        MigrateOutcome::UpToDate => {
            success("Nothing to do. Database is up to date.");
        }
        MigrateOutcome::Pretend(plan) => {
            output::section("Pending migrations (would apply):");
            for filename in plan.filenames() {
                output::list_item(filename);
            }
            output::newline();
            output::dim(&plan.summary());
        }
        MigrateOutcome::Applied(report) => {
            output::newline();
            if let Some(backup) = &report.backup {
                output::kv("Backup", &backup.to_string());
            }
            output::kv("Duration", &format!("{}ms", report.duration_ms));
            success(&format!("{}.", report.summary()));
        }
    }

    Ok(())
}
