//! `ordo status` command - List applied and pending migrations.

use crate::cli::StatusArgs;
use crate::commands::Session;
use crate::config::Config;
use crate::error::CliResult;
use crate::output::{self, style_pending, style_success};

/// Checksum characters shown in the listing
const SHORT_CHECKSUM: usize = 12;

/// Leading characters of a checksum, safe for any stored text
fn short_checksum(checksum: &str) -> String {
    checksum.chars().take(SHORT_CHECKSUM).collect()
}

/// Run the status command
pub async fn run(args: StatusArgs, config: &Config) -> CliResult<()> {
    let session = Session::open(config).await?;
    let statuses = session.engine.status().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    output::header("Migration Status");
    output::kv("Database", &session.url);
    output::kv(
        "Migrations",
        &session.engine.config().migrations_dir.display().to_string(),
    );
    output::newline();

    if statuses.is_empty() {
        output::info("No migration files found.");
        return Ok(());
    }

    let width = statuses.iter().map(|s| s.filename.len()).max().unwrap_or(0);
    for status in &statuses {
        match &status.applied {
            Some(entry) => {
                let checksum = short_checksum(&entry.checksum);
                println!(
                    "  {}  {:<width$}  batch {}  {}  {}",
                    style_success("applied"),
                    status.filename,
                    entry.batch,
                    checksum,
                    entry.applied_at.format("%Y-%m-%d %H:%M:%S"),
                    width = width
                );
            }
            None => {
                println!(
                    "  {}  {:<width$}",
                    style_pending("pending"),
                    status.filename,
                    width = width
                );
            }
        }
    }

    let applied = statuses.iter().filter(|s| s.is_applied()).count();
    output::newline();
    output::dim(&format!(
        "{} applied, {} pending",
        applied,
        statuses.len() - applied
    ));

    Ok(())
}
