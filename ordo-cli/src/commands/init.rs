//! `ordo init` command - Create configuration, migrations directory and ledger.

use std::path::{Path, PathBuf};

use crate::cli::InitArgs;
use crate::commands::Session;
use crate::config::{CONFIG_FILE_NAME, Config, DEFAULT_DATABASE_URL};
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the init command
pub async fn run(args: InitArgs, config_path: Option<&Path>) -> CliResult<()> {
    output::header("Initialize Ordo");

    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    let config = if config_path.exists() && !args.force {
        output::info(&format!(
            "{} already exists, keeping it (use --force to overwrite)",
            config_path.display()
        ));
        if args.url.is_some() {
            output::warn("Ignoring --url because the configuration file already exists");
        }
        Config::load(&config_path)?
    } else {
        let mut config = Config::default();
        config.database.url = Some(args.url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()));
        config.save(&config_path)?;
        success(&format!("Created {}", config_path.display()));
        config
    };

    let session = Session::open(&config).await?;

    output::kv("Database", &session.url);
    output::kv(
        "Migrations",
        &config.migrations.directory.display().to_string(),
    );
    output::kv("Ledger table", &config.migrations.table_name);
    output::newline();

    success("Project initialized");
    output::dim("Add migrations as .sql or .sh files, then run `ordo migrate`.");

    Ok(())
}
