//! Ordo CLI - Command-line interface for ledger-based migrations.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ordo_cli::cli::{Cli, Command};
use ordo_cli::commands;
use ordo_cli::config::Config;
use ordo_cli::error::CliResult;
use ordo_cli::output;

#[tokio::main]
async fn main() {
    // Run the CLI and handle errors
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref();

    // Run the appropriate command
    match cli.command {
        Command::Init(args) => commands::init::run(args, config_path).await,
        Command::Migrate(args) => commands::migrate::run(args, &Config::resolve(config_path)?).await,
        Command::Status(args) => commands::status::run(args, &Config::resolve(config_path)?).await,
        Command::Rollback(args) => {
            commands::rollback::run(args, &Config::resolve(config_path)?).await
        }
        Command::Version => commands::version::run().await,
    }
}

/// Install the log subscriber; `ORDO_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("ORDO_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
