//! CLI argument definitions using clap.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Ordo - ledger-based database migrations
#[derive(Parser, Debug)]
#[command(name = "ordo")]
#[command(version)]
#[command(about = "Ordo - ledger-based database migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "ORDO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the configuration file, migrations directory and ledger table
    Init(InitArgs),

    /// Apply pending migrations as a new batch
    Migrate(MigrateArgs),

    /// List applied and pending migrations
    Status(StatusArgs),

    /// Restore the most recent backup and forget its batch
    Rollback(RollbackArgs),

    /// Display version information
    Version,
}

// =============================================================================
// Init Command
// =============================================================================

/// Arguments for the `init` command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Database connection URL to write into the new configuration
    #[arg(short, long)]
    pub url: Option<String>,

    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

// =============================================================================
// Migrate Command
// =============================================================================

/// Arguments for the `migrate` command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Stop after the first pending migration whose filename contains this value
    #[arg(short, long)]
    pub target: Option<String>,

    /// Snapshot the database before applying the batch
    #[arg(short, long)]
    pub backup: bool,

    /// Show what would be applied without touching the database
    #[arg(long)]
    pub pretend: bool,
}

// =============================================================================
// Status Command
// =============================================================================

/// Arguments for the `status` command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

// =============================================================================
// Rollback Command
// =============================================================================

/// Arguments for the `rollback` command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate_flags() {
        let cli = Cli::parse_from(["ordo", "-vv", "migrate", "--target", "003", "--backup"]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Migrate(args) => {
                assert_eq!(args.target.as_deref(), Some("003"));
                assert!(args.backup);
                assert!(!args.pretend);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["ordo", "status", "--config", "custom.toml", "--json"]);

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Command::Status(StatusArgs { json: true })));
    }
}
