//! CLI configuration handling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ordo_migrate::DEFAULT_LEDGER_TABLE;
use ordo_migrate::source::DEFAULT_EXTENSIONS;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "ordo.toml";

/// Default migrations directory (relative to project root)
pub const MIGRATIONS_DIR: &str = "migrations";

/// Default backups directory (relative to project root)
pub const BACKUPS_DIR: &str = "backups";

/// Database URL written by `ordo init` when none is given
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./ordo.db";

/// Ordo CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Migration configuration
    pub migrations: MigrationsConfig,

    /// Procedure (`.sh`) configuration
    pub procedures: ProceduresConfig,

    /// Backup configuration
    pub backup: BackupConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the configuration a command should use.
    ///
    /// An explicitly named file must exist; the default `ordo.toml` is
    /// optional and falls back to defaults.
    pub fn resolve(explicit: Option<&Path>) -> CliResult<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(CliError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            ))),
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> CliResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the database URL, expanding `${VAR}` references.
    ///
    /// Falls back to `DATABASE_URL` when the file has no usable URL.
    pub fn database_url(&self) -> CliResult<String> {
        if let Some(ref url) = self.database.url {
            let expanded = expand_env_vars(url)?;
            if !expanded.is_empty() && !expanded.contains("${") {
                return Ok(expanded);
            }
        }

        std::env::var("DATABASE_URL").map_err(|_| {
            CliError::Config(
                "Database URL not found. Set DATABASE_URL environment variable or configure [database] url in ordo.toml"
                    .to_string(),
            )
        })
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: Option<String>,
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory for migration files
    pub directory: PathBuf,

    /// Ledger table name
    pub table_name: String,

    /// File extensions treated as migrations
    pub extensions: Vec<String>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(MIGRATIONS_DIR),
            table_name: DEFAULT_LEDGER_TABLE.to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Procedure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProceduresConfig {
    /// Interpreter command; the procedure path is appended as the last argument
    pub interpreter: Vec<String>,
}

impl Default for ProceduresConfig {
    fn default() -> Self {
        Self {
            interpreter: vec!["sh".to_string()],
        }
    }
}

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory snapshots are written to
    pub directory: PathBuf,

    /// Snapshot file prefix
    pub prefix: String,

    /// External dump command; its stdout becomes the snapshot
    pub dump_command: Option<Vec<String>>,

    /// External restore command; reads the snapshot on stdin
    pub restore_command: Option<Vec<String>>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(BACKUPS_DIR),
            prefix: "ordo".to_string(),
            dump_command: None,
            restore_command: None,
        }
    }
}

/// Expand `${VAR}` references from the environment.
///
/// Unset variables are left untouched.
pub fn expand_env_vars(s: &str) -> CliResult<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| CliError::Config(format!("invalid expansion pattern: {}", e)))?;

    Ok(re
        .replace_all(s, |caps: &regex_lite::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned())
}
