//! `ordo version` command - Display version information.

use crate::error::CliResult;
use crate::output::{self, kv};

/// Package version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
const NAME: &str = env!("CARGO_PKG_NAME");

/// Run the version command
pub async fn run() -> CliResult<()> {
    output::header("Ordo");

    kv("Version", VERSION);
    kv("Binary", NAME);

    #[cfg(debug_assertions)]
    let build_mode = "debug";
    #[cfg(not(debug_assertions))]
    let build_mode = "release";

    kv("Build", build_mode);
    kv("Backends", "sqlite");
    kv("Runners", "script (.sql), procedure (.sh)");

    output::newline();

    output::section("Components");
    kv("ordo-migrate", env!("CARGO_PKG_VERSION"));
    kv("ordo-sqlite", env!("CARGO_PKG_VERSION"));

    Ok(())
}
