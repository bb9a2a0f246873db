//! `vaultbuild` binary.
//!
//! ```bash
//! # Validate vaultbuild.toml and every project in it
//! vaultbuild check
//!
//! # List what a build of `hello` would read
//! vaultbuild --root ~/vault assets hello
//!
//! # Warm the engine cache
//! vaultbuild engine fetch
//! ```

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use vaultbuild_cli::{Cli, runner};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = runner::init_logging(cli.verbose, cli.log_format) {
        eprintln!("{} {err:#}", "error:".red().bold());
        return ExitCode::FAILURE;
    }

    match runner::execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
