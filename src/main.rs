//! Entry point for the obsbin application.
//! Handles CLI parsing, logging and thread pool setup, then dispatches the subcommand.

use clap::Parser;
use obsbin::cli::{self, Cli};
use obsbin::errors::ObsBinError;
use obsbin::parallel::{get_parallel_info, ParallelConfig};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = ParallelConfig::new(args.threads).setup_global_pool() {
        eprintln!("❌ {e}");
        return ExitCode::FAILURE;
    }
    if args.verbose {
        get_parallel_info().log();
    }

    match cli::run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            if let Some(hint) = hint(&e) {
                eprintln!("   hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn hint(error: &ObsBinError) -> Option<&'static str> {
    match error {
        ObsBinError::FileExists { .. } => Some("pass -O/--overwrite to replace the existing file"),
        ObsBinError::VariableExists { .. } => {
            Some("each variable can only be binned once, remove the repeated -v/--var")
        }
        _ => None,
    }
}
