//! Binary entry point (§6 ambient CLI surface): parses flags, loads an
//! optional TOML config file, wires up logging, and drives the `tokio`
//! accept loop. This is the one place in the workspace that deals in
//! opaque, display-only `anyhow::Error`s — every library crate below it
//! returns its own typed error.

mod cli;
mod connection;
mod server;

use std::process::ExitCode;

use cache_core::{resolve_config, CoreContext, PartialConfig};
use clap::Parser;

/// `sysexits.h`-style exit codes, reproduced because the reference
/// binary's exit contract is part of its operational surface (§6).
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_CONFIG: u8 = 78;

fn main() -> ExitCode {
    // clap's own `.exit()` picks 0 for --help/--version and its own usage
    // error code otherwise; the codes below cover failures after parsing.
    let cli = cli::Cli::parse();

    let file_config = match &cli.config_file {
        Some(path) => match PartialConfig::from_file(path) {
            Ok(c) => Some(c),
            // Missing/unreadable file: the path the user passed is wrong.
            Err(cache_core::CoreError::ConfigIo { path, source }) => {
                eprintln!("failed to load config file {path}: {source}");
                return ExitCode::from(EX_USAGE);
            }
            // Malformed TOML: the file exists but its contents are bad.
            Err(e) => {
                eprintln!("malformed config file {}: {e}", path.display());
                return ExitCode::from(EX_DATAERR);
            }
        },
        None => None,
    };

    let config = match resolve_config(file_config, cli.into_partial_config()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(EX_CONFIG);
        }
    };

    env_logger::Builder::new()
        .parse_filters(&config.log_level)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(EX_CONFIG);
        }
    };

    let ctx = CoreContext::new(config);
    match runtime.block_on(server::run(ctx)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("server error: {e:#}");
            ExitCode::from(EX_CONFIG)
        }
    }
}
