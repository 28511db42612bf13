// src/bin/envkeep.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use envkeep::{
    cli::{Cli, dispatcher},
    core::{
        error::{ErrorKind, StoreError},
        store::StoreOptions,
    },
};

/// Sets up logging, parses the global options, dispatches, and maps errors
/// to exit codes.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            // Handler-level usage errors and `--help` print through clap.
            clap_err.exit();
        }

        let code = match e.downcast_ref::<StoreError>() {
            Some(store_err) if store_err.kind() == ErrorKind::PartialFailure => {
                eprintln!("\n{}: {}", "Warning".yellow().bold(), store_err);
                store_err.exit_code()
            }
            Some(store_err) => {
                eprintln!("\n{}: {}", "Error".red().bold(), store_err);
                store_err.exit_code()
            }
            None => {
                eprintln!("\n{}: {}", "Error".red().bold(), format_chain(&e));
                1
            }
        };
        std::process::exit(code);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);
    let options = StoreOptions {
        root: cli.root,
        environment: cli.environment,
    };
    dispatcher::dispatch(cli.args, &options)
}

/// The error and its causes on one line each.
fn format_chain(e: &anyhow::Error) -> String {
    let mut message = e.to_string();
    for cause in e.chain().skip(1) {
        message.push_str(&format!("\n  {} {}", "caused by:".dimmed(), cause));
    }
    message
}
