use anyhow::Result;
use clap::Parser;
use colored::*;

use crate::{
    cli::handlers::commons,
    core::{hashing, store::StoreOptions},
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Shows the layers, the current version, and what can be undone."
)]
struct StatusArgs {
    /// Also list layers that do not take part in resolution.
    #[arg(long, short)]
    all: bool,
}

pub fn handle(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let status_args = StatusArgs::try_parse_from(&args)?;
    let store = commons::open_store(options, "status")?;
    let status = store.status()?;

    println!("\n--- {} ---", t!("status.header").yellow());
    println!("  {:<14} {}", t!("status.label.root").blue(), status.root.display());
    println!(
        "  {:<14} {}",
        t!("status.label.environment").blue(),
        status
            .active_environment
            .as_deref()
            .unwrap_or(t!("status.label.none"))
    );

    match &status.current_version {
        Some(record) => {
            let drift = if status.drifted {
                t!("status.label.drifted").yellow()
            } else {
                t!("status.label.in_sync").green()
            };
            println!(
                "  {:<14} {} ({})",
                t!("status.label.version").blue(),
                record.version.cyan(),
                drift
            );
        }
        None => println!(
            "  {:<14} {}",
            t!("status.label.version").blue(),
            t!("status.label.none").dimmed()
        ),
    }
    println!(
        "  {:<14} {}",
        t!("status.label.hash").blue(),
        hashing::short(&status.live_hash).dimmed()
    );
    println!("  {:<14} {}", t!("status.label.backups").blue(), status.backup_count);
    println!(
        "  {:<14} {}",
        t!("status.label.undoable").blue(),
        status.undoable_operations
    );

    println!("\n  {}:", t!("status.label.layers").blue());
    for layer in &status.layers {
        if !layer.active && !status_args.all {
            continue;
        }
        let marker = if layer.active { "•".green() } else { "·".dimmed() };
        if !layer.exists {
            println!(
                "    {} {:<18} {}",
                marker,
                layer.layer.to_string(),
                t!("status.label.missing").dimmed()
            );
            continue;
        }
        let documents: Vec<String> = layer
            .documents
            .iter()
            .map(|d| format!("{} ({})", d.kind, commons::format_size(d.size)))
            .collect();
        println!(
            "    {} {:<18} {}",
            marker,
            layer.layer.to_string(),
            documents.join(", ")
        );
    }

    commons::finish_with_warnings("Status", status.document_errors)
}
