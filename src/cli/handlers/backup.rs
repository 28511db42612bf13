use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use crate::{
    cli::handlers::commons,
    core::{backup_store::BackupReferences, hashing, store::StoreOptions},
    models::{BackupEntry, RestoreReport, Tier},
};

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Creates, inspects, restores and deletes configuration backups."
)]
struct BackupArgs {
    #[command(subcommand)]
    action: BackupAction,
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    /// Captures every tier's documents.
    Create {
        /// What this backup is for.
        #[arg(long, short, default_value = "")]
        description: String,
        /// Tags for later lookup (repeatable or comma-separated).
        #[arg(long, short, value_delimiter = ',')]
        tag: Vec<String>,
        /// Store files lz4-compressed, overriding the settings.
        #[arg(long)]
        compress: bool,
    },
    /// Lists backups, newest first.
    #[command(alias = "ls")]
    List {
        /// Id substring, exact tag, or description substring.
        filter: Option<String>,
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Shows one backup's manifest.
    Show { id: String },
    /// Restores a backup onto the live tiers, or under another root with `--to`.
    Restore {
        id: String,
        /// Write the files under this root instead; the live tiers are not touched.
        #[arg(long, value_name = "PATH", conflicts_with = "layer")]
        to: Option<PathBuf>,
        /// Restore only this tier's layer; other layers are kept.
        #[arg(long, value_enum, value_name = "TIER")]
        layer: Option<Tier>,
        /// With `--layer`, the environment layer of that tier instead of its base.
        #[arg(long = "layer-env", value_name = "NAME", requires = "layer")]
        layer_env: Option<String>,
        #[arg(long, short)]
        yes: bool,
    },
    /// Deletes a backup no version depends on.
    #[command(alias = "rm")]
    Delete {
        id: String,
        #[arg(long, short)]
        yes: bool,
    },
    /// Lists files added, removed and modified between two backups.
    #[command(alias = "diff")]
    Compare { first: String, second: String },
    /// Re-hashes a backup's stored files.
    Verify { id: String },
}

pub fn handle(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let backup_args = BackupArgs::try_parse_from(&args)?;
    let mut store = commons::open_store(options, "backup")?;

    match backup_args.action {
        BackupAction::Create {
            description,
            tag,
            compress,
        } => {
            let entry = store.create_backup(description, tag, compress.then_some(true))?;
            println!(
                "{} {}",
                t!("common.success"),
                format!(
                    t!("backup.success.created"),
                    id = entry.id.cyan(),
                    files = entry.files.len(),
                    size = commons::format_size(entry.size_bytes)
                )
            );
            println!("  {}", store.backups().dir().join(&entry.id).display().to_string().dimmed());
            commons::finish_with_warnings("Backup", entry.warnings)
        }
        BackupAction::List { filter, limit } => {
            let entries = store.backups().list(filter.as_deref(), limit)?;
            if entries.is_empty() {
                println!("{}", t!("backup.info.none").dimmed());
                return Ok(());
            }
            for entry in &entries {
                print_summary_line(entry, &store.ledger().referencing_versions(&entry.id));
            }
            Ok(())
        }
        BackupAction::Show { id } => {
            let entry = store.backups().get(&id)?;
            print_details(&entry);
            Ok(())
        }
        BackupAction::Restore {
            id,
            to,
            layer,
            layer_env,
            yes,
        } => match (to, layer) {
            (Some(root), _) => {
                let report = store.restore_backup_to(&id, &root)?;
                print_restore(&report);
                commons::finish_with_warnings("Restore", report.warnings)
            }
            (None, Some(tier)) => {
                let layer = commons::layer_from_args(tier, layer_env.as_deref())?;
                let prompt = format!(t!("backup.prompt.restore_layer"), id = id, layer = layer);
                if !commons::confirm(&prompt, yes)? {
                    return Ok(());
                }
                let outcome = store.restore_layer(&id, layer)?;
                print_restore(&outcome.result);
                commons::print_journaled(&outcome.operation, &outcome.pre_backup_id);
                commons::finish_with_warnings(
                    "Restore",
                    [outcome.backup_warnings, outcome.result.warnings].concat(),
                )
            }
            (None, None) => {
                let prompt = format!(t!("backup.prompt.restore"), id = id);
                if !commons::confirm(&prompt, yes)? {
                    return Ok(());
                }
                let outcome = store.restore_backup(&id)?;
                print_restore(&outcome.result);
                commons::print_journaled(&outcome.operation, &outcome.pre_backup_id);
                commons::finish_with_warnings(
                    "Restore",
                    [outcome.backup_warnings, outcome.result.warnings].concat(),
                )
            }
        },
        BackupAction::Delete { id, yes } => {
            let prompt = format!(t!("backup.prompt.delete"), id = id);
            if !commons::confirm(&prompt, yes)? {
                return Ok(());
            }
            store.delete_backup(&id)?;
            println!(
                "{} {}",
                t!("common.success"),
                format!(t!("backup.success.deleted"), id = id.cyan())
            );
            Ok(())
        }
        BackupAction::Compare { first, second } => {
            let comparison = store.backups().compare(&first, &second)?;
            if comparison.is_empty() {
                println!("{}", t!("backup.info.identical").dimmed());
                return Ok(());
            }
            for path in &comparison.added {
                println!("  {} {}", "+".green(), path);
            }
            for path in &comparison.removed {
                println!("  {} {}", "-".red(), path);
            }
            for path in &comparison.modified {
                println!("  {} {}", "~".yellow(), path);
            }
            Ok(())
        }
        BackupAction::Verify { id } => {
            let damaged = store.backups().verify(&id)?;
            if damaged.is_empty() {
                println!(
                    "{} {}",
                    t!("common.success"),
                    format!(t!("backup.success.verified"), id = id.cyan())
                );
            }
            commons::finish_with_warnings("Verify", damaged)
        }
    }
}

fn print_summary_line(entry: &BackupEntry, versions: &[String]) {
    let mut line = format!(
        "  {}  {:>4} {:<9} {}",
        entry.id.cyan(),
        entry.files.len(),
        commons::format_size(entry.size_bytes),
        entry.description
    );
    if !entry.tags.is_empty() {
        line.push_str(&format!(" {}", format!("[{}]", entry.tags.join(", ")).dimmed()));
    }
    if !versions.is_empty() {
        line.push_str(&format!(" {}", format!("<{}>", versions.join(", ")).green()));
    }
    if !entry.warnings.is_empty() {
        line.push_str(&format!(" {}", "!".yellow()));
    }
    println!("{}", line);
}

fn print_details(entry: &BackupEntry) {
    println!("\n--- {} '{}' ---", t!("backup.header.show"), entry.id.yellow());
    println!("  {:<13} {}", t!("backup.label.created").blue(), entry.created_at.to_rfc3339());
    println!("  {:<13} {}", t!("backup.label.description").blue(), entry.description);
    if !entry.tags.is_empty() {
        println!("  {:<13} {}", t!("backup.label.tags").blue(), entry.tags.join(", "));
    }
    println!(
        "  {:<13} {}{}",
        t!("backup.label.size").blue(),
        commons::format_size(entry.size_bytes),
        if entry.compressed { " (lz4)" } else { "" }
    );
    if !entry.source.command.is_empty() {
        println!(
            "  {:<13} {} {}",
            t!("backup.label.source").blue(),
            entry.source.command,
            format!("(envkeep {})", entry.source.tool_version).dimmed()
        );
    }

    println!("\n  {}:", t!("backup.label.files").blue());
    for file in &entry.files {
        println!(
            "    {:<40} {:>9} {}",
            file.logical_path(),
            commons::format_size(file.size),
            hashing::short(&file.hash).dimmed()
        );
    }
    for warning in &entry.warnings {
        println!("  {} {}", "!".yellow(), warning.yellow());
    }
}

fn print_restore(report: &RestoreReport) {
    println!(
        "{} {}",
        t!("common.success"),
        format!(
            t!("backup.success.restored"),
            id = report.backup_id.cyan(),
            root = report.target_root.display()
        )
    );
    for path in &report.written {
        println!("  {} {}", "w".green(), path);
    }
    for path in &report.removed {
        println!("  {} {}", "x".red(), path);
    }
    if !report.unchanged.is_empty() {
        println!(
            "  {}",
            format!(t!("backup.info.unchanged"), count = report.unchanged.len()).dimmed()
        );
    }
}
