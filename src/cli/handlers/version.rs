use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

use crate::{
    cli::handlers::commons,
    core::{
        error::StoreError,
        hashing,
        store::{MutationOutcome, StoreOptions},
        version_ledger::{TransitionOutcome, VersionUpdate},
    },
    models::{CompatibilityReport, VersionKind, VersionRecord},
};

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Records, checks, migrates and rolls back configuration versions."
)]
struct VersionArgs {
    #[command(subcommand)]
    action: VersionAction,
}

#[derive(Subcommand, Debug)]
enum VersionAction {
    /// Shows the current version and whether the live configuration drifted.
    #[command(alias = "status")]
    Current,
    /// Lists every recorded version, newest first.
    #[command(alias = "ls")]
    List,
    /// Records the live configuration as a new version.
    #[command(alias = "record")]
    Update {
        /// Version name; `v<N>` when omitted.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short, default_value = "")]
        description: String,
        /// A change note (repeatable).
        #[arg(long = "change", short)]
        changes: Vec<String>,
    },
    /// Compares the live configuration's shape with a recorded version.
    Check { version: String },
    /// Writes a recorded version's files over the live ones, keeping the rest.
    Migrate {
        version: String,
        /// Proceed even when the check reports issues.
        #[arg(long)]
        force: bool,
        #[arg(long, short)]
        yes: bool,
    },
    /// Restores a recorded version exactly.
    Rollback {
        version: String,
        #[arg(long, short)]
        yes: bool,
    },
}

pub fn handle(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let version_args = VersionArgs::try_parse_from(&args)?;
    let mut store = commons::open_store(options, "version")?;

    match version_args.action {
        VersionAction::Current => {
            match store.ledger().current() {
                Some(record) => {
                    print_record(record);
                    if store.has_drifted() {
                        println!("\n  {}", t!("version.info.drifted").yellow());
                    } else {
                        println!("\n  {}", t!("version.info.in_sync").green());
                    }
                }
                None => println!("{}", t!("version.info.none").dimmed()),
            }
            Ok(())
        }
        VersionAction::List => {
            let records = store.ledger().list();
            if records.is_empty() {
                println!("{}", t!("version.info.none").dimmed());
            }
            for record in records {
                println!(
                    "  {:>3}  {:<12} {}  {:<10} {} {}",
                    record.sequence,
                    record.version.cyan(),
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    kind_label(&record.kind),
                    record.description,
                    format!("({})", record.author).dimmed()
                );
            }
            Ok(())
        }
        VersionAction::Update {
            name,
            description,
            changes,
        } => {
            let record = store.update_version(VersionUpdate {
                name,
                description,
                changes,
            })?;
            println!(
                "{} {}",
                t!("common.success"),
                format!(
                    t!("version.success.recorded"),
                    version = record.version.cyan(),
                    backup = record.backup_id
                )
            );
            let snapshot = store.backups().get(&record.backup_id)?;
            commons::finish_with_warnings("Version update", snapshot.warnings)
        }
        VersionAction::Check { version } => {
            let report = store.check_compatibility(&version)?;
            print_compatibility(&report);
            if report.compatible {
                Ok(())
            } else {
                Err(StoreError::Incompatible {
                    version: report.version,
                    issue_count: report.issues.len(),
                }
                .into())
            }
        }
        VersionAction::Migrate {
            version,
            force,
            yes,
        } => {
            let prompt = format!(t!("version.prompt.migrate"), version = version);
            if !commons::confirm(&prompt, yes)? {
                return Ok(());
            }
            let outcome = store.migrate_to(&version, force)?;
            report_transition(outcome)
        }
        VersionAction::Rollback { version, yes } => {
            let prompt = format!(t!("version.prompt.rollback"), version = version);
            if !commons::confirm(&prompt, yes)? {
                return Ok(());
            }
            let outcome = store.rollback_to(&version)?;
            report_transition(outcome)
        }
    }
}

fn kind_label(kind: &VersionKind) -> String {
    match kind {
        VersionKind::Snapshot => "snapshot".to_string(),
        VersionKind::Migration { to, .. } => format!("migrate→{}", to),
        VersionKind::Rollback { to, .. } => format!("rollback→{}", to),
    }
}

fn print_record(record: &VersionRecord) {
    println!("\n--- {} '{}' ---", t!("version.header"), record.version.yellow());
    println!("  {:<12} {}", t!("version.label.sequence").blue(), record.sequence);
    println!("  {:<12} {}", t!("version.label.recorded").blue(), record.timestamp.to_rfc3339());
    println!("  {:<12} {}", t!("version.label.author").blue(), record.author);
    println!("  {:<12} {}", t!("version.label.kind").blue(), kind_label(&record.kind));
    println!("  {:<12} {}", t!("version.label.backup").blue(), record.backup_id);
    println!(
        "  {:<12} {}",
        t!("version.label.hash").blue(),
        hashing::short(&record.content_hash)
    );
    if !record.description.is_empty() {
        println!("  {:<12} {}", t!("version.label.description").blue(), record.description);
    }
    for change in &record.changes {
        println!("    - {}", change);
    }
}

fn print_compatibility(report: &CompatibilityReport) {
    if report.compatible {
        println!(
            "{} {}",
            t!("common.success"),
            format!(t!("version.check.compatible"), version = report.version.cyan())
        );
    } else {
        println!(
            "{}",
            format!(t!("version.check.incompatible"), version = report.version.cyan()).red()
        );
    }
    for issue in &report.issues {
        println!("  {} {}", "✗".red(), issue);
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning.yellow());
    }
    if !report.required_actions.is_empty() {
        println!("\n  {}:", t!("version.check.required_actions").blue());
        for action in &report.required_actions {
            println!("    - {}", action);
        }
    }
}

fn report_transition(outcome: MutationOutcome<TransitionOutcome>) -> Result<()> {
    let transition = outcome.result;
    if let Some(report) = &transition.compatibility {
        if !report.compatible {
            print_compatibility(report);
        }
    }
    println!(
        "{} {}",
        t!("common.success"),
        format!(
            t!("version.success.transition"),
            version = transition.record.version.cyan(),
            kind = kind_label(&transition.record.kind)
        )
    );
    println!(
        "  {}",
        format!(
            t!("version.info.restored"),
            written = transition.restore.written.len(),
            removed = transition.restore.removed.len(),
            backup = transition.restore.backup_id
        )
        .dimmed()
    );
    commons::print_journaled(&outcome.operation, &outcome.pre_backup_id);
    commons::finish_with_warnings(
        "Version transition",
        [outcome.backup_warnings, transition.restore.warnings].concat(),
    )
}
