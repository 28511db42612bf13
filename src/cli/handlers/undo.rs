use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

use crate::{
    cli::handlers::commons,
    constants::DEFAULT_UNDO_LIST_LIMIT,
    core::store::StoreOptions,
    models::{UndoResult, UndoableOperation},
};

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Reverses journaled operations and inspects the journal."
)]
struct UndoArgs {
    #[command(subcommand)]
    action: Option<UndoAction>,
}

#[derive(Subcommand, Debug)]
enum UndoAction {
    /// Reverses the most recent operation (the default).
    Last {
        /// Undo even if a later operation touched the same target.
        #[arg(long)]
        force: bool,
        #[arg(long, short)]
        yes: bool,
    },
    /// Reverses operation `id`.
    Op {
        id: u64,
        #[arg(long)]
        force: bool,
        #[arg(long, short)]
        yes: bool,
    },
    /// Lists journaled operations, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(long, short = 'n', default_value_t = DEFAULT_UNDO_LIST_LIMIT)]
        limit: usize,
        /// Include operations that can no longer be undone.
        #[arg(long, short)]
        all: bool,
    },
    /// Shows one operation.
    Show { id: u64 },
    /// Counts of total and undoable operations.
    Summary,
}

pub fn handle(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let undo_args = UndoArgs::try_parse_from(&args)?;
    let mut store = commons::open_store(options, "undo")?;

    let action = undo_args.action.unwrap_or(UndoAction::Last {
        force: false,
        yes: false,
    });
    match action {
        UndoAction::Last { force, yes } => {
            if let Some(last) = store.journal().history(Some(1)).first() {
                println!("  {}", describe(last));
            }
            if !commons::confirm(t!("undo.prompt.last"), yes)? {
                return Ok(());
            }
            let result = store.undo_last(force)?;
            report(result)
        }
        UndoAction::Op { id, force, yes } => {
            let operation = store.journal().get_operation_details(id)?;
            println!("  {}", describe(operation));
            let prompt = format!(t!("undo.prompt.operation"), id = id);
            if !commons::confirm(&prompt, yes)? {
                return Ok(());
            }
            let result = store.undo_operation(id, force)?;
            report(result)
        }
        UndoAction::List { limit, all } => {
            let operations = if all {
                store.journal().history(Some(limit))
            } else {
                store.journal().get_undoable_operations(limit)
            };
            if operations.is_empty() {
                println!("{}", t!("undo.info.none").dimmed());
            }
            for operation in operations {
                println!("  {}", describe(operation));
            }
            Ok(())
        }
        UndoAction::Show { id } => {
            let journal = store.journal();
            let operation = journal.get_operation_details(id)?;
            print_details(operation);
            if !operation.can_undo {
                println!(
                    "  {} {}",
                    t!("undo.label.stale").yellow(),
                    journal.staleness_reason(operation)
                );
            }
            Ok(())
        }
        UndoAction::Summary => {
            let summary = store.journal().get_undo_summary();
            println!(
                "  {:<12} {}",
                t!("undo.label.total").blue(),
                summary.total_operations
            );
            println!(
                "  {:<12} {}",
                t!("undo.label.undoable").blue(),
                summary.undoable_operations
            );
            if let Some(last) = &summary.last_operation {
                println!("  {:<12} {}", t!("undo.label.last").blue(), describe(last));
            }
            if let Some(oldest) = summary.oldest_undoable {
                println!(
                    "  {:<12} {}",
                    t!("undo.label.oldest").blue(),
                    oldest.to_rfc3339()
                );
            }
            Ok(())
        }
    }
}

/// `#12 edit user/base/system  2026-01-05 10:12  set system.shell ...`
fn describe(operation: &UndoableOperation) -> String {
    let line = format!(
        "#{:<4} {:<8} {:<28} {}  {}",
        operation.id,
        operation.kind,
        operation.target.to_string(),
        operation.timestamp.format("%Y-%m-%d %H:%M"),
        operation.description
    );
    if operation.can_undo {
        line
    } else {
        line.dimmed().to_string()
    }
}

fn print_details(operation: &UndoableOperation) {
    println!("\n--- {} #{} ---", t!("undo.header"), operation.id.to_string().yellow());
    println!("  {:<12} {}", t!("undo.label.kind").blue(), operation.kind);
    println!("  {:<12} {}", t!("undo.label.target").blue(), operation.target);
    println!("  {:<12} {}", t!("undo.label.when").blue(), operation.timestamp.to_rfc3339());
    println!("  {:<12} {}", t!("undo.label.backup").blue(), operation.preceding_backup_id);
    println!("  {:<12} {}", t!("undo.label.description").blue(), operation.description);
    if let Some(undone) = operation.undoes {
        println!("  {:<12} #{}", t!("undo.label.undoes").blue(), undone);
    }
    for risk in &operation.undo_risks {
        println!("  {} {}", "!".yellow(), risk.yellow());
    }
}

fn report(result: UndoResult) -> Result<()> {
    println!("{} {}", t!("common.success"), result.message);
    println!(
        "  {}",
        format!(
            t!("undo.info.restored"),
            restored = result.restored_from,
            safety = result.new_backup_id,
            id = result.undo_operation_id
        )
        .dimmed()
    );
    for risk in &result.risks {
        println!("  {} {}", "!".yellow(), risk.yellow());
    }
    commons::finish_with_warnings("Undo", result.warnings)
}
