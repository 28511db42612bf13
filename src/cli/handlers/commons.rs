// src/cli/handlers/commons.rs

// Shared helpers for the command handlers.

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::cell::Cell;

use crate::{
    core::{
        error::StoreError,
        paths,
        progress::ProgressObserver,
        store::{ConfigStore, StoreOptions},
    },
    models::{Layer, Tier, UndoableOperation},
};

/// Prints phase milestones to stderr so stdout stays parseable.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    total: Cell<Option<u64>>,
}

impl ProgressObserver for ConsoleProgress {
    fn start(&self, label: &str, total: Option<u64>) {
        self.total.set(total);
        match total {
            Some(total) => eprintln!("{} {}", label.dimmed(), format!("({})", total).dimmed()),
            None => eprintln!("{}", label.dimmed()),
        }
    }

    fn update(&self, current: u64, detail: &str) {
        log::trace!("[{}/{}] {}", current, self.total.get().unwrap_or(0), detail);
    }

    fn finish(&self, label: &str) {
        log::debug!("{} finished.", label);
    }
}

/// Opens the store for `command` with console progress.
pub fn open_store(options: &StoreOptions, command: &str) -> Result<ConfigStore> {
    let store = ConfigStore::open(options.clone())?;
    Ok(store
        .with_progress(Box::<ConsoleProgress>::default())
        .with_command(command))
}

/// Builds the layer addressed by `--tier` and an optional `--layer-env`.
pub fn layer_from_args(tier: Tier, environment: Option<&str>) -> Result<Layer> {
    if let Some(name) = environment {
        if !paths::is_valid_environment_name(name) {
            return Err(StoreError::InvalidInput(format!(
                t!("error.invalid_environment"),
                name = name
            ))
            .into());
        }
    }
    Ok(Layer::from_parts(tier, environment))
}

/// Asks before a destructive step. `--yes` answers for the user.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context(t!("error.confirmation_failed"))?;
    if !confirmed {
        println!("{}", t!("common.cancelled").dimmed());
    }
    Ok(confirmed)
}

/// The "operation #N journaled" line every mutating command ends with.
pub fn print_journaled(operation: &UndoableOperation, pre_backup_id: &str) {
    println!(
        "  {}",
        format!(
            t!("common.info.journaled"),
            id = operation.id,
            backup = pre_backup_id
        )
        .dimmed()
    );
    for risk in &operation.undo_risks {
        println!("  {} {}", "!".yellow(), risk.yellow());
    }
}

/// Prints `warnings` and turns a non-empty list into a `PartialFailure`, so
/// the process exits with its dedicated code after a completed command.
pub fn finish_with_warnings(operation: &str, warnings: Vec<String>) -> Result<()> {
    if warnings.is_empty() {
        return Ok(());
    }
    println!("\n{}", t!("common.warnings_header").yellow().bold());
    for warning in &warnings {
        println!("  - {}", warning.yellow());
    }
    Err(StoreError::PartialFailure {
        operation: operation.to_string(),
        warnings,
    }
    .into())
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        return format!("{} B", bytes);
    }
    format!("{:.1} {}", size, UNITS.get(unit).copied().unwrap_or("GiB"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_layer_from_args_rejects_bad_environment() {
        assert_eq!(layer_from_args(Tier::User, None).unwrap(), Layer::base(Tier::User));
        assert_eq!(
            layer_from_args(Tier::Team, Some("dev")).unwrap(),
            Layer::env(Tier::Team, "dev")
        );
        let err = layer_from_args(Tier::User, Some("../etc")).unwrap_err();
        let store_err = err.downcast_ref::<StoreError>().unwrap();
        assert_eq!(store_err.exit_code(), 64);
    }

    #[test]
    fn test_warnings_become_partial_failure() {
        assert!(finish_with_warnings("Restore", Vec::new()).is_ok());
        let err = finish_with_warnings("Restore", vec!["locked".into()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::PartialFailure { warnings, .. }) if warnings.len() == 1
        ));
    }

    #[test]
    fn test_confirm_assumes_yes() {
        assert!(confirm("Proceed?", true).unwrap());
    }
}
