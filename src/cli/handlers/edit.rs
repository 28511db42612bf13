use anyhow::Result;
use clap::Parser;
use colored::*;
use serde_json::Value;

use crate::{
    cli::{args::LayerArgs, handlers::commons},
    core::{
        document,
        store::{DocumentWrite, EditAction, MutationOutcome, StoreOptions},
    },
    models::DocumentKind,
};

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Sets one key of one document in one layer."
)]
struct SetArgs {
    #[arg(value_enum)]
    document: DocumentKind,

    /// Dotted key (e.g. `editor.theme`).
    key: String,

    /// The value, read as a YAML scalar or flow collection (`42`, `true`, `[a, b]`).
    value: String,

    /// Store the value as a string without interpreting it.
    #[arg(long)]
    string: bool,

    #[command(flatten)]
    layer: LayerArgs,
}

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Removes one key of one document in one layer."
)]
struct UnsetArgs {
    #[arg(value_enum)]
    document: DocumentKind,

    /// Dotted key to remove.
    key: String,

    #[command(flatten)]
    layer: LayerArgs,
}

pub fn handle_set(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let set_args = SetArgs::try_parse_from(&args)?;
    let layer = commons::layer_from_args(set_args.layer.tier, set_args.layer.layer_env.as_deref())?;
    let value = if set_args.string {
        Value::String(set_args.value)
    } else {
        document::parse_literal(&set_args.value)
    };

    let mut store = commons::open_store(options, "set")?;
    let outcome = store.edit_document(
        layer,
        set_args.document,
        EditAction::Set {
            key: set_args.key.clone(),
            value,
        },
    )?;
    println!(
        "{} {}",
        t!("common.success"),
        format!(
            t!("edit.success.set"),
            key = set_args.key.cyan(),
            document = set_args.document
        )
    );
    report(outcome)
}

pub fn handle_unset(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let unset_args = UnsetArgs::try_parse_from(&args)?;
    let layer =
        commons::layer_from_args(unset_args.layer.tier, unset_args.layer.layer_env.as_deref())?;

    let mut store = commons::open_store(options, "unset")?;
    let outcome = store.edit_document(
        layer,
        unset_args.document,
        EditAction::Unset {
            key: unset_args.key.clone(),
        },
    )?;
    println!(
        "{} {}",
        t!("common.success"),
        format!(
            t!("edit.success.unset"),
            key = unset_args.key.cyan(),
            document = unset_args.document
        )
    );
    report(outcome)
}

fn report(outcome: MutationOutcome<DocumentWrite>) -> Result<()> {
    println!("  {}", outcome.result.path.display().to_string().dimmed());
    commons::print_journaled(&outcome.operation, &outcome.pre_backup_id);
    commons::finish_with_warnings("Edit", [outcome.backup_warnings, outcome.result.warnings].concat())
}
