use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::PathBuf;

use crate::{
    cli::{args::LayerArgs, handlers::commons},
    core::store::StoreOptions,
    models::DocumentKind,
};

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Replaces a document of one layer with an external YAML, JSON or TOML file."
)]
struct ImportArgs {
    #[arg(value_enum)]
    document: DocumentKind,

    /// The file to import. Its extension decides the stored format.
    source: PathBuf,

    #[command(flatten)]
    layer: LayerArgs,
}

pub fn handle(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let import_args = ImportArgs::try_parse_from(&args)?;
    let layer = commons::layer_from_args(import_args.layer.tier, import_args.layer.layer_env.as_deref())?;

    let mut store = commons::open_store(options, "import")?;
    let outcome = store.import_document(layer.clone(), import_args.document, &import_args.source)?;

    println!(
        "{} {}",
        t!("common.success"),
        format!(
            t!("import.success"),
            document = import_args.document.to_string().cyan(),
            layer = layer
        )
    );
    println!("  {}", outcome.result.path.display().to_string().dimmed());
    for removed in &outcome.result.removed {
        println!(
            "  {}",
            format!(t!("import.info.removed"), path = removed.display()).dimmed()
        );
    }
    commons::print_journaled(&outcome.operation, &outcome.pre_backup_id);
    commons::finish_with_warnings(
        "Import",
        [outcome.backup_warnings, outcome.result.warnings].concat(),
    )
}
