use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use colored::*;
use serde_json::Value;

use crate::{
    cli::handlers::commons,
    core::{config_resolver::ResolvedConfiguration, document, store::StoreOptions},
    models::DocumentKind,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    about = "Prints the effective configuration merged across all active layers."
)]
struct ResolveArgs {
    /// Only this document.
    #[arg(value_enum)]
    document: Option<DocumentKind>,

    /// A dotted key inside the document (e.g. `editor.theme`).
    key: Option<String>,

    /// Show which layer each value or document comes from.
    #[arg(long)]
    explain: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    format: OutputFormat,
}

pub fn handle(args: Vec<String>, options: &StoreOptions) -> Result<()> {
    let resolve_args = ResolveArgs::try_parse_from(&args)?;
    let store = commons::open_store(options, "resolve")?;
    let resolved = store.resolve();

    match (resolve_args.document, &resolve_args.key) {
        (Some(kind), Some(key)) => {
            let doc_value = resolved
                .documents
                .get(&kind)
                .and_then(|d| d.value.as_ref())
                .and_then(|v| document::get_path(v, key))
                .ok_or_else(|| anyhow!(t!("resolve.error.key_not_found"), key = key, document = kind))?;
            print!("{}", render(doc_value, resolve_args.format)?);
            if resolve_args.explain {
                if let Some(layer) = store.resolver().provenance(kind, key) {
                    eprintln!(
                        "{}",
                        format!(t!("resolve.info.defined_in"), layer = layer).dimmed()
                    );
                }
            }
        }
        (Some(kind), None) => {
            let value = resolved
                .documents
                .get(&kind)
                .and_then(|d| d.value.clone())
                .unwrap_or(Value::Null);
            print!("{}", render(&value, resolve_args.format)?);
        }
        (None, _) => {
            print!("{}", render(&resolved.merged_value(), resolve_args.format)?);
        }
    }

    if resolve_args.explain {
        print_sources(&resolved, resolve_args.document);
    }
    report_problems(&resolved)
}

fn render(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => {
            serde_yaml::to_string(value).context(t!("resolve.error.render_failed"))
        }
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .context(t!("resolve.error.render_failed")),
    }
}

/// Lists, per document, the layer files that were merged (lowest first).
fn print_sources(resolved: &ResolvedConfiguration, only: Option<DocumentKind>) {
    eprintln!("\n{}", t!("resolve.header.sources").blue().bold());
    for (kind, doc) in &resolved.documents {
        if only.is_some_and(|k| k != *kind) {
            continue;
        }
        if doc.sources.is_empty() {
            eprintln!("  {} {}", kind.as_str().cyan(), t!("resolve.label.undefined").dimmed());
            continue;
        }
        eprintln!("  {}", kind.as_str().cyan());
        for (layer, path) in &doc.sources {
            eprintln!("    {:<18} {}", layer.to_string(), path.display().to_string().dimmed());
        }
    }
}

/// Missing required documents are notes; malformed files and shadowed
/// duplicates make the command a partial failure.
fn report_problems(resolved: &ResolvedConfiguration) -> Result<()> {
    for (layer, kind) in resolved.not_found() {
        log::info!("{} defines no '{}' document.", layer, kind);
    }
    let mut warnings: Vec<String> = resolved.errors().map(|e| e.to_string()).collect();
    warnings.extend(resolved.warnings().cloned());
    commons::finish_with_warnings("Resolve", warnings)
}
