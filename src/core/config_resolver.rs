// src/core/config_resolver.rs

use crate::core::document::{self, DocumentError, LocatedDocument};
use crate::core::hashing;
use crate::core::paths::StoreLayout;
use crate::models::{
    ConfigurationShape, DocumentKind, DocumentStatus, Layer, LayerStatus, Scope, Tier,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// One document merged across every active layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDocument {
    pub kind: DocumentKind,
    /// The merged value, or `None` when no layer defines the document.
    pub value: Option<Value>,
    /// Layers that contributed, lowest precedence first.
    pub sources: Vec<(Layer, PathBuf)>,
    /// Files that could not be read or parsed. Their layers were skipped.
    pub errors: Vec<DocumentError>,
    /// Required base layers that do not define this document.
    pub not_found: Vec<Layer>,
    /// Non-fatal notes (e.g. shadowed files).
    pub warnings: Vec<String>,
}

/// The full effective configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfiguration {
    pub documents: BTreeMap<DocumentKind, ResolvedDocument>,
}

impl ResolvedConfiguration {
    /// The single object `{applications: ..., environment: ..., ...}` holding
    /// every defined document.
    pub fn merged_value(&self) -> Value {
        let mut merged = Map::new();
        for (kind, doc) in &self.documents {
            if let Some(value) = &doc.value {
                merged.insert(kind.as_str().to_string(), value.clone());
            }
        }
        Value::Object(merged)
    }

    /// blake3 hash of the normalized merged configuration.
    pub fn content_hash(&self) -> String {
        hashing::hash_value(&self.merged_value())
    }

    /// The structural shape of every defined document.
    pub fn shape(&self) -> ConfigurationShape {
        self.documents
            .iter()
            .filter_map(|(kind, doc)| doc.value.as_ref().map(|v| (*kind, document::shape_of(v))))
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = &DocumentError> {
        self.documents.values().flat_map(|d| d.errors.iter())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &String> {
        self.documents.values().flat_map(|d| d.warnings.iter())
    }

    /// `(layer, document)` pairs reported as not found.
    pub fn not_found(&self) -> Vec<(Layer, DocumentKind)> {
        self.documents
            .values()
            .flat_map(|d| d.not_found.iter().map(move |l| (l.clone(), d.kind)))
            .collect()
    }
}

/// Reads and merges configuration documents across the tiers of a layout.
/// Never mutates anything.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    layout: StoreLayout,
}

impl ConfigResolver {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Reads one document of one layer.
    ///
    /// Returns `Ok(None)` when the layer does not define the document.
    pub fn read_layer_document(
        &self,
        layer: &Layer,
        kind: DocumentKind,
    ) -> Result<Option<(LocatedDocument, Value)>, DocumentError> {
        let dir = self.layout.layer_dir(layer);
        let Some(located) = document::locate(&dir, kind) else {
            return Ok(None);
        };
        match document::read(&located.path, located.format) {
            Ok(value) => Ok(Some((located, value))),
            Err(message) => Err(DocumentError {
                layer: layer.clone(),
                kind,
                path: located.path,
                message,
            }),
        }
    }

    /// Merges `kind` across the active layers in precedence order.
    ///
    /// Mappings merge key by key; lists and scalars are replaced by the
    /// highest layer that defines them. Malformed files are reported in the
    /// result and skipped.
    pub fn resolve_document(&self, kind: DocumentKind) -> ResolvedDocument {
        let mut resolved = ResolvedDocument {
            kind,
            value: None,
            sources: Vec::new(),
            errors: Vec::new(),
            not_found: Vec::new(),
            warnings: Vec::new(),
        };

        for layer in self.layout.precedence() {
            match self.read_layer_document(&layer, kind) {
                Ok(Some((located, value))) => {
                    for shadowed in &located.shadowed {
                        resolved.warnings.push(format!(
                            "'{}' is ignored because '{}' takes precedence.",
                            shadowed.display(),
                            located.path.display()
                        ));
                    }
                    log::trace!("{} contributes '{}'.", layer, located.path.display());
                    resolved.sources.push((layer.clone(), located.path));
                    if value.is_null() {
                        continue;
                    }
                    match resolved.value.as_mut() {
                        Some(acc) => document::deep_merge(acc, value),
                        None => resolved.value = Some(value),
                    }
                }
                Ok(None) => {
                    if is_required(&layer, kind) {
                        resolved.not_found.push(layer);
                    }
                }
                Err(error) => {
                    log::warn!("Skipping malformed document: {}", error);
                    resolved.errors.push(error);
                }
            }
        }
        resolved
    }

    /// Resolves every document kind.
    pub fn resolve_all(&self) -> ResolvedConfiguration {
        ResolvedConfiguration {
            documents: DocumentKind::ALL
                .into_iter()
                .map(|kind| (kind, self.resolve_document(kind)))
                .collect(),
        }
    }

    /// The highest-precedence layer that supplies the dotted `key` of `kind`
    /// in the resolved view.
    pub fn provenance(&self, kind: DocumentKind, key: &str) -> Option<Layer> {
        let resolved = self.resolve_document(kind);
        document::get_path(resolved.value.as_ref()?, key)?;
        self.layout
            .precedence()
            .into_iter()
            .rev()
            .find(|layer| {
                matches!(
                    self.read_layer_document(layer, kind),
                    Ok(Some((_, value))) if document::get_path(&value, key).is_some()
                )
            })
    }

    /// Per layer, which documents exist and their size and modification time.
    pub fn list_tier_status(&self) -> Vec<LayerStatus> {
        let active = self.layout.precedence();
        self.layout
            .discover_layers()
            .into_iter()
            .map(|layer| {
                let path = self.layout.layer_dir(&layer);
                let documents = DocumentKind::ALL
                    .into_iter()
                    .filter_map(|kind| {
                        let located = document::locate(&path, kind)?;
                        let metadata = fs::metadata(&located.path).ok()?;
                        Some(DocumentStatus {
                            kind,
                            size: metadata.len(),
                            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                            path: located.path,
                        })
                    })
                    .collect();
                LayerStatus {
                    exists: path.is_dir(),
                    active: active.contains(&layer),
                    layer,
                    path,
                    documents,
                }
            })
            .collect()
    }
}

/// Default.Base and Team.Base must define every non-optional document.
fn is_required(layer: &Layer, kind: DocumentKind) -> bool {
    layer.scope == Scope::Base
        && matches!(layer.tier, Tier::Default | Tier::Team)
        && !kind.is_optional()
}
