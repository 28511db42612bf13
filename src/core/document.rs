// src/core/document.rs

use crate::constants::DOCUMENT_EXTENSIONS;
use crate::models::{DocumentKind, DocumentShape, Layer};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The on-disk formats a document can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// The extension used when a new document is created in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Parses `text` into a value tree. An empty document parses to `Null`.
    pub fn parse(&self, text: &str) -> Result<Value, String> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match self {
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Renders a value tree back into this format.
    pub fn render(&self, value: &Value) -> Result<String, String> {
        match self {
            Self::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(value)
                .map(|s| s + "\n")
                .map_err(|e| e.to_string()),
            Self::Toml => {
                if !value.is_object() {
                    return Err("TOML documents must be a table at the top level".to_string());
                }
                toml::to_string_pretty(value).map_err(|e| e.to_string())
            }
        }
    }
}

/// A document that failed to read or parse. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentError {
    pub layer: Layer,
    pub kind: DocumentKind,
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.path.display(),
            self.layer,
            self.message
        )
    }
}

/// The file backing a document in one layer directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
    /// Other files for the same document, ignored because `path` wins.
    pub shadowed: Vec<PathBuf>,
}

/// Finds the file of `kind` in `dir`, honouring the extension priority
/// (`yaml`, `yml`, `json`, `toml`).
pub fn locate(dir: &Path, kind: DocumentKind) -> Option<LocatedDocument> {
    let mut found = DOCUMENT_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", kind.as_str(), ext)))
        .filter(|p| p.is_file());
    let path = found.next()?;
    let format = DocumentFormat::from_path(&path)?;
    Some(LocatedDocument {
        path,
        format,
        shadowed: found.collect(),
    })
}

/// Reads and parses a document file.
pub fn read(path: &Path, format: DocumentFormat) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    format.parse(&text)
}

/// Merges `overlay` into `base`.
///
/// Mappings merge key by key, recursively. Anything else in `overlay`
/// (lists, scalars, a mapping over a non-mapping) replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn split_key(key: &str) -> Result<Vec<&str>, String> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(format!("Invalid key path '{}'.", key));
    }
    Ok(parts)
}

/// Looks up a dotted key path (`editor.theme`).
pub fn get_path<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in key.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Sets a dotted key path, creating intermediate mappings as needed.
///
/// # Errors
/// Fails if the path is malformed or walks through a non-mapping value.
pub fn set_path(doc: &mut Value, key: &str, value: Value) -> Result<(), String> {
    let parts = split_key(key)?;
    if doc.is_null() {
        *doc = Value::Object(Map::new());
    }
    let Some((last, parents)) = parts.split_last() else {
        return Err(format!("Invalid key path '{}'.", key));
    };

    let mut current = doc;
    for part in parents {
        let map = current
            .as_object_mut()
            .ok_or_else(|| format!("Cannot set '{}': '{}' is not a mapping.", key, part))?;
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = current
        .as_object_mut()
        .ok_or_else(|| format!("Cannot set '{}': parent is not a mapping.", key))?;
    map.insert(last.to_string(), value);
    Ok(())
}

/// Removes a dotted key path. Returns whether something was removed.
pub fn remove_path(doc: &mut Value, key: &str) -> bool {
    let Ok(parts) = split_key(key) else {
        return false;
    };
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };
    let mut current = doc;
    for part in parents {
        match current.as_object_mut().and_then(|m| m.get_mut(*part)) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current
        .as_object_mut()
        .map(|m| m.remove(*last).is_some())
        .unwrap_or(false)
}

/// Interprets a command-line value as a YAML scalar or flow collection
/// (`true`, `42`, `[a, b]`, `{k: v}`), falling back to a plain string.
pub fn parse_literal(raw: &str) -> Value {
    serde_yaml::from_str::<Value>(raw)
        .ok()
        .filter(|v| !v.is_null() || raw.trim() == "null" || raw.trim() == "~")
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// The structural shape of a resolved document.
pub fn shape_of(value: &Value) -> DocumentShape {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            DocumentShape::Mapping(keys)
        }
        Value::Array(_) => DocumentShape::List,
        _ => DocumentShape::Scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_deep_merge_replaces_lists_and_merges_maps() {
        let mut base = json!({
            "editor": {"name": "vim", "plugins": ["a", "b"], "tabs": 4},
            "shell": "bash"
        });
        let overlay = json!({
            "editor": {"plugins": ["c"], "theme": "dark"},
            "shell": {"name": "zsh"}
        });

        deep_merge(&mut base, overlay);

        assert_eq!(
            base,
            json!({
                "editor": {"name": "vim", "plugins": ["c"], "tabs": 4, "theme": "dark"},
                "shell": {"name": "zsh"}
            })
        );
    }

    #[test]
    fn test_parse_each_format() {
        let yaml = DocumentFormat::Yaml.parse("a: 1\nb: [x, y]\n").unwrap();
        let json = DocumentFormat::Json.parse(r#"{"a": 1, "b": ["x", "y"]}"#).unwrap();
        let toml = DocumentFormat::Toml.parse("a = 1\nb = [\"x\", \"y\"]\n").unwrap();
        assert_eq!(yaml, json);
        assert_eq!(json, toml);
        assert_eq!(DocumentFormat::Yaml.parse("  \n").unwrap(), Value::Null);
    }

    #[test]
    fn test_malformed_input_is_reported() {
        assert!(DocumentFormat::Json.parse("{not json").is_err());
        assert!(DocumentFormat::Toml.parse("a = ").is_err());
        assert!(DocumentFormat::Yaml.parse("a: [1, 2").is_err());
    }

    #[test]
    fn test_toml_render_requires_table() {
        assert!(DocumentFormat::Toml.render(&json!([1, 2])).is_err());
        let rendered = DocumentFormat::Toml.render(&json!({"a": 1})).unwrap();
        assert_eq!(DocumentFormat::Toml.parse(&rendered).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_locate_prefers_yaml_and_reports_shadowed() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("system.json"), "{}").unwrap();
        fs::write(dir.path().join("system.yaml"), "a: 1").unwrap();

        // --- Execute ---
        let located = locate(dir.path(), DocumentKind::System).unwrap();

        // --- Assert ---
        assert_eq!(located.format, DocumentFormat::Yaml);
        assert_eq!(located.shadowed, vec![dir.path().join("system.json")]);
        assert!(locate(dir.path(), DocumentKind::Desktop).is_none());
    }

    #[test]
    fn test_set_get_and_remove_paths() {
        let mut doc = Value::Null;
        set_path(&mut doc, "editor.theme", json!("dark")).unwrap();
        set_path(&mut doc, "editor.tabs", json!(2)).unwrap();
        assert_eq!(get_path(&doc, "editor.theme"), Some(&json!("dark")));

        assert!(set_path(&mut doc, "editor.theme.variant", json!(1)).is_err());
        assert!(set_path(&mut doc, "editor..x", json!(1)).is_err());

        assert!(remove_path(&mut doc, "editor.tabs"));
        assert!(!remove_path(&mut doc, "editor.tabs"));
        assert_eq!(doc, json!({"editor": {"theme": "dark"}}));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("true"), json!(true));
        assert_eq!(parse_literal("42"), json!(42));
        assert_eq!(parse_literal("[a, b]"), json!(["a", "b"]));
        assert_eq!(parse_literal("hello world"), json!("hello world"));
        assert_eq!(parse_literal("~"), Value::Null);
        assert_eq!(parse_literal(""), json!(""));
    }

    #[test]
    fn test_shape_of() {
        assert_eq!(
            shape_of(&json!({"b": 1, "a": 2})),
            DocumentShape::Mapping(vec!["a".into(), "b".into()])
        );
        assert_eq!(shape_of(&json!([1])), DocumentShape::List);
        assert_eq!(shape_of(&json!("x")), DocumentShape::Scalar);
    }
}
