// src/core/paths.rs

use crate::constants::{
    BACKUPS_DIR, BASE_SCOPE_DIR, ENV_SCOPE_DIR, JOURNAL_FILENAME, LEDGER_FILENAME, LOCK_FILENAME,
    SETTINGS_FILENAME, TIERS_DIR,
};
use crate::models::{Layer, Scope, Tier};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref ENVKEEP_ROOT: Mutex<Option<PathBuf>> = Mutex::new(None);
    static ref ENVIRONMENT_NAME_RE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("static regex is valid");
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to expand path template '{template}': {message}")]
    Expansion { template: String, message: String },
}

/// Returns the default configuration root.
///
/// `ENVKEEP_HOME` wins when set; otherwise the root is `<config dir>/envkeep`
/// (`~/.config/envkeep` on Linux). The directory is created if missing.
///
/// This function is memoized: the first call computes and caches the path,
/// subsequent calls return the cached value.
pub fn default_root() -> Result<PathBuf, PathError> {
    let mut cached = ENVKEEP_ROOT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let root = match std::env::var_os("ENVKEEP_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs::config_dir()
            .ok_or(PathError::ConfigDirNotFound)?
            .join("envkeep"),
    };
    ensure_dir(&root)?;

    *cached = Some(root.clone());
    Ok(root)
}

/// Creates `path` (and its parents) if it does not exist yet.
pub fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| PathError::ConfigDirCreation {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Expands `~` and environment variables in a path template. Relative results
/// are anchored at `root`.
pub fn expand_path(template: &str, root: &Path) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        template: template.to_string(),
        message: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.into_owned());
    Ok(if path.is_absolute() {
        path
    } else {
        root.join(path)
    })
}

/// Whether `name` is usable as an environment directory name.
pub fn is_valid_environment_name(name: &str) -> bool {
    ENVIRONMENT_NAME_RE.is_match(name) && name != "." && name != ".."
}

/// Writes `content` to `path` through a temporary sibling file and a rename,
/// so readers never observe a half-written file. Parent directories are created.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// The on-disk layout of a configuration root.
///
/// ```text
/// <root>/envkeep.toml
/// <root>/tiers/<tier>/base/<document>.<ext>
/// <root>/tiers/<tier>/env/<name>/<document>.<ext>
/// <root>/backups/<id>/manifest.json
/// <root>/versions.jsonl
/// <root>/journal.jsonl
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
    tier_dirs: [PathBuf; 3],
    active_environment: Option<String>,
}

impl StoreLayout {
    /// A layout with every tier under `<root>/tiers`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tiers = root.join(TIERS_DIR);
        Self {
            tier_dirs: Tier::ALL.map(|t| tiers.join(t.as_str())),
            root,
            active_environment: None,
        }
    }

    /// Overrides the directory of one tier (e.g. a shared team directory).
    pub fn with_tier_dir(mut self, tier: Tier, dir: impl Into<PathBuf>) -> Self {
        if let Some(slot) = self.tier_dirs.get_mut(tier_index(tier)) {
            *slot = dir.into();
        }
        self
    }

    /// Sets the environment whose overlays take part in resolution.
    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.active_environment = environment;
        self
    }

    /// The same tier structure re-anchored under another root. Used to restore
    /// a backup somewhere other than the live tree.
    pub fn rebased(&self, root: impl Into<PathBuf>) -> Self {
        Self::new(root).with_environment(self.active_environment.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_environment(&self) -> Option<&str> {
        self.active_environment.as_deref()
    }

    pub fn tier_dir(&self, tier: Tier) -> &Path {
        self.tier_dirs
            .get(tier_index(tier))
            .map(PathBuf::as_path)
            .unwrap_or(&self.root)
    }

    /// The directory backing `layer`.
    pub fn layer_dir(&self, layer: &Layer) -> PathBuf {
        let tier_dir = self.tier_dir(layer.tier);
        match &layer.scope {
            Scope::Base => tier_dir.join(BASE_SCOPE_DIR),
            Scope::Env(name) => tier_dir.join(ENV_SCOPE_DIR).join(name),
        }
    }

    /// The layers taking part in resolution, lowest precedence first:
    /// Default.Base, Default.Env, Team.Base, Team.Env, User.Base, User.Env.
    /// Environment layers are only included when an environment is active.
    pub fn precedence(&self) -> Vec<Layer> {
        let mut layers = Vec::with_capacity(6);
        for tier in Tier::ALL {
            layers.push(Layer::base(tier));
            if let Some(env) = &self.active_environment {
                layers.push(Layer::env(tier, env.clone()));
            }
        }
        layers
    }

    /// Every layer that exists on disk plus the active ones, in precedence
    /// order and then by environment name.
    pub fn discover_layers(&self) -> Vec<Layer> {
        let mut layers = Vec::new();
        for tier in Tier::ALL {
            layers.push(Layer::base(tier));
            let mut names: Vec<String> = fs::read_dir(self.tier_dir(tier).join(ENV_SCOPE_DIR))
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter(|e| e.path().is_dir())
                        .filter_map(|e| e.file_name().to_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(env) = &self.active_environment {
                if !names.contains(env) {
                    names.push(env.clone());
                }
            }
            names.sort();
            layers.extend(names.into_iter().map(|n| Layer::env(tier, n)));
        }
        layers
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILENAME)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILENAME)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILENAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILENAME)
    }
}

fn tier_index(tier: Tier) -> usize {
    match tier {
        Tier::Default => 0,
        Tier::Team => 1,
        Tier::User => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_precedence_without_environment_has_three_layers() {
        let layout = StoreLayout::new("/cfg");
        let layers = layout.precedence();
        assert_eq!(
            layers,
            vec![
                Layer::base(Tier::Default),
                Layer::base(Tier::Team),
                Layer::base(Tier::User)
            ]
        );
    }

    #[test]
    fn test_precedence_with_environment_interleaves_overlays() {
        let layout = StoreLayout::new("/cfg").with_environment(Some("dev".into()));
        let layers: Vec<String> = layout.precedence().iter().map(|l| l.to_string()).collect();
        assert_eq!(
            layers,
            vec![
                "default/base",
                "default/env:dev",
                "team/base",
                "team/env:dev",
                "user/base",
                "user/env:dev"
            ]
        );
    }

    #[test]
    fn test_layer_dirs_and_tier_override() {
        let layout = StoreLayout::new("/cfg").with_tier_dir(Tier::Team, "/shared/team");
        assert_eq!(
            layout.layer_dir(&Layer::base(Tier::User)),
            PathBuf::from("/cfg/tiers/user/base")
        );
        assert_eq!(
            layout.layer_dir(&Layer::env(Tier::Team, "prod")),
            PathBuf::from("/shared/team/env/prod")
        );
    }

    #[test]
    fn test_discover_layers_finds_env_directories() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let layout = StoreLayout::new(dir.path()).with_environment(Some("dev".into()));
        fs::create_dir_all(layout.tier_dir(Tier::User).join("env/staging")).unwrap();

        // --- Execute ---
        let layers = layout.discover_layers();

        // --- Assert ---
        assert!(layers.contains(&Layer::env(Tier::User, "staging")));
        assert!(layers.contains(&Layer::env(Tier::User, "dev")));
        assert!(layers.contains(&Layer::env(Tier::Default, "dev")));
        assert!(!layers.contains(&Layer::env(Tier::Team, "staging")));
    }

    #[test]
    fn test_write_atomic_creates_parents_and_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/file.yaml");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn test_expand_path_anchors_relative_paths() {
        let expanded = expand_path("shared/team", Path::new("/cfg")).unwrap();
        assert_eq!(expanded, PathBuf::from("/cfg/shared/team"));
        let absolute = expand_path("/opt/team", Path::new("/cfg")).unwrap();
        assert_eq!(absolute, PathBuf::from("/opt/team"));
    }

    #[test]
    fn test_environment_name_validation() {
        assert!(is_valid_environment_name("dev"));
        assert!(is_valid_environment_name("prod-eu.1"));
        assert!(!is_valid_environment_name(""));
        assert!(!is_valid_environment_name("../etc"));
        assert!(!is_valid_environment_name("a/b"));
        assert!(!is_valid_environment_name(".hidden"));
    }
}
