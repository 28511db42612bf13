//! # Settings Loader
//!
//! Loads `envkeep.toml` from the configuration root and turns it into a
//! [`StoreLayout`]. Every field is optional; a missing file yields the defaults.
//! Environment variables (`ENVKEEP_ENV`, `ENVKEEP_AUTHOR`) override the file.

use crate::constants::DEFAULT_MAX_RETAINED_BACKUPS;
use crate::core::paths::{self, PathError, StoreLayout};
use crate::models::Tier;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid environment name '{0}' in settings.")]
    InvalidEnvironment(String),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// The contents of `envkeep.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Environment whose overlays are merged on top of each tier's base.
    pub active_environment: Option<String>,
    /// Author recorded in version records.
    pub author: Option<String>,
    /// Backup behaviour.
    pub backups: BackupSettings,
    /// Tier directory overrides (`~` and `$VAR` are expanded).
    pub tiers: TierDirSettings,
}

/// `[backups]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Number of backups kept before the oldest unreferenced ones are evicted.
    pub max_retained: usize,
    /// Compress captured files with lz4.
    pub compress: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            max_retained: DEFAULT_MAX_RETAINED_BACKUPS,
            compress: false,
        }
    }
}

/// `[tiers]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierDirSettings {
    pub default: Option<String>,
    pub team: Option<String>,
    pub user: Option<String>,
}

impl Settings {
    /// Reads `envkeep.toml` under `root`, then applies environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self, SettingsError> {
        let path = StoreLayout::new(root).settings_path();
        let mut settings = if path.is_file() {
            let content = fs::read_to_string(&path).map_err(|e| SettingsError::Read {
                path: path.clone(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| SettingsError::Parse {
                path: path.clone(),
                source: e,
            })?
        } else {
            log::debug!("No settings file at '{}', using defaults.", path.display());
            Self::default()
        };
        settings.apply_env_overrides(non_empty_var);
        Ok(settings)
    }

    /// `ENVKEEP_ENV` and `ENVKEEP_AUTHOR`, read through `var`, win over the file.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(env) = var("ENVKEEP_ENV") {
            self.active_environment = Some(env);
        }
        if let Some(author) = var("ENVKEEP_AUTHOR") {
            self.author = Some(author);
        }
    }

    /// The author recorded in version records, falling back to the login name.
    pub fn author(&self) -> String {
        self.author
            .clone()
            .or_else(|| non_empty_var("USER"))
            .or_else(|| non_empty_var("USERNAME"))
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Builds the layout for `root`, with tier overrides and the active environment.
    ///
    /// `environment_override` (from `--env`) takes precedence over the settings.
    pub fn layout(
        &self,
        root: &Path,
        environment_override: Option<&str>,
    ) -> Result<StoreLayout, SettingsError> {
        let environment = environment_override
            .map(str::to_string)
            .or_else(|| self.active_environment.clone());
        if let Some(env) = &environment {
            if !paths::is_valid_environment_name(env) {
                return Err(SettingsError::InvalidEnvironment(env.clone()));
            }
        }

        let mut layout = StoreLayout::new(root).with_environment(environment);
        let overrides = [
            (Tier::Default, &self.tiers.default),
            (Tier::Team, &self.tiers.team),
            (Tier::User, &self.tiers.user),
        ];
        for (tier, template) in overrides {
            if let Some(template) = template {
                let dir = paths::expand_path(template, root)?;
                log::debug!("Tier '{}' relocated to '{}'.", tier, dir.display());
                layout = layout.with_tier_dir(tier, dir);
            }
        }
        Ok(layout)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.backups.max_retained, DEFAULT_MAX_RETAINED_BACKUPS);
        assert!(!settings.backups.compress);
        assert_eq!(settings.tiers, TierDirSettings::default());
        assert!(
            !StoreLayout::new(dir.path()).settings_path().exists(),
            "nothing should be created"
        );
    }

    #[test]
    fn test_parse_full_settings() {
        // --- Setup ---
        let content = r#"
active_environment = "dev"
author = "Ada"

[backups]
max_retained = 5
compress = true

[tiers]
team = "shared/team"
"#;

        // --- Execute ---
        let settings: Settings = toml::from_str(content).unwrap();
        let layout = settings.layout(Path::new("/cfg"), None).unwrap();

        // --- Assert ---
        assert_eq!(settings.author.as_deref(), Some("Ada"));
        assert_eq!(settings.backups.max_retained, 5);
        assert!(settings.backups.compress);
        assert_eq!(layout.active_environment(), Some("dev"));
        assert_eq!(layout.tier_dir(Tier::Team), Path::new("/cfg/shared/team"));
        assert_eq!(layout.tier_dir(Tier::User), Path::new("/cfg/tiers/user"));
    }

    #[test]
    fn test_cli_environment_overrides_settings() {
        let settings = Settings {
            active_environment: Some("dev".into()),
            ..Settings::default()
        };
        let layout = settings.layout(Path::new("/cfg"), Some("prod")).unwrap();
        assert_eq!(layout.active_environment(), Some("prod"));
    }

    #[test]
    fn test_invalid_environment_is_rejected() {
        let settings = Settings::default();
        let result = settings.layout(Path::new("/cfg"), Some("../escape"));
        assert!(matches!(result, Err(SettingsError::InvalidEnvironment(_))));
    }

    #[test]
    fn test_malformed_settings_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("envkeep.toml"), "backups = [").unwrap();
        assert!(matches!(
            Settings::load(dir.path()),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        // --- Setup ---
        let mut settings: Settings =
            toml::from_str("active_environment = \"dev\"\nauthor = \"Ada\"\n").unwrap();
        let vars = |key: &str| match key {
            "ENVKEEP_ENV" => Some("prod".to_string()),
            "ENVKEEP_AUTHOR" => Some("Grace".to_string()),
            _ => None,
        };

        // --- Execute ---
        settings.apply_env_overrides(vars);

        // --- Assert ---
        assert_eq!(settings.active_environment.as_deref(), Some("prod"));
        assert_eq!(settings.author(), "Grace");
        let layout = settings.layout(Path::new("/cfg"), None).unwrap();
        assert_eq!(layout.active_environment(), Some("prod"));
    }

    #[test]
    fn test_unset_env_overrides_keep_file_values() {
        let mut settings: Settings =
            toml::from_str("active_environment = \"dev\"\nauthor = \"Ada\"\n").unwrap();
        settings.apply_env_overrides(|_| None);
        assert_eq!(settings.active_environment.as_deref(), Some("dev"));
        assert_eq!(settings.author(), "Ada");
    }
}
