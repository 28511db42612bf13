//! # Config Store
//!
//! The facade the CLI talks to. It opens a configuration root, owns the
//! resolver, backup store, version ledger and undo journal, and drives every
//! mutating command through the same protocol:
//!
//! 1. **Lock:** take the advisory store lock (fails fast with `Busy`).
//! 2. **Validate:** reject bad input before anything is written.
//! 3. **Reserve:** snapshot the tree and allocate a journal id.
//! 4. **Mutate:** perform the file work.
//! 5. **Commit:** append the journal line once the mutation was attempted.
//!
//! A fatal error in step 4 skips step 5 and names the pre-operation backup.

use crate::core::backup_store::{BackupStore, ReferenceSet, RestoreMode};
use crate::core::config_loader::{Settings, SettingsError};
use crate::core::config_resolver::{ConfigResolver, ResolvedConfiguration};
use crate::core::document::{self, DocumentFormat};
use crate::core::error::{StoreError, StoreResult};
use crate::core::lock::StoreLock;
use crate::core::paths::{self, PathError, StoreLayout};
use crate::core::progress::{LogProgress, ProgressObserver};
use crate::core::undo_journal::{UndoContext, UndoJournal};
use crate::core::version_ledger::{LedgerContext, TransitionOutcome, VersionLedger, VersionUpdate};
use crate::models::{
    BackupEntry, BackupOptions, CompatibilityReport, DocumentKind, Layer, LayerStatus,
    OperationKind, OperationTarget, RestoreReport, SourceContext, UndoResult, UndoableOperation,
    VersionRecord,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Where to open the store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Configuration root; the default root when `None`.
    pub root: Option<PathBuf>,
    /// Active environment, overriding the settings.
    pub environment: Option<String>,
}

/// A change to one key of one document.
#[derive(Debug, Clone, PartialEq)]
pub enum EditAction {
    /// Set a dotted key to a value.
    Set { key: String, value: Value },
    /// Remove a dotted key.
    Unset { key: String },
}

/// The outcome of a journaled mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
    /// The journal entry written for the mutation.
    pub operation: UndoableOperation,
    /// Backup holding the state before the mutation.
    pub pre_backup_id: String,
    /// Files that backup could not capture.
    pub backup_warnings: Vec<String>,
    /// Command-specific result.
    pub result: T,
}

/// What `edit` and `import` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentWrite {
    /// The file that now backs the document.
    pub path: PathBuf,
    /// Other files of the same document removed from the layer.
    pub removed: Vec<PathBuf>,
    /// Per-file failures that did not stop the write.
    pub warnings: Vec<String>,
}

/// A one-screen overview of the store.
#[derive(Debug, Clone)]
pub struct StoreStatus {
    pub root: PathBuf,
    pub active_environment: Option<String>,
    pub layers: Vec<LayerStatus>,
    pub current_version: Option<VersionRecord>,
    pub live_hash: String,
    pub drifted: bool,
    pub backup_count: usize,
    pub undoable_operations: usize,
    pub document_errors: Vec<String>,
}

/// The layered configuration store.
#[derive(Debug)]
pub struct ConfigStore {
    layout: StoreLayout,
    settings: Settings,
    resolver: ConfigResolver,
    backups: BackupStore,
    ledger: VersionLedger,
    journal: UndoJournal,
    progress: Box<dyn ProgressObserver>,
    command: String,
}

impl ConfigStore {
    /// Opens (and if needed creates) the store at the configured root.
    pub fn open(options: StoreOptions) -> StoreResult<Self> {
        let root = match options.root {
            Some(root) => root,
            None => paths::default_root().map_err(path_error)?,
        };
        paths::ensure_dir(&root).map_err(path_error)?;
        let root = dunce::canonicalize(&root).map_err(|e| StoreError::io(&root, e))?;

        let settings = Settings::load(&root).map_err(settings_error)?;
        let layout = settings
            .layout(&root, options.environment.as_deref())
            .map_err(settings_error)?;
        Self::with_layout(layout, settings)
    }

    /// Opens the store over an explicit layout.
    pub fn with_layout(layout: StoreLayout, settings: Settings) -> StoreResult<Self> {
        log::debug!(
            "Opening store at '{}' (environment: {}).",
            layout.root().display(),
            layout.active_environment().unwrap_or("none")
        );
        Ok(Self {
            resolver: ConfigResolver::new(layout.clone()),
            backups: BackupStore::new(&layout),
            ledger: VersionLedger::load(&layout.ledger_path())?,
            journal: UndoJournal::load(&layout.journal_path())?,
            layout,
            settings,
            progress: Box::new(LogProgress),
            command: String::new(),
        })
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Records the invoking command in the source context of new backups.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub fn journal(&self) -> &UndoJournal {
        &self.journal
    }

    /// The effective configuration.
    pub fn resolve(&self) -> ResolvedConfiguration {
        self.resolver.resolve_all()
    }

    pub fn status(&self) -> StoreResult<StoreStatus> {
        let resolved = self.resolver.resolve_all();
        let live_hash = resolved.content_hash();
        Ok(StoreStatus {
            root: self.layout.root().to_path_buf(),
            active_environment: self.layout.active_environment().map(str::to_string),
            layers: self.resolver.list_tier_status(),
            current_version: self.ledger.current().cloned(),
            drifted: self.ledger.has_drifted(&live_hash),
            live_hash,
            backup_count: self.backups.list(None, None)?.len(),
            undoable_operations: self.journal.get_undo_summary().undoable_operations,
            document_errors: resolved.errors().map(|e| e.to_string()).collect(),
        })
    }

    fn backup_template(&self) -> BackupOptions {
        BackupOptions {
            description: String::new(),
            tags: Vec::new(),
            compress: self.settings.backups.compress,
            max_retained: Some(self.settings.backups.max_retained),
            source: SourceContext {
                command: self.command.clone(),
                environment: self.layout.active_environment().map(str::to_string),
                root: self.layout.root().to_path_buf(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Everything retention must keep: versioned backups and the backups of
    /// still undoable operations.
    fn references(&self) -> ReferenceSet<'_> {
        ReferenceSet::new().with(&self.ledger).with(&self.journal)
    }

    fn lock(&self) -> StoreResult<StoreLock> {
        StoreLock::acquire(&self.layout.lock_path())
    }

    /// Reserve, mutate, commit. The caller must hold the store lock.
    fn run_mutation<T, F>(
        &mut self,
        _lock: &StoreLock,
        kind: OperationKind,
        target: OperationTarget,
        description: String,
        mutate: F,
    ) -> StoreResult<MutationOutcome<T>>
    where
        F: FnOnce(&Self) -> StoreResult<T>,
    {
        let backup = self.backups.create(
            &BackupOptions {
                description: format!("Before {}: {}", kind, description),
                tags: vec![format!("pre-{}", kind)],
                ..self.backup_template()
            },
            &self.references(),
            &*self.progress,
        )?;
        let pending = self
            .journal
            .reserve(kind, target, description, backup.id.clone());

        let result = match mutate(&*self) {
            Ok(result) => result,
            Err(e) => {
                log::error!(
                    "{} failed; pre-operation state kept in backup '{}'.",
                    kind,
                    backup.id
                );
                return Err(StoreError::Aborted {
                    operation: kind.to_string(),
                    backup_id: backup.id,
                    source: Box::new(e),
                });
            }
        };

        let operation = self.journal.commit(pending)?;
        Ok(MutationOutcome {
            operation,
            pre_backup_id: backup.id,
            backup_warnings: backup.warnings,
            result,
        })
    }

    // --- Documents ---

    /// Sets or removes one key of one document in one layer. The document is
    /// rewritten in its own format; a new document is created as YAML.
    pub fn edit_document(
        &mut self,
        layer: Layer,
        kind: DocumentKind,
        action: EditAction,
    ) -> StoreResult<MutationOutcome<DocumentWrite>> {
        let lock = self.lock()?;

        let existing = self
            .resolver
            .read_layer_document(&layer, kind)
            .map_err(|e| StoreError::Malformed {
                path: e.path,
                message: e.message,
            })?;
        let (path, format, mut value) = match existing {
            Some((located, value)) => (located.path, located.format, value),
            None => (
                self.layout
                    .layer_dir(&layer)
                    .join(format!("{}.{}", kind, DocumentFormat::Yaml.extension())),
                DocumentFormat::Yaml,
                Value::Null,
            ),
        };

        let description = match &action {
            EditAction::Set { key, value: new } => {
                document::set_path(&mut value, key, new.clone()).map_err(StoreError::InvalidInput)?;
                format!("set {}.{} in {}", kind, key, layer)
            }
            EditAction::Unset { key } => {
                if !document::remove_path(&mut value, key) {
                    return Err(StoreError::InvalidInput(format!(
                        "Key '{}' is not defined in {} of {}.",
                        key, kind, layer
                    )));
                }
                format!("unset {}.{} in {}", kind, key, layer)
            }
        };
        let rendered = format.render(&value).map_err(|message| {
            StoreError::InvalidInput(format!(
                "The edited '{}' cannot be written as {}: {}",
                kind,
                format.extension(),
                message
            ))
        })?;

        let target = OperationTarget::Document { layer, document: kind };
        self.run_mutation(&lock, OperationKind::Edit, target, description, |_| {
            paths::write_atomic(&path, rendered.as_bytes()).map_err(|e| StoreError::io(&path, e))?;
            Ok(DocumentWrite {
                path: path.clone(),
                removed: Vec::new(),
                warnings: Vec::new(),
            })
        })
    }

    /// Copies `source` into `layer` as document `kind`, keeping the source's
    /// format. Other files of the same document in that layer are removed so
    /// the imported one takes effect.
    pub fn import_document(
        &mut self,
        layer: Layer,
        kind: DocumentKind,
        source: &Path,
    ) -> StoreResult<MutationOutcome<DocumentWrite>> {
        let lock = self.lock()?;

        let format = DocumentFormat::from_path(source).ok_or_else(|| {
            StoreError::InvalidInput(format!(
                "Cannot tell the format of '{}'. Use a .yaml, .yml, .json or .toml file.",
                source.display()
            ))
        })?;
        let content = fs::read(source).map_err(|e| StoreError::io(source, e))?;
        let text = String::from_utf8_lossy(&content);
        format
            .parse(&text)
            .map_err(|message| StoreError::Malformed {
                path: source.to_path_buf(),
                message,
            })?;

        let dir = self.layout.layer_dir(&layer);
        let destination = dir.join(format!("{}.{}", kind, format.extension()));
        let displaced: Vec<PathBuf> = document::locate(&dir, kind)
            .map(|located| {
                std::iter::once(located.path)
                    .chain(located.shadowed)
                    .filter(|p| *p != destination)
                    .collect()
            })
            .unwrap_or_default();

        let description = format!("import {} into {} from '{}'", kind, layer, source.display());
        let target = OperationTarget::Document { layer, document: kind };
        self.run_mutation(&lock, OperationKind::Import, target, description, |_| {
            paths::write_atomic(&destination, &content)
                .map_err(|e| StoreError::io(&destination, e))?;
            let mut write = DocumentWrite {
                path: destination.clone(),
                removed: Vec::new(),
                warnings: Vec::new(),
            };
            for old in displaced {
                match fs::remove_file(&old) {
                    Ok(()) => write.removed.push(old),
                    Err(e) => write
                        .warnings
                        .push(format!("Could not remove '{}': {}", old.display(), e)),
                }
            }
            Ok(write)
        })
    }

    // --- Backups ---

    /// Takes an explicit backup.
    pub fn create_backup(
        &mut self,
        description: String,
        tags: Vec<String>,
        compress: Option<bool>,
    ) -> StoreResult<BackupEntry> {
        let _lock = self.lock()?;
        let template = self.backup_template();
        self.backups.create(
            &BackupOptions {
                description,
                tags,
                compress: compress.unwrap_or(template.compress),
                ..template
            },
            &self.references(),
            &*self.progress,
        )
    }

    /// Restores backup `id` exactly onto the live tree, as a journaled operation.
    pub fn restore_backup(&mut self, id: &str) -> StoreResult<MutationOutcome<RestoreReport>> {
        let lock = self.lock()?;
        self.backups.get(id)?;
        self.run_mutation(
            &lock,
            OperationKind::Restore,
            OperationTarget::Tree,
            format!("restore backup '{}'", id),
            |store| store.backups.restore(id, None, &*store.progress),
        )
    }

    /// Restores only the files of `layer` from backup `id`. Files of that
    /// layer missing from the backup are removed; other layers are untouched.
    pub fn restore_layer(
        &mut self,
        id: &str,
        layer: Layer,
    ) -> StoreResult<MutationOutcome<RestoreReport>> {
        let lock = self.lock()?;
        self.backups.get(id)?;
        let description = format!("restore layer {} from backup '{}'", layer, id);
        let target = OperationTarget::Layer { layer };
        let scope = target.clone();
        self.run_mutation(&lock, OperationKind::Restore, target, description, |store| {
            store
                .backups
                .restore_scoped(id, &scope, RestoreMode::Exact, &*store.progress)
        })
    }

    /// Replays backup `id` under another root. The live tree is untouched, so
    /// nothing is locked or journaled.
    pub fn restore_backup_to(&self, id: &str, root: &Path) -> StoreResult<RestoreReport> {
        self.backups.restore(id, Some(root), &*self.progress)
    }

    pub fn delete_backup(&mut self, id: &str) -> StoreResult<()> {
        let _lock = self.lock()?;
        self.backups.delete(id, &self.ledger)
    }

    // --- Versions ---

    /// Records the live configuration as a new version.
    pub fn update_version(&mut self, update: VersionUpdate) -> StoreResult<VersionRecord> {
        let _lock = self.lock()?;
        let ctx = LedgerContext {
            resolver: &self.resolver,
            backups: &self.backups,
            journal: &self.journal,
            backup_template: self.backup_template(),
            author: self.settings.author(),
            progress: &*self.progress,
        };
        self.ledger.update(update, &ctx)
    }

    pub fn check_compatibility(&self, version: &str) -> StoreResult<CompatibilityReport> {
        self.ledger
            .check_compatibility(version, &self.resolver.resolve_all(), &self.backups)
    }

    /// Whether the live configuration differs from the current version.
    pub fn has_drifted(&self) -> bool {
        self.ledger
            .has_drifted(&self.resolver.resolve_all().content_hash())
    }

    pub fn migrate_to(
        &mut self,
        version: &str,
        force: bool,
    ) -> StoreResult<MutationOutcome<TransitionOutcome>> {
        let _lock = self.lock()?;
        let ctx = LedgerContext {
            resolver: &self.resolver,
            backups: &self.backups,
            journal: &self.journal,
            backup_template: self.backup_template(),
            author: self.settings.author(),
            progress: &*self.progress,
        };
        let outcome = self.ledger.migrate_to(version, force, &ctx)?;
        self.journal_transition(OperationKind::Migrate, format!("migrate to '{}'", version), outcome)
    }

    pub fn rollback_to(&mut self, version: &str) -> StoreResult<MutationOutcome<TransitionOutcome>> {
        let _lock = self.lock()?;
        let ctx = LedgerContext {
            resolver: &self.resolver,
            backups: &self.backups,
            journal: &self.journal,
            backup_template: self.backup_template(),
            author: self.settings.author(),
            progress: &*self.progress,
        };
        let outcome = self.ledger.rollback_to(version, &ctx)?;
        self.journal_transition(OperationKind::Rollback, format!("roll back to '{}'", version), outcome)
    }

    fn journal_transition(
        &mut self,
        kind: OperationKind,
        description: String,
        outcome: TransitionOutcome,
    ) -> StoreResult<MutationOutcome<TransitionOutcome>> {
        let pending = self.journal.reserve(
            kind,
            OperationTarget::Tree,
            description,
            outcome.pre_backup.id.clone(),
        );
        let operation = self.journal.commit(pending)?;
        Ok(MutationOutcome {
            operation,
            pre_backup_id: outcome.pre_backup.id.clone(),
            backup_warnings: outcome.backup_warnings.clone(),
            result: outcome,
        })
    }

    // --- Undo ---

    pub fn undo_last(&mut self, force: bool) -> StoreResult<UndoResult> {
        let _lock = self.lock()?;
        let ctx = UndoContext {
            backups: &self.backups,
            references: &self.ledger,
            backup_template: self.backup_template(),
            progress: &*self.progress,
        };
        self.journal.undo_last(force, &ctx)
    }

    pub fn undo_operation(&mut self, id: u64, force: bool) -> StoreResult<UndoResult> {
        let _lock = self.lock()?;
        let ctx = UndoContext {
            backups: &self.backups,
            references: &self.ledger,
            backup_template: self.backup_template(),
            progress: &*self.progress,
        };
        self.journal.undo_operation(id, force, &ctx)
    }
}

fn path_error(e: PathError) -> StoreError {
    match e {
        PathError::ConfigDirCreation { path, source } => StoreError::io(path, source),
        other => StoreError::InvalidInput(other.to_string()),
    }
}

fn settings_error(e: SettingsError) -> StoreError {
    match e {
        SettingsError::Read { path, source } => StoreError::io(path, source),
        SettingsError::Parse { path, source } => StoreError::Malformed {
            path,
            message: source.to_string(),
        },
        SettingsError::InvalidEnvironment(name) => {
            StoreError::InvalidInput(format!("Invalid environment name '{}'.", name))
        }
        SettingsError::Path(e) => path_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::progress::SilentProgress;
    use crate::models::{Tier, VersionKind};
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    fn open(dir: &TempDir) -> ConfigStore {
        ConfigStore::open(StoreOptions {
            root: Some(dir.path().to_path_buf()),
            environment: None,
        })
        .unwrap()
        .with_progress(Box::new(SilentProgress))
    }

    fn seed(store: &ConfigStore, layer: &Layer, file: &str, content: &str) {
        let dir = store.layout().layer_dir(layer);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    fn read(store: &ConfigStore, layer: &Layer, file: &str) -> Option<String> {
        fs::read_to_string(store.layout().layer_dir(layer).join(file)).ok()
    }

    fn set(key: &str, value: Value) -> EditAction {
        EditAction::Set {
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn test_edit_then_undo_restores_bytes_and_journals_both() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        let original = "# my editor\neditor: vim\n";
        seed(&store, &user, "applications.yaml", original);

        // --- Execute ---
        let edit = store
            .edit_document(user.clone(), DocumentKind::Applications, set("editor", json!("nano")))
            .unwrap();
        let undo = store.undo_last(false).unwrap();

        // --- Assert ---
        assert_eq!(read(&store, &user, "applications.yaml").as_deref(), Some(original));
        assert_eq!(undo.restored_from, edit.pre_backup_id);
        assert_eq!(store.journal().history(None).len(), 2);
        assert!(store.journal().can_undo());
        assert!(!store.layout().lock_path().exists());
    }

    #[test]
    fn test_edit_creates_yaml_document_and_keeps_format() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let team = Layer::base(Tier::Team);
        seed(&store, &team, "system.json", "{\"proxy\": \"none\"}");

        store
            .edit_document(team.clone(), DocumentKind::System, set("proxy", json!("corp")))
            .unwrap();
        store
            .edit_document(team.clone(), DocumentKind::Desktop, set("theme.name", json!("dark")))
            .unwrap();

        let system: Value =
            serde_json::from_str(&read(&store, &team, "system.json").unwrap()).unwrap();
        assert_eq!(system, json!({"proxy": "corp"}));
        assert!(read(&store, &team, "desktop.yaml").is_some());
        let resolved = store.resolve().merged_value();
        assert_eq!(resolved["desktop"], json!({"theme": {"name": "dark"}}));
    }

    #[test]
    fn test_invalid_edit_is_rejected_before_any_backup() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "system.yaml", "shell: bash\n");

        let err = store
            .edit_document(
                user,
                DocumentKind::System,
                EditAction::Unset {
                    key: "missing".into(),
                },
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(store.backups().list(None, None).unwrap().is_empty());
        assert!(store.journal().history(None).is_empty());
    }

    #[test]
    fn test_busy_lock_fails_before_mutation() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "system.yaml", "shell: bash\n");
        let _held = StoreLock::acquire(&store.layout().lock_path()).unwrap();

        // --- Execute ---
        let err = store
            .edit_document(user.clone(), DocumentKind::System, set("shell", json!("zsh")))
            .unwrap_err();

        // --- Assert ---
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: bash\n"));
        assert!(store.backups().list(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_fatal_mutation_writes_no_journal_entry() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        // A file where the layer directory should be makes the write fail.
        let tier_dir = store.layout().tier_dir(Tier::User).to_path_buf();
        fs::create_dir_all(&tier_dir).unwrap();
        fs::write(tier_dir.join("base"), "not a directory").unwrap();

        // --- Execute ---
        let err = store
            .edit_document(
                Layer::base(Tier::User),
                DocumentKind::System,
                set("shell", json!("zsh")),
            )
            .unwrap_err();

        // --- Assert ---
        let StoreError::Aborted { backup_id, .. } = &err else {
            panic!("expected an aborted mutation, got {err:?}");
        };
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(store.backups().exists(backup_id));
        assert!(store.journal().history(None).is_empty());
    }

    #[test]
    fn test_import_replaces_other_formats() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "environment.yaml", "EDITOR: vim\n");
        let source = dir.path().join("incoming.json");
        fs::write(&source, "{\"EDITOR\": \"hx\"}").unwrap();

        let outcome = store
            .import_document(user.clone(), DocumentKind::Environment, &source)
            .unwrap();

        assert_eq!(outcome.result.removed.len(), 1);
        assert!(read(&store, &user, "environment.yaml").is_none());
        assert_eq!(
            store.resolve().merged_value()["environment"],
            json!({"EDITOR": "hx"})
        );

        store.undo_last(false).unwrap();
        assert_eq!(read(&store, &user, "environment.yaml").as_deref(), Some("EDITOR: vim\n"));
        assert!(read(&store, &user, "environment.json").is_none());
    }

    #[test]
    fn test_import_rejects_malformed_source() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let source = dir.path().join("broken.toml");
        fs::write(&source, "a = ").unwrap();

        let err = store
            .import_document(Layer::base(Tier::User), DocumentKind::System, &source)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(store.journal().history(None).is_empty());
    }

    #[test]
    fn test_restore_is_journaled_and_undoable() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "system.yaml", "shell: bash\n");
        let snapshot = store
            .create_backup("manual".into(), vec!["stable".into()], None)
            .unwrap();
        seed(&store, &user, "system.yaml", "shell: zsh\n");

        let outcome = store.restore_backup(&snapshot.id).unwrap();
        assert_eq!(outcome.result.written, vec!["user/base/system.yaml".to_string()]);
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: bash\n"));

        let undo = store.undo_last(false).unwrap();
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: zsh\n"));
        assert!(undo.warnings.is_empty());
        assert_eq!(
            undo.risks,
            vec!["Undoing this operation rewrites every tier and environment.".to_string()]
        );
    }

    #[test]
    fn test_layer_restore_leaves_other_layers_and_undoes() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        let team = Layer::base(Tier::Team);
        seed(&store, &user, "system.yaml", "shell: bash\n");
        seed(&store, &team, "system.yaml", "proxy: none\n");
        let snapshot = store.create_backup("both".into(), vec![], None).unwrap();
        seed(&store, &user, "system.yaml", "shell: zsh\n");
        seed(&store, &user, "desktop.yaml", "theme: dark\n");
        seed(&store, &team, "system.yaml", "proxy: corp\n");

        // --- Execute ---
        let outcome = store.restore_layer(&snapshot.id, user.clone()).unwrap();

        // --- Assert ---
        assert_eq!(
            outcome.operation.target,
            OperationTarget::Layer { layer: user.clone() }
        );
        assert_eq!(outcome.result.removed, vec!["user/base/desktop.yaml".to_string()]);
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: bash\n"));
        assert!(read(&store, &user, "desktop.yaml").is_none());
        assert_eq!(read(&store, &team, "system.yaml").as_deref(), Some("proxy: corp\n"));

        store.undo_last(false).unwrap();
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: zsh\n"));
        assert_eq!(read(&store, &user, "desktop.yaml").as_deref(), Some("theme: dark\n"));
    }

    #[test]
    fn test_version_scenario_with_compatibility_and_rollback() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "system.yaml", "shell: bash\n");

        // --- Execute ---
        let v1 = store.update_version(VersionUpdate::default()).unwrap();
        store
            .edit_document(user.clone(), DocumentKind::System, set("locale", json!("en_US")))
            .unwrap();
        assert!(store.has_drifted());
        store.update_version(VersionUpdate::default()).unwrap();
        let report = store.check_compatibility("v1").unwrap();
        let rollback = store.rollback_to("v1").unwrap();

        // --- Assert ---
        assert!(report.compatible);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: bash\n"));
        assert!(matches!(rollback.result.record.kind, VersionKind::Rollback { .. }));
        assert_eq!(rollback.operation.kind, OperationKind::Rollback);
        assert_eq!(rollback.operation.preceding_backup_id, rollback.pre_backup_id);
        assert!(!store.has_drifted());
        assert_eq!(
            store.delete_backup(&v1.backup_id).unwrap_err().kind(),
            ErrorKind::InUse
        );
    }

    #[test]
    fn test_retention_from_settings() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("envkeep.toml"), "[backups]\nmax_retained = 1\n").unwrap();
        let mut store = open(&dir);
        seed(&store, &Layer::base(Tier::User), "system.yaml", "shell: bash\n");

        let first = store.create_backup("one".into(), vec![], None).unwrap();
        let second = store.create_backup("two".into(), vec![], Some(true)).unwrap();

        let listed = store.backups().list(None, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.id);
        assert!(listed[0].compressed);
        assert!(!store.backups().dir().join(&first.id).exists());
    }

    #[test]
    fn test_status_reports_layers_and_version() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        seed(&store, &Layer::base(Tier::Default), "system.yaml", "shell: bash\n");
        store.update_version(VersionUpdate::default()).unwrap();

        let status = store.status().unwrap();

        assert_eq!(status.current_version.map(|v| v.version), Some("v1".into()));
        assert!(!status.drifted);
        assert_eq!(status.backup_count, 1);
        assert!(status.layers.iter().any(|l| l.layer == Layer::base(Tier::Default) && l.exists));
    }

    #[test]
    fn test_retention_keeps_backups_of_undoable_operations() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("envkeep.toml"), "[backups]\nmax_retained = 2\n").unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "applications.yaml", "editor: vim\n");

        // --- Execute ---
        let first = store
            .edit_document(user.clone(), DocumentKind::Applications, set("editor", json!("nano")))
            .unwrap();
        store
            .edit_document(user.clone(), DocumentKind::System, set("shell", json!("zsh")))
            .unwrap();
        store
            .edit_document(user.clone(), DocumentKind::Desktop, set("theme", json!("dark")))
            .unwrap();

        // --- Assert ---
        assert!(store.journal().get_operation_details(first.operation.id).unwrap().can_undo);
        assert!(store.backups().exists(&first.pre_backup_id));
        store.undo_operation(first.operation.id, false).unwrap();
        assert_eq!(
            read(&store, &user, "applications.yaml").as_deref(),
            Some("editor: vim\n")
        );
    }

    #[test]
    fn test_migration_pre_backup_survives_retention_and_undoes() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("envkeep.toml"), "[backups]\nmax_retained = 1\n").unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "system.yaml", "shell: bash\n");
        store.update_version(VersionUpdate::default()).unwrap();
        store
            .edit_document(user.clone(), DocumentKind::System, set("shell", json!("zsh")))
            .unwrap();

        // --- Execute ---
        let migration = store.migrate_to("v1", false).unwrap();

        // --- Assert ---
        assert!(store.backups().exists(&migration.pre_backup_id));
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: bash\n"));
        store.undo_last(false).unwrap();
        assert_eq!(store.resolve().merged_value()["system"], json!({"shell": "zsh"}));
    }

    #[cfg(unix)]
    #[test]
    fn test_incomplete_pre_backup_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        // --- Setup ---
        let dir = tempdir().unwrap();
        let mut store = open(&dir);
        let user = Layer::base(Tier::User);
        seed(&store, &user, "system.yaml", "shell: bash\n");
        let layer_dir = store.layout().layer_dir(&user);
        fs::write(layer_dir.join(OsStr::from_bytes(b"notes-\xff.yaml")), "x: 1\n").unwrap();

        // --- Execute ---
        let edit = store
            .edit_document(user.clone(), DocumentKind::System, set("shell", json!("zsh")))
            .unwrap();
        let undo = store.undo_last(false).unwrap();

        // --- Assert ---
        assert_eq!(edit.backup_warnings.len(), 1);
        assert!(edit.backup_warnings[0].contains("non UTF-8"));
        assert!(edit.result.warnings.is_empty());
        assert!(!undo.warnings.is_empty());
        assert!(undo.warnings.iter().all(|w| w.contains("non UTF-8")));
        assert!(undo.risks.is_empty());
        assert_eq!(read(&store, &user, "system.yaml").as_deref(), Some("shell: bash\n"));
    }
}
