// src/core/backup_store.rs

use crate::constants::{
    BACKUP_FILES_DIR, BASE_SCOPE_DIR, COMPRESSED_EXTENSION, ENV_SCOPE_DIR, MANIFEST_FILENAME,
};
use crate::core::error::{StoreError, StoreResult};
use crate::core::hashing;
use crate::core::paths::{self, StoreLayout};
use crate::core::progress::ProgressObserver;
use crate::models::{
    BackupComparison, BackupEntry, BackupOptions, Layer, ManifestEntry, OperationTarget,
    RestoreReport, Scope, Tier,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Answers which records still point at a backup.
pub trait BackupReferences: fmt::Debug {
    /// Names of the versions referencing `backup_id`, empty if none.
    fn referencing_versions(&self, backup_id: &str) -> Vec<String>;

    /// Ids of undoable journal entries that would restore `backup_id`.
    fn undoable_operations(&self, _backup_id: &str) -> Vec<u64> {
        Vec::new()
    }

    /// Whether retention must keep `backup_id`.
    fn retains(&self, backup_id: &str) -> bool {
        !self.referencing_versions(backup_id).is_empty()
            || !self.undoable_operations(backup_id).is_empty()
    }
}

/// Several reference sources combined, plus backups pinned by the operation
/// in progress (a pre-backup not journaled yet).
#[derive(Debug, Default)]
pub struct ReferenceSet<'a> {
    sources: Vec<&'a dyn BackupReferences>,
    pinned: Vec<String>,
}

impl<'a> ReferenceSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &'a dyn BackupReferences) -> Self {
        self.sources.push(source);
        self
    }

    pub fn pin(mut self, backup_id: impl Into<String>) -> Self {
        self.pinned.push(backup_id.into());
        self
    }
}

impl BackupReferences for ReferenceSet<'_> {
    fn referencing_versions(&self, backup_id: &str) -> Vec<String> {
        self.sources
            .iter()
            .flat_map(|s| s.referencing_versions(backup_id))
            .collect()
    }

    fn undoable_operations(&self, backup_id: &str) -> Vec<u64> {
        self.sources
            .iter()
            .flat_map(|s| s.undoable_operations(backup_id))
            .collect()
    }

    fn retains(&self, backup_id: &str) -> bool {
        self.pinned.iter().any(|id| id == backup_id)
            || self.sources.iter().any(|s| s.retains(backup_id))
    }
}

/// A reference source with no versions at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReferences;

impl BackupReferences for NoReferences {
    fn referencing_versions(&self, _backup_id: &str) -> Vec<String> {
        Vec::new()
    }
}

/// How a restore treats live files the backup does not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Remove them, so the restored scope matches the manifest exactly.
    Exact,
    /// Keep them; only files recorded in the manifest are written.
    Overlay,
}

/// A file found in the live configuration tree.
#[derive(Debug)]
struct LiveFile {
    layer: Layer,
    file: String,
    path: PathBuf,
}

impl LiveFile {
    fn logical_path(&self) -> String {
        crate::models::logical_path(&self.layer, &self.file)
    }
}

/// Immutable snapshots of the configuration tree under `<root>/backups`.
#[derive(Debug, Clone)]
pub struct BackupStore {
    layout: StoreLayout,
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            dir: layout.backups_dir(),
            layout: layout.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Captures every tier and scope directory (all environments) into a new
    /// backup, then enforces retention.
    ///
    /// Files that cannot be read become manifest warnings. Any failure to
    /// write the backup itself aborts and leaves no partial backup behind.
    pub fn create(
        &self,
        options: &BackupOptions,
        references: &dyn BackupReferences,
        progress: &dyn ProgressObserver,
    ) -> StoreResult<BackupEntry> {
        let (live, mut warnings) = walk_live(&self.layout);

        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let id = self.next_id()?;
        let backup_dir = self.dir.join(&id);
        fs::create_dir(&backup_dir).map_err(|e| StoreError::io(&backup_dir, e))?;

        // Removes the half-written backup unless defused below.
        let guard = scopeguard::guard(backup_dir.clone(), |dir| {
            if let Err(e) = fs::remove_dir_all(&dir) {
                log::warn!("Failed to clean up partial backup '{}': {}", dir.display(), e);
            }
        });

        progress.start("Capturing configuration files", Some(live.len() as u64));
        let mut files = Vec::with_capacity(live.len());
        let mut size_bytes = 0u64;
        for (index, live_file) in live.iter().enumerate() {
            progress.update(index as u64 + 1, &live_file.logical_path());
            let content = match fs::read(&live_file.path) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("Skipping unreadable file '{}': {}", live_file.path.display(), e);
                    warnings.push(format!(
                        "Could not read '{}': {}",
                        live_file.path.display(),
                        e
                    ));
                    continue;
                }
            };
            let modified = fs::metadata(&live_file.path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);

            let stored_as = stored_path(&live_file.layer, &live_file.file, options.compress);
            let stored = if options.compress {
                lz4_flex::compress_prepend_size(&content)
            } else {
                content.clone()
            };
            let destination = backup_dir.join(&stored_as);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
            fs::write(&destination, &stored).map_err(|e| StoreError::io(&destination, e))?;

            size_bytes += stored.len() as u64;
            files.push(ManifestEntry {
                layer: live_file.layer.clone(),
                file: live_file.file.clone(),
                size: content.len() as u64,
                modified,
                hash: hashing::hash_bytes(&content),
                stored_as,
            });
        }
        progress.finish("Capturing configuration files");

        let entry = BackupEntry {
            id,
            created_at: Utc::now(),
            description: options.description.clone(),
            tags: options.tags.clone(),
            size_bytes,
            compressed: options.compress,
            files,
            source: options.source.clone(),
            warnings,
        };

        let manifest = serde_json::to_vec_pretty(&entry).map_err(|e| StoreError::Serialize {
            what: "backup manifest".to_string(),
            source: e,
        })?;
        let manifest_path = backup_dir.join(MANIFEST_FILENAME);
        paths::write_atomic(&manifest_path, &manifest)
            .map_err(|e| StoreError::io(&manifest_path, e))?;
        scopeguard::ScopeGuard::into_inner(guard);

        log::info!(
            "Created backup '{}' ({} files, {} bytes).",
            entry.id,
            entry.files.len(),
            entry.size_bytes
        );

        if let Some(max) = options.max_retained {
            let evicted = self.enforce_retention(max, &entry.id, references)?;
            if !evicted.is_empty() {
                log::info!("Retention evicted {} backup(s): {}", evicted.len(), evicted.join(", "));
            }
        }
        Ok(entry)
    }

    /// Backups matching `filter`, newest first.
    ///
    /// The filter matches an id substring, an exact tag, or a
    /// case-insensitive description substring.
    pub fn list(&self, filter: Option<&str>, limit: Option<usize>) -> StoreResult<Vec<BackupEntry>> {
        let mut ids = self.list_ids()?;
        ids.sort_by(|a, b| b.cmp(a));

        let needle = filter.map(|f| (f, f.to_lowercase()));
        let mut entries = Vec::new();
        for id in ids {
            if limit.is_some_and(|limit| entries.len() >= limit) {
                break;
            }
            let entry = match self.get(&id) {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Ignoring unreadable backup '{}': {}", id, e);
                    continue;
                }
            };
            let matched = match &needle {
                None => true,
                Some((raw, lower)) => {
                    entry.id.contains(*raw)
                        || entry.tags.iter().any(|t| t.as_str() == *raw)
                        || entry.description.to_lowercase().contains(lower.as_str())
                }
            };
            if matched {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Whether a complete backup with this id exists.
    pub fn exists(&self, id: &str) -> bool {
        self.backup_dir(id)
            .map(|dir| dir.join(MANIFEST_FILENAME).is_file())
            .unwrap_or(false)
    }

    /// Loads the manifest of backup `id`.
    pub fn get(&self, id: &str) -> StoreResult<BackupEntry> {
        let manifest_path = self.backup_dir(id)?.join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            return Err(StoreError::BackupNotFound { id: id.to_string() });
        }
        let content =
            fs::read_to_string(&manifest_path).map_err(|e| StoreError::io(&manifest_path, e))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Malformed {
            path: manifest_path,
            message: e.to_string(),
        })
    }

    /// Replays backup `id`.
    ///
    /// Onto the live tree (`target_override` = None) the restore is exact:
    /// live files absent from the manifest are removed. With an override the
    /// files are written under that root and the live tree is not touched.
    /// Per-file failures are collected in the report; the rest continue.
    pub fn restore(
        &self,
        id: &str,
        target_override: Option<&Path>,
        progress: &dyn ProgressObserver,
    ) -> StoreResult<RestoreReport> {
        let entry = self.get(id)?;
        match target_override {
            None => self.replay(
                &entry,
                &self.layout,
                &OperationTarget::Tree,
                RestoreMode::Exact,
                progress,
            ),
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
                let root = dunce::canonicalize(root).map_err(|e| StoreError::io(root, e))?;
                let layout = self.layout.rebased(root);
                self.replay(
                    &entry,
                    &layout,
                    &OperationTarget::Tree,
                    RestoreMode::Overlay,
                    progress,
                )
            }
        }
    }

    /// Replays only the files of backup `id` that fall under `target`.
    pub fn restore_scoped(
        &self,
        id: &str,
        target: &OperationTarget,
        mode: RestoreMode,
        progress: &dyn ProgressObserver,
    ) -> StoreResult<RestoreReport> {
        let entry = self.get(id)?;
        self.replay(&entry, &self.layout, target, mode, progress)
    }

    /// Deletes backup `id`.
    ///
    /// # Errors
    /// [`StoreError::InUse`] while any version record references it.
    pub fn delete(&self, id: &str, references: &dyn BackupReferences) -> StoreResult<()> {
        if !self.exists(id) {
            return Err(StoreError::BackupNotFound { id: id.to_string() });
        }
        let versions = references.referencing_versions(id);
        if !versions.is_empty() {
            return Err(StoreError::InUse {
                id: id.to_string(),
                versions: versions.join(", "),
            });
        }
        let dir = self.backup_dir(id)?;
        fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        log::info!("Deleted backup '{}'.", id);
        Ok(())
    }

    /// Manifest-level diff: `added` exist only in `second`, `removed` only in
    /// `first`, `modified` in both with different content.
    pub fn compare(&self, first: &str, second: &str) -> StoreResult<BackupComparison> {
        let a = manifest_hashes(&self.get(first)?);
        let b = manifest_hashes(&self.get(second)?);

        let mut comparison = BackupComparison::default();
        for (path, hash) in &b {
            match a.get(path) {
                None => comparison.added.push(path.clone()),
                Some(old) if old != hash => comparison.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        comparison.removed = a.keys().filter(|p| !b.contains_key(*p)).cloned().collect();
        Ok(comparison)
    }

    /// Re-reads every stored file of backup `id` and checks it against the
    /// manifest hash. Returns one message per damaged file.
    pub fn verify(&self, id: &str) -> StoreResult<Vec<String>> {
        let entry = self.get(id)?;
        let backup_dir = self.backup_dir(id)?;
        Ok(entry
            .files
            .iter()
            .filter_map(|file| {
                read_stored(&backup_dir, file)
                    .err()
                    .map(|message| format!("{}: {}", file.logical_path(), message))
            })
            .collect())
    }

    /// Deletes the oldest backups until at most `max` remain, skipping those
    /// a version or an undoable operation still needs. The backup `keep` is
    /// never evicted. Returns the evicted ids.
    pub fn enforce_retention(
        &self,
        max: usize,
        keep: &str,
        references: &dyn BackupReferences,
    ) -> StoreResult<Vec<String>> {
        let max = max.max(1);
        let mut ids = self.list_ids()?;
        ids.sort();

        let mut excess = ids.len().saturating_sub(max);
        let mut evicted = Vec::new();
        for id in ids {
            if excess == 0 {
                break;
            }
            if id == keep {
                continue;
            }
            if references.retains(&id) {
                log::debug!("Retention keeps '{}', still referenced.", id);
                continue;
            }
            let dir = self.dir.join(&id);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    evicted.push(id);
                    excess -= 1;
                }
                Err(e) => log::warn!("Failed to evict backup '{}': {}", id, e),
            }
        }
        if excess > 0 {
            log::warn!(
                "Backup count exceeds the retention limit of {} because {} backup(s) are still referenced.",
                max,
                excess
            );
        }
        Ok(evicted)
    }

    // --- Internals ---

    fn backup_dir(&self, id: &str) -> StoreResult<PathBuf> {
        if id.is_empty() || !is_safe_relative(id) || id.contains(['/', '\\']) {
            return Err(StoreError::BackupNotFound { id: id.to_string() });
        }
        Ok(self.dir.join(id))
    }

    fn list_ids(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };
        Ok(entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join(MANIFEST_FILENAME).is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect())
    }

    /// A fresh id that sorts after every existing one, even if the clock
    /// went backwards or two backups land in the same microsecond.
    fn next_id(&self) -> StoreResult<String> {
        let now = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let last = self.list_ids()?.into_iter().max();

        let base = match &last {
            Some(last) => {
                let last_stamp = last.split('-').next().unwrap_or(last.as_str());
                if last_stamp > now.as_str() {
                    last_stamp.to_string()
                } else {
                    now
                }
            }
            None => now,
        };

        let mut candidate = base.clone();
        let mut counter = 0u32;
        while last.as_deref().is_some_and(|l| candidate.as_str() <= l)
            || self.dir.join(&candidate).exists()
        {
            counter += 1;
            candidate = format!("{}-{:03}", base, counter);
        }
        Ok(candidate)
    }

    fn replay(
        &self,
        entry: &BackupEntry,
        layout: &StoreLayout,
        target: &OperationTarget,
        mode: RestoreMode,
        progress: &dyn ProgressObserver,
    ) -> StoreResult<RestoreReport> {
        let backup_dir = self.backup_dir(&entry.id)?;
        let mut report = RestoreReport {
            backup_id: entry.id.clone(),
            target_root: layout.root().to_path_buf(),
            ..RestoreReport::default()
        };

        let selected: Vec<&ManifestEntry> = entry
            .files
            .iter()
            .filter(|f| target.contains_file(&f.layer, &f.file))
            .collect();
        let mut expected = HashSet::new();

        progress.start("Restoring configuration files", Some(selected.len() as u64));
        for (index, file) in selected.iter().enumerate() {
            let logical = file.logical_path();
            progress.update(index as u64 + 1, &logical);
            expected.insert(logical.clone());

            if !is_safe_relative(&file.file) {
                report
                    .warnings
                    .push(format!("{}: refusing to restore an unsafe path", logical));
                continue;
            }
            let content = match read_stored(&backup_dir, file) {
                Ok(content) => content,
                Err(message) => {
                    report.warnings.push(format!("{}: {}", logical, message));
                    continue;
                }
            };

            let destination = layout.layer_dir(&file.layer).join(&file.file);
            let current_hash = fs::read(&destination).ok().map(|c| hashing::hash_bytes(&c));
            if current_hash.as_deref() == Some(file.hash.as_str()) {
                report.unchanged.push(logical);
                continue;
            }
            match paths::write_atomic(&destination, &content) {
                Ok(()) => report.written.push(logical),
                Err(e) => {
                    log::warn!("Failed to restore '{}': {}", destination.display(), e);
                    report
                        .warnings
                        .push(format!("{}: could not write '{}': {}", logical, destination.display(), e));
                }
            }
        }

        if mode == RestoreMode::Exact {
            let (live, walk_warnings) = walk_live(layout);
            report.warnings.extend(walk_warnings);
            for live_file in live {
                let logical = live_file.logical_path();
                if !target.contains_file(&live_file.layer, &live_file.file)
                    || expected.contains(&logical)
                {
                    continue;
                }
                match fs::remove_file(&live_file.path) {
                    Ok(()) => report.removed.push(logical),
                    Err(e) => report.warnings.push(format!(
                        "{}: could not remove '{}': {}",
                        logical,
                        live_file.path.display(),
                        e
                    )),
                }
            }
        }
        progress.finish("Restoring configuration files");

        log::info!(
            "Restored backup '{}' into '{}': {} written, {} unchanged, {} removed, {} warning(s).",
            entry.id,
            report.target_root.display(),
            report.written.len(),
            report.unchanged.len(),
            report.removed.len(),
            report.warnings.len()
        );
        Ok(report)
    }
}

/// Reads a stored file back, decompressing if needed, and checks its hash.
fn read_stored(backup_dir: &Path, file: &ManifestEntry) -> Result<Vec<u8>, String> {
    if !is_safe_relative(&file.stored_as) {
        return Err("stored path escapes the backup directory".to_string());
    }
    let path = backup_dir.join(&file.stored_as);
    let raw = fs::read(&path).map_err(|e| format!("could not read stored copy: {}", e))?;
    let content = if file.stored_as.ends_with(&format!(".{}", COMPRESSED_EXTENSION)) {
        lz4_flex::decompress_size_prepended(&raw)
            .map_err(|e| format!("could not decompress stored copy: {}", e))?
    } else {
        raw
    };
    if hashing::hash_bytes(&content) != file.hash {
        return Err("stored copy does not match the manifest hash".to_string());
    }
    Ok(content)
}

/// `files/<tier>/<scope>/<file>[.lz4]`, relative to the backup directory.
fn stored_path(layer: &Layer, file: &str, compress: bool) -> String {
    let scope = match &layer.scope {
        Scope::Base => BASE_SCOPE_DIR.to_string(),
        Scope::Env(name) => format!("{}/{}", ENV_SCOPE_DIR, name),
    };
    let mut path = format!("{}/{}/{}/{}", BACKUP_FILES_DIR, layer.tier, scope, file);
    if compress {
        path.push('.');
        path.push_str(COMPRESSED_EXTENSION);
    }
    path
}

fn manifest_hashes(entry: &BackupEntry) -> BTreeMap<String, String> {
    entry
        .files
        .iter()
        .map(|f| (f.logical_path(), f.hash.clone()))
        .collect()
}

fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Every file under every tier's `base/` and `env/<name>/` directories.
/// Anything else inside a tier directory is not part of a layer and is ignored.
fn walk_live(layout: &StoreLayout) -> (Vec<LiveFile>, Vec<String>) {
    let mut files = Vec::new();
    let mut warnings = Vec::new();

    for tier in Tier::ALL {
        let tier_dir = layout.tier_dir(tier);
        if !tier_dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(tier_dir).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(format!("Could not scan '{}': {}", tier_dir.display(), e));
                    continue;
                }
            };
            if !entry.path().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(tier_dir) else {
                continue;
            };
            let parts: Option<Vec<&str>> = relative
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect();
            let Some(parts) = parts else {
                warnings.push(format!("Skipped non UTF-8 path '{}'.", entry.path().display()));
                continue;
            };

            let (layer, rest) = match parts.as_slice() {
                [scope, rest @ ..] if *scope == BASE_SCOPE_DIR && !rest.is_empty() => {
                    (Layer::base(tier), rest)
                }
                [scope, name, rest @ ..] if *scope == ENV_SCOPE_DIR && !rest.is_empty() => {
                    (Layer::env(tier, *name), rest)
                }
                _ => {
                    log::debug!("Ignoring '{}': not inside a layer.", entry.path().display());
                    continue;
                }
            };
            files.push(LiveFile {
                layer,
                file: rest.join("/"),
                path: entry.path().to_path_buf(),
            });
        }
    }
    (files, warnings)
}
