// src/core/version_ledger.rs

use crate::core::backup_store::{BackupReferences, BackupStore, ReferenceSet, RestoreMode};
use crate::core::config_resolver::{ConfigResolver, ResolvedConfiguration};
use crate::core::error::{StoreError, StoreResult};
use crate::core::progress::ProgressObserver;
use crate::models::{
    BackupEntry, BackupOptions, CompatibilityReport, DocumentShape, OperationTarget,
    RestoreReport, VersionKind, VersionRecord,
};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref VERSION_NAME_RE: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+-]{0,63}$").expect("static regex is valid");
}

/// Collaborators needed by ledger operations that read or rewrite the tree.
#[derive(Debug)]
pub struct LedgerContext<'a> {
    pub resolver: &'a ConfigResolver,
    pub backups: &'a BackupStore,
    /// Other holders of backups retention must keep (the undo journal).
    pub journal: &'a dyn BackupReferences,
    /// Compression, retention and source context for backups taken here.
    pub backup_template: BackupOptions,
    pub author: String,
    pub progress: &'a dyn ProgressObserver,
}

impl LedgerContext<'_> {
    fn backup_options(&self, description: String, tags: Vec<String>) -> BackupOptions {
        BackupOptions {
            description,
            tags,
            ..self.backup_template.clone()
        }
    }

    fn references<'s>(
        &'s self,
        ledger: &'s VersionLedger,
        pinned: Option<&str>,
    ) -> ReferenceSet<'s> {
        let set = ReferenceSet::new().with(ledger).with(self.journal);
        match pinned {
            Some(id) => set.pin(id),
            None => set,
        }
    }
}

/// A request to record the live configuration as a new version.
#[derive(Debug, Clone, Default)]
pub struct VersionUpdate {
    /// Explicit version name; `v<N>` when absent.
    pub name: Option<String>,
    pub description: String,
    pub changes: Vec<String>,
}

/// The result of a migration or rollback.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// Snapshot of the tree taken before anything was rewritten.
    pub pre_backup: BackupEntry,
    /// The record appended after the transition.
    pub record: VersionRecord,
    /// What the restore wrote, removed and failed on.
    pub restore: RestoreReport,
    /// The compatibility report, for migrations.
    pub compatibility: Option<CompatibilityReport>,
    /// Files the pre-transition backup or the new version's snapshot could
    /// not capture.
    pub backup_warnings: Vec<String>,
}

/// Append-only, chronologically ordered record of named configuration states.
/// Each line of `versions.jsonl` holds one [`VersionRecord`].
#[derive(Debug, Clone)]
pub struct VersionLedger {
    path: PathBuf,
    records: Vec<VersionRecord>,
}

impl VersionLedger {
    /// Loads the ledger. A missing file is an empty ledger; unparseable lines
    /// are skipped with a warning.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let mut records = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<VersionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!(
                    "Skipping unreadable ledger line {} in '{}': {}",
                    number + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// The most recent record.
    pub fn current(&self) -> Option<&VersionRecord> {
        self.records.last()
    }

    /// Every record, newest first.
    pub fn list(&self) -> Vec<&VersionRecord> {
        self.records.iter().rev().collect()
    }

    pub fn find(&self, version: &str) -> StoreResult<&VersionRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.version == version)
            .ok_or_else(|| StoreError::VersionNotFound {
                version: version.to_string(),
            })
    }

    /// Whether the live configuration differs from the current record.
    pub fn has_drifted(&self, live_hash: &str) -> bool {
        self.current().is_some_and(|r| r.content_hash != live_hash)
    }

    /// The default name of the next record: `v<N>`, skipping taken names.
    pub fn next_default_name(&self) -> String {
        let mut n = self.records.len() + 1;
        loop {
            let candidate = format!("v{}", n);
            if !self.records.iter().any(|r| r.version == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn validate_new_name(&self, name: &str) -> StoreResult<()> {
        if !VERSION_NAME_RE.is_match(name) {
            return Err(StoreError::InvalidInput(format!(
                "Invalid version name '{}'. Use letters, digits, '.', '_', '+' or '-'.",
                name
            )));
        }
        if self.records.iter().any(|r| r.version == name) {
            return Err(StoreError::InvalidInput(format!(
                "Version '{}' already exists in the ledger.",
                name
            )));
        }
        Ok(())
    }

    /// Snapshots the live configuration as a new backup and appends a record.
    pub fn update(
        &mut self,
        request: VersionUpdate,
        ctx: &LedgerContext<'_>,
    ) -> StoreResult<VersionRecord> {
        let name = request.name.unwrap_or_else(|| self.next_default_name());
        let (record, _) = self.snapshot_and_append(
            name,
            request.description,
            request.changes,
            VersionKind::Snapshot,
            None,
            ctx,
        )?;
        Ok(record)
    }

    /// Compares the live configuration's shape with the shape recorded for
    /// `version`.
    ///
    /// Documents or keys recorded in the target but missing live are issues
    /// (each with a required action). Keys present live but absent from the
    /// target are warnings. A document whose type changed is an issue, and
    /// so is a target whose backup no longer exists.
    pub fn check_compatibility(
        &self,
        version: &str,
        live: &ResolvedConfiguration,
        backups: &BackupStore,
    ) -> StoreResult<CompatibilityReport> {
        let target = self.find(version)?;
        let live_shape = live.shape();
        let mut report = CompatibilityReport {
            version: target.version.clone(),
            ..CompatibilityReport::default()
        };

        if !backups.exists(&target.backup_id) {
            report.issues.push(format!(
                "Backup '{}' of version '{}' no longer exists.",
                target.backup_id, target.version
            ));
            report.required_actions.push(format!(
                "Record a new version; '{}' cannot be restored.",
                target.version
            ));
        }

        for (kind, recorded) in &target.shape {
            match (recorded, live_shape.get(kind)) {
                (_, None) => {
                    report.issues.push(format!(
                        "Document '{}' is recorded in '{}' but missing from the live configuration.",
                        kind, target.version
                    ));
                    report
                        .required_actions
                        .push(format!("Recreate the '{}' document before migrating.", kind));
                }
                (recorded, Some(live)) if recorded.type_name() != live.type_name() => {
                    report.issues.push(format!(
                        "Document '{}' changed type from {} to {}.",
                        kind,
                        recorded.type_name(),
                        live.type_name()
                    ));
                    report.required_actions.push(format!(
                        "Convert '{}' back to a {} before migrating.",
                        kind,
                        recorded.type_name()
                    ));
                }
                (DocumentShape::Mapping(recorded_keys), Some(DocumentShape::Mapping(live_keys))) => {
                    for key in recorded_keys.iter().filter(|k| !live_keys.contains(k)) {
                        report.issues.push(format!(
                            "Key '{}.{}' is recorded in '{}' but missing live.",
                            kind, key, target.version
                        ));
                        report
                            .required_actions
                            .push(format!("Re-add '{}.{}' before migrating.", kind, key));
                    }
                    for key in live_keys.iter().filter(|k| !recorded_keys.contains(k)) {
                        report.warnings.push(format!(
                            "Key '{}.{}' exists live but not in '{}'.",
                            kind, key, target.version
                        ));
                    }
                }
                _ => {}
            }
        }

        for kind in live_shape.keys().filter(|k| !target.shape.contains_key(k)) {
            report.warnings.push(format!(
                "Document '{}' exists live but not in '{}'.",
                kind, target.version
            ));
        }

        let malformed = live.errors().count();
        if malformed > 0 {
            report.warnings.push(format!(
                "{} live document(s) could not be parsed and were left out of the check.",
                malformed
            ));
        }

        report.compatible = report.issues.is_empty();
        Ok(report)
    }

    /// Applies the content recorded for `version` onto the live tiers and
    /// appends a Migration record.
    ///
    /// Files the target recorded are written; other live files are kept.
    /// Fails with [`StoreError::Incompatible`] before touching anything
    /// unless `force` is set.
    pub fn migrate_to(
        &mut self,
        version: &str,
        force: bool,
        ctx: &LedgerContext<'_>,
    ) -> StoreResult<TransitionOutcome> {
        let target = self.find(version)?.clone();
        let report = self.check_compatibility(version, &ctx.resolver.resolve_all(), ctx.backups)?;
        if !report.compatible && !force {
            return Err(StoreError::Incompatible {
                version: target.version,
                issue_count: report.issues.len(),
            });
        }
        if !ctx.backups.exists(&target.backup_id) {
            return Err(StoreError::BackupNotFound {
                id: target.backup_id,
            });
        }

        let pre_backup = ctx.backups.create(
            &ctx.backup_options(
                format!("Before migrating to '{}'", target.version),
                vec!["pre-migrate".to_string()],
            ),
            &ctx.references(&*self, None),
            ctx.progress,
        )?;
        let restore = ctx.backups.restore_scoped(
            &target.backup_id,
            &OperationTarget::Tree,
            RestoreMode::Overlay,
            ctx.progress,
        )?;

        let from = self.current().map(|r| r.version.clone());
        let mut changes = vec![format!("Applied the content of '{}'.", target.version)];
        if force && !report.compatible {
            changes.push(format!(
                "Forced past {} compatibility issue(s).",
                report.issues.len()
            ));
        }
        let name = self.next_default_name();
        let (record, snapshot) = self.snapshot_and_append(
            name,
            format!("Migrated to '{}'", target.version),
            changes,
            VersionKind::Migration {
                from,
                to: target.version.clone(),
            },
            Some(&pre_backup.id),
            ctx,
        )?;

        Ok(TransitionOutcome {
            backup_warnings: merge_warnings(&pre_backup, &snapshot),
            pre_backup,
            record,
            restore,
            compatibility: Some(report),
        })
    }

    /// Restores the backup of `version` exactly (extra files removed) and
    /// appends a Rollback record. Earlier records are never rewritten.
    pub fn rollback_to(
        &mut self,
        version: &str,
        ctx: &LedgerContext<'_>,
    ) -> StoreResult<TransitionOutcome> {
        let target = self.find(version)?.clone();
        if !ctx.backups.exists(&target.backup_id) {
            return Err(StoreError::BackupNotFound {
                id: target.backup_id,
            });
        }

        let pre_backup = ctx.backups.create(
            &ctx.backup_options(
                format!("Before rolling back to '{}'", target.version),
                vec!["pre-rollback".to_string()],
            ),
            &ctx.references(&*self, None),
            ctx.progress,
        )?;
        let restore = ctx.backups.restore_scoped(
            &target.backup_id,
            &OperationTarget::Tree,
            RestoreMode::Exact,
            ctx.progress,
        )?;

        let from = self.current().map(|r| r.version.clone());
        let name = self.next_default_name();
        let (record, snapshot) = self.snapshot_and_append(
            name,
            format!("Rolled back to '{}'", target.version),
            vec![format!("Restored backup '{}'.", target.backup_id)],
            VersionKind::Rollback {
                from,
                to: target.version.clone(),
            },
            Some(&pre_backup.id),
            ctx,
        )?;

        Ok(TransitionOutcome {
            backup_warnings: merge_warnings(&pre_backup, &snapshot),
            pre_backup,
            record,
            restore,
            compatibility: None,
        })
    }

    fn snapshot_and_append(
        &mut self,
        name: String,
        description: String,
        changes: Vec<String>,
        kind: VersionKind,
        pinned: Option<&str>,
        ctx: &LedgerContext<'_>,
    ) -> StoreResult<(VersionRecord, BackupEntry)> {
        self.validate_new_name(&name)?;

        let live = ctx.resolver.resolve_all();
        let backup = ctx.backups.create(
            &ctx.backup_options(description.clone(), vec![format!("version:{}", name)]),
            &ctx.references(&*self, pinned),
            ctx.progress,
        )?;

        let record = VersionRecord {
            sequence: self.records.last().map_or(1, |r| r.sequence + 1),
            version: name,
            timestamp: Utc::now(),
            description,
            author: ctx.author.clone(),
            content_hash: live.content_hash(),
            backup_id: backup.id.clone(),
            changes,
            kind,
            shape: live.shape(),
        };
        self.append(record.clone())?;
        log::info!(
            "Recorded version '{}' (backup '{}').",
            record.version,
            record.backup_id
        );
        Ok((record, backup))
    }

    /// Writes one record as a single line, then keeps it in memory.
    fn append(&mut self, record: VersionRecord) -> StoreResult<()> {
        let mut line = serde_json::to_string(&record).map_err(|e| StoreError::Serialize {
            what: format!("version record '{}'", record.version),
            source: e,
        })?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StoreError::io(&self.path, e))?;
        self.records.push(record);
        Ok(())
    }
}

impl BackupReferences for VersionLedger {
    fn referencing_versions(&self, backup_id: &str) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.backup_id == backup_id)
            .map(|r| r.version.clone())
            .collect()
    }
}

/// Warnings of both backups, the snapshot's repeats left out.
fn merge_warnings(pre_backup: &BackupEntry, snapshot: &BackupEntry) -> Vec<String> {
    let mut warnings = pre_backup.warnings.clone();
    for warning in &snapshot.warnings {
        if !warnings.contains(warning) {
            warnings.push(warning.clone());
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backup_store::NoReferences;
    use crate::core::error::ErrorKind;
    use crate::core::paths::StoreLayout;
    use crate::core::progress::SilentProgress;
    use crate::models::{Layer, Tier};
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _dir: TempDir,
        layout: StoreLayout,
        resolver: ConfigResolver,
        backups: BackupStore,
        ledger: VersionLedger,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let layout = StoreLayout::new(dir.path());
            let fixture = Self {
                resolver: ConfigResolver::new(layout.clone()),
                backups: BackupStore::new(&layout),
                ledger: VersionLedger::load(&layout.ledger_path()).unwrap(),
                layout,
                _dir: dir,
            };
            fixture.write("system.yaml", "proxy: none\nshell: bash\n");
            fixture
        }

        fn write(&self, file: &str, content: &str) {
            let dir = self.layout.layer_dir(&Layer::base(Tier::User));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(file), content).unwrap();
        }

        fn read(&self, file: &str) -> Option<String> {
            fs::read_to_string(self.layout.layer_dir(&Layer::base(Tier::User)).join(file)).ok()
        }

        fn update(&mut self, name: Option<&str>) -> StoreResult<VersionRecord> {
            let ctx = LedgerContext {
                resolver: &self.resolver,
                backups: &self.backups,
                journal: &NoReferences,
                backup_template: BackupOptions::default(),
                author: "tester".into(),
                progress: &SilentProgress,
            };
            self.ledger.update(
                VersionUpdate {
                    name: name.map(str::to_string),
                    description: "snapshot".into(),
                    changes: vec![],
                },
                &ctx,
            )
        }

        fn check(&self, version: &str) -> CompatibilityReport {
            self.ledger
                .check_compatibility(version, &self.resolver.resolve_all(), &self.backups)
                .unwrap()
        }

        fn migrate(&mut self, version: &str, force: bool) -> StoreResult<TransitionOutcome> {
            let ctx = LedgerContext {
                resolver: &self.resolver,
                backups: &self.backups,
                journal: &NoReferences,
                backup_template: BackupOptions::default(),
                author: "tester".into(),
                progress: &SilentProgress,
            };
            self.ledger.migrate_to(version, force, &ctx)
        }

        fn rollback(&mut self, version: &str) -> StoreResult<TransitionOutcome> {
            let ctx = LedgerContext {
                resolver: &self.resolver,
                backups: &self.backups,
                journal: &NoReferences,
                backup_template: BackupOptions::default(),
                author: "tester".into(),
                progress: &SilentProgress,
            };
            self.ledger.rollback_to(version, &ctx)
        }
    }

    #[test]
    fn test_update_assigns_default_and_explicit_names() {
        // --- Setup ---
        let mut fx = Fixture::new();

        // --- Execute ---
        let v1 = fx.update(None).unwrap();
        let named = fx.update(Some("release-1.0")).unwrap();
        let v3 = fx.update(None).unwrap();

        // --- Assert ---
        assert_eq!(v1.version, "v1");
        assert_eq!(v1.sequence, 1);
        assert_eq!(named.version, "release-1.0");
        assert_eq!(v3.version, "v3");
        assert_eq!(fx.ledger.current().unwrap().version, "v3");
        let listed: Vec<&str> = fx.ledger.list().iter().map(|r| r.version.as_str()).collect();
        assert_eq!(listed, vec!["v3", "release-1.0", "v1"]);
        assert!(fx.backups.exists(&v1.backup_id));
        assert_eq!(v1.author, "tester");
    }

    #[test]
    fn test_duplicate_and_invalid_names_are_rejected() {
        let mut fx = Fixture::new();
        fx.update(Some("stable")).unwrap();
        assert_eq!(
            fx.update(Some("stable")).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            fx.update(Some("../bad")).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(fx.ledger.list().len(), 1);
    }

    #[test]
    fn test_ledger_persists_and_skips_corrupt_lines() {
        let mut fx = Fixture::new();
        fx.update(None).unwrap();
        let path = fx.layout.ledger_path();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not a record").unwrap();
        fx.update(None).unwrap();

        let reloaded = VersionLedger::load(&path).unwrap();
        let names: Vec<&str> = reloaded.list().iter().map(|r| r.version.as_str()).collect();
        assert_eq!(names, vec!["v2", "v1"]);
    }

    #[test]
    fn test_drift_ignores_formatting_but_sees_content() {
        let mut fx = Fixture::new();
        fx.update(None).unwrap();
        fx.write("system.yaml", "shell:   bash\nproxy: none   \n");
        assert!(!fx.ledger.has_drifted(&fx.resolver.resolve_all().content_hash()));

        fx.write("system.yaml", "shell: zsh\nproxy: none\n");
        assert!(fx.ledger.has_drifted(&fx.resolver.resolve_all().content_hash()));
    }

    #[test]
    fn test_added_keys_are_warnings_only() {
        // --- Setup ---
        let mut fx = Fixture::new();
        fx.update(None).unwrap();
        fx.write("system.yaml", "proxy: none\nshell: bash\nlocale: en\n");
        fx.update(None).unwrap();

        // --- Execute ---
        let report = fx.check("v1");

        // --- Assert ---
        assert!(report.compatible);
        assert!(report.issues.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("system.locale"));
    }

    #[test]
    fn test_removed_keys_are_issues_with_actions() {
        let mut fx = Fixture::new();
        fx.update(None).unwrap();
        fx.write("system.yaml", "proxy: none\n");

        let report = fx.check("v1");

        assert!(!report.compatible);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("system.shell"));
        assert_eq!(report.required_actions.len(), 1);
    }

    #[test]
    fn test_type_change_and_missing_backup_are_issues() {
        let mut fx = Fixture::new();
        let v1 = fx.update(None).unwrap();
        fx.write("system.yaml", "- a\n- b\n");
        fs::remove_dir_all(fx.backups.dir().join(&v1.backup_id)).unwrap();

        let report = fx.check("v1");

        assert!(!report.compatible);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues.iter().any(|i| i.contains("changed type")));
        assert!(report.issues.iter().any(|i| i.contains("no longer exists")));
    }

    #[test]
    fn test_unknown_version_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .ledger
            .check_compatibility("v9", &fx.resolver.resolve_all(), &fx.backups)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_incompatible_migration_fails_fast_unless_forced() {
        // --- Setup ---
        let mut fx = Fixture::new();
        fx.update(None).unwrap();
        fx.write("system.yaml", "proxy: corp\n");
        fx.write("desktop.yaml", "wallpaper: blue\n");
        let backups_before = fx.backups.list(None, None).unwrap().len();

        // --- Execute & Assert: blocked ---
        let err = fx.migrate("v1", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incompatible);
        assert_eq!(fx.ledger.list().len(), 1);
        assert_eq!(fx.backups.list(None, None).unwrap().len(), backups_before);
        assert_eq!(fx.read("system.yaml").as_deref(), Some("proxy: corp\n"));

        // --- Execute & Assert: forced ---
        let outcome = fx.migrate("v1", true).unwrap();
        assert_eq!(
            fx.read("system.yaml").as_deref(),
            Some("proxy: none\nshell: bash\n")
        );
        // Overlay keeps files the target never recorded.
        assert_eq!(fx.read("desktop.yaml").as_deref(), Some("wallpaper: blue\n"));
        assert_eq!(
            outcome.record.kind,
            VersionKind::Migration {
                from: Some("v1".into()),
                to: "v1".into()
            }
        );
        assert_eq!(outcome.record.version, "v2");
        assert!(fx.backups.exists(&outcome.pre_backup.id));
    }

    #[test]
    fn test_rollback_restores_exactly_and_appends() {
        let mut fx = Fixture::new();
        fx.update(None).unwrap();
        fx.write("desktop.yaml", "wallpaper: blue\n");
        fx.write("system.yaml", "proxy: corp\n");
        fx.update(None).unwrap();

        let outcome = fx.rollback("v1").unwrap();

        assert!(fx.read("desktop.yaml").is_none());
        assert_eq!(
            fx.read("system.yaml").as_deref(),
            Some("proxy: none\nshell: bash\n")
        );
        assert_eq!(outcome.restore.removed, vec!["user/base/desktop.yaml".to_string()]);
        let names: Vec<&str> = fx.ledger.list().iter().map(|r| r.version.as_str()).collect();
        assert_eq!(names, vec!["v3", "v2", "v1"]);
        assert_eq!(
            fx.ledger.current().unwrap().kind,
            VersionKind::Rollback {
                from: Some("v2".into()),
                to: "v1".into()
            }
        );
        assert_eq!(
            fx.ledger.current().unwrap().content_hash,
            fx.ledger.find("v1").unwrap().content_hash
        );
    }

    #[test]
    fn test_referenced_backups_cannot_be_deleted() {
        let mut fx = Fixture::new();
        let v1 = fx.update(None).unwrap();
        fx.rollback("v1").unwrap();

        assert_eq!(fx.ledger.referencing_versions(&v1.backup_id), vec!["v1".to_string()]);
        let err = fx.backups.delete(&v1.backup_id, &fx.ledger).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InUse);
    }

    #[test]
    fn test_transition_keeps_its_pre_backup_under_tight_retention() {
        // --- Setup ---
        let mut fx = Fixture::new();
        fx.update(None).unwrap();
        fx.write("system.yaml", "proxy: corp\n");

        // --- Execute ---
        let ctx = LedgerContext {
            resolver: &fx.resolver,
            backups: &fx.backups,
            journal: &NoReferences,
            backup_template: BackupOptions {
                max_retained: Some(1),
                ..BackupOptions::default()
            },
            author: "tester".into(),
            progress: &SilentProgress,
        };
        let outcome = fx.ledger.rollback_to("v1", &ctx).unwrap();

        // --- Assert ---
        assert!(fx.backups.exists(&outcome.pre_backup.id));
        assert!(fx.backups.exists(&outcome.record.backup_id));
        assert!(outcome.backup_warnings.is_empty());
        let restored = fx
            .backups
            .restore_scoped(
                &outcome.pre_backup.id,
                &crate::models::OperationTarget::Tree,
                RestoreMode::Exact,
                &SilentProgress,
            )
            .unwrap();
        assert!(restored.warnings.is_empty());
        assert_eq!(fx.read("system.yaml").as_deref(), Some("proxy: corp\n"));
    }
}
