// src/core/undo_journal.rs

use crate::core::backup_store::{BackupReferences, BackupStore, ReferenceSet, RestoreMode};
use crate::core::error::{StoreError, StoreResult};
use crate::core::progress::ProgressObserver;
use crate::models::{
    BackupOptions, OperationKind, OperationTarget, Tier, UndoResult, UndoSummary,
    UndoableOperation,
};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// An operation whose id is allocated but whose journal line is not written
/// yet. Produced by [`UndoJournal::reserve`], consumed by [`UndoJournal::commit`]
/// once the mutation has been attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    id: u64,
    kind: OperationKind,
    target: OperationTarget,
    description: String,
    preceding_backup_id: String,
    undo_risks: Vec<String>,
    undoes: Option<u64>,
}

impl PendingOperation {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn preceding_backup_id(&self) -> &str {
        &self.preceding_backup_id
    }

    pub fn undo_risks(&self) -> &[String] {
        &self.undo_risks
    }

    fn undoing(mut self, id: u64) -> Self {
        self.undoes = Some(id);
        self
    }
}

/// Collaborators needed to reverse an operation.
#[derive(Debug)]
pub struct UndoContext<'a> {
    pub backups: &'a BackupStore,
    pub references: &'a dyn BackupReferences,
    /// Compression, retention and source context for the safety backup.
    pub backup_template: BackupOptions,
    pub progress: &'a dyn ProgressObserver,
}

/// Append-only log of mutating operations (`journal.jsonl`).
///
/// Whether an entry can still be undone is never stored: it is derived by
/// replaying the log, an entry going stale as soon as a later entry touches
/// an overlapping target.
#[derive(Debug, Clone)]
pub struct UndoJournal {
    path: PathBuf,
    entries: Vec<UndoableOperation>,
}

impl UndoJournal {
    /// Loads the journal. A missing file is an empty journal; unparseable
    /// lines are skipped with a warning.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let mut entries = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UndoableOperation>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!(
                    "Skipping unreadable journal line {} in '{}': {}",
                    number + 1,
                    path.display(),
                    e
                ),
            }
        }

        let mut journal = Self {
            path: path.to_path_buf(),
            entries,
        };
        journal.derive_undoability();
        Ok(journal)
    }

    fn derive_undoability(&mut self) {
        let targets: Vec<OperationTarget> = self.entries.iter().map(|e| e.target.clone()).collect();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.can_undo = !targets
                .iter()
                .skip(index + 1)
                .any(|later| later.overlaps(&entry.target));
        }
    }

    fn next_id(&self) -> u64 {
        self.entries.iter().map(|e| e.id).max().map_or(1, |id| id + 1)
    }

    /// Allocates the next id for an operation about to mutate `target`.
    /// `preceding_backup_id` must already hold the pre-operation state.
    pub fn reserve(
        &self,
        kind: OperationKind,
        target: OperationTarget,
        description: impl Into<String>,
        preceding_backup_id: impl Into<String>,
    ) -> PendingOperation {
        PendingOperation {
            id: self.next_id(),
            undo_risks: assess_risks(kind, &target),
            kind,
            target,
            description: description.into(),
            preceding_backup_id: preceding_backup_id.into(),
            undoes: None,
        }
    }

    /// Appends the reserved operation as one line and marks earlier entries
    /// with overlapping targets as no longer undoable.
    pub fn commit(&mut self, pending: PendingOperation) -> StoreResult<UndoableOperation> {
        let entry = UndoableOperation {
            id: pending.id,
            kind: pending.kind,
            description: pending.description,
            target: pending.target,
            timestamp: Utc::now(),
            can_undo: true,
            undo_risks: pending.undo_risks,
            preceding_backup_id: pending.preceding_backup_id,
            undoes: pending.undoes,
        };

        let mut line = serde_json::to_string(&entry).map_err(|e| StoreError::Serialize {
            what: format!("journal entry #{}", entry.id),
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

        for earlier in self.entries.iter_mut() {
            if earlier.can_undo && earlier.target.overlaps(&entry.target) {
                log::debug!("Operation #{} superseded by #{}.", earlier.id, entry.id);
                earlier.can_undo = false;
            }
        }
        self.entries.push(entry.clone());
        log::debug!("Journaled operation #{} ({}).", entry.id, entry.kind);
        Ok(entry)
    }

    /// Every entry, newest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<&UndoableOperation> {
        self.entries
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Entries that can still be undone, newest first.
    pub fn get_undoable_operations(&self, limit: usize) -> Vec<&UndoableOperation> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.can_undo)
            .take(limit)
            .collect()
    }

    pub fn get_operation_details(&self, id: u64) -> StoreResult<&UndoableOperation> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(StoreError::OperationNotFound { id })
    }

    pub fn get_undo_summary(&self) -> UndoSummary {
        let undoable: Vec<&UndoableOperation> = self.entries.iter().filter(|e| e.can_undo).collect();
        UndoSummary {
            total_operations: self.entries.len(),
            undoable_operations: undoable.len(),
            last_operation: self.entries.last().cloned(),
            oldest_undoable: undoable.first().map(|e| e.timestamp),
        }
    }

    /// True iff any entry can be undone.
    pub fn can_undo(&self) -> bool {
        self.entries.iter().any(|e| e.can_undo)
    }

    /// Why `entry` is no longer undoable, naming the first later operation
    /// that touched an overlapping target.
    pub fn staleness_reason(&self, entry: &UndoableOperation) -> String {
        self.entries
            .iter()
            .filter(|later| later.id > entry.id && later.target.overlaps(&entry.target))
            .map(|later| {
                format!(
                    "'{}' was changed again by operation #{} ({})",
                    entry.target, later.id, later.kind
                )
            })
            .next()
            .unwrap_or_else(|| "a later operation changed the same target".to_string())
    }

    /// Reverses the most recent operation.
    pub fn undo_last(&mut self, force: bool, ctx: &UndoContext<'_>) -> StoreResult<UndoResult> {
        let last = self.entries.last().ok_or(StoreError::JournalEmpty)?.id;
        self.undo_operation(last, force, ctx)
    }

    /// Reverses operation `id`.
    ///
    /// A stale operation is refused with [`StoreError::NotUndoable`] unless
    /// `force` is set. The pre-undo state is always captured in a safety
    /// backup first, then the operation's preceding backup is restored for
    /// its target only. The undo is journaled with the safety backup as its
    /// preceding backup, so it can be undone in turn.
    pub fn undo_operation(
        &mut self,
        id: u64,
        force: bool,
        ctx: &UndoContext<'_>,
    ) -> StoreResult<UndoResult> {
        let operation = self.get_operation_details(id)?.clone();
        let mut risks = Vec::new();

        if !operation.can_undo {
            let reason = self.staleness_reason(&operation);
            if !force {
                return Err(StoreError::NotUndoable { id, reason });
            }
            risks.push(format!("Forced undo of #{}: {}.", id, reason));
        }
        if !ctx.backups.exists(&operation.preceding_backup_id) {
            return Err(StoreError::BackupNotFound {
                id: operation.preceding_backup_id,
            });
        }
        risks.extend(operation.undo_risks.iter().cloned());

        // Retention runs after the restore so it cannot evict the backup
        // being restored.
        let safety = ctx.backups.create(
            &BackupOptions {
                description: format!("Safety backup before undoing #{}", id),
                tags: vec!["pre-undo".to_string()],
                max_retained: None,
                ..ctx.backup_template.clone()
            },
            ctx.references,
            ctx.progress,
        )?;
        let mut warnings = safety.warnings.clone();
        let pending = self
            .reserve(
                OperationKind::Undo,
                operation.target.clone(),
                format!("Undo #{}: {}", id, operation.description),
                safety.id.clone(),
            )
            .undoing(id);

        let restore = ctx.backups.restore_scoped(
            &operation.preceding_backup_id,
            &operation.target,
            RestoreMode::Exact,
            ctx.progress,
        )?;
        warnings.extend(restore.warnings.iter().cloned());
        let entry = self.commit(pending)?;

        if let Some(max) = ctx.backup_template.max_retained {
            let references = ReferenceSet::new().with(ctx.references).with(&*self);
            ctx.backups.enforce_retention(max, &safety.id, &references)?;
        }

        Ok(UndoResult {
            message: format!(
                "Undid #{} ({} on {}): {} file(s) restored, {} removed.",
                id,
                operation.kind,
                operation.target,
                restore.written.len(),
                restore.removed.len()
            ),
            restored_from: operation.preceding_backup_id,
            new_backup_id: safety.id,
            risks,
            warnings,
            undo_operation_id: entry.id,
        })
    }
}

impl BackupReferences for UndoJournal {
    fn referencing_versions(&self, _backup_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn undoable_operations(&self, backup_id: &str) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|e| e.can_undo && e.preceding_backup_id == backup_id)
            .map(|e| e.id)
            .collect()
    }
}

/// Risks recorded with an operation and surfaced again when it is undone.
fn assess_risks(kind: OperationKind, target: &OperationTarget) -> Vec<String> {
    let mut risks = Vec::new();
    match target.tier() {
        None => risks.push(
            "Undoing this operation rewrites every tier and environment.".to_string(),
        ),
        Some(tier @ (Tier::Default | Tier::Team)) => risks.push(format!(
            "Undoing this operation rewrites the shared '{}' tier.",
            tier
        )),
        Some(Tier::User) => {}
    }
    match kind {
        OperationKind::Migrate | OperationKind::Rollback => risks.push(
            "The version record created by this operation stays in the ledger.".to_string(),
        ),
        OperationKind::Undo => {
            risks.push("Undoing an undo re-applies the changes it reverted.".to_string());
        }
        OperationKind::Edit | OperationKind::Import | OperationKind::Restore => {}
    }
    risks
}
