// src/core/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`StoreError`], surfaced to the CLI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No such backup, version or operation.
    NotFound,
    /// A backup is still referenced by a version record.
    InUse,
    /// A migration was blocked by the compatibility check.
    Incompatible,
    /// Another invocation holds the store lock.
    Busy,
    /// A document or store file could not be parsed.
    Malformed,
    /// The operation completed but some files or steps failed.
    PartialFailure,
    /// A journal entry can no longer be undone safely.
    NotUndoable,
    /// The caller supplied a value the store cannot act on.
    InvalidInput,
    /// Disk or permission errors that prevent any safe progress.
    Fatal,
}

/// Errors produced by the configuration store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A filesystem error that stopped the operation.
    #[error("Filesystem error at '{path}': {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A backup id that does not exist.
    #[error("Backup '{id}' not found.")]
    BackupNotFound {
        /// The requested id.
        id: String,
    },
    /// A version name that does not exist in the ledger.
    #[error("Version '{version}' not found in the ledger.")]
    VersionNotFound {
        /// The requested version name.
        version: String,
    },
    /// A journal operation id that does not exist.
    #[error("Operation #{id} not found in the undo journal.")]
    OperationNotFound {
        /// The requested operation id.
        id: u64,
    },
    /// The journal has no entries at all.
    #[error("There are no recorded operations to undo.")]
    JournalEmpty,
    /// A backup cannot be deleted while a version references it.
    #[error("Backup '{id}' is referenced by version(s) {versions} and cannot be deleted.")]
    InUse {
        /// The backup id.
        id: String,
        /// Comma-separated names of the referencing versions.
        versions: String,
    },
    /// The compatibility check blocked a migration.
    #[error("Migration to '{version}' is blocked by {issue_count} compatibility issue(s). Use --force to override.")]
    Incompatible {
        /// The target version.
        version: String,
        /// Number of blocking issues.
        issue_count: usize,
    },
    /// The store lock is already held.
    #[error(
        "Another envkeep process is modifying the store (lock held at '{path}'{holder}). \
         Remove '{path}' if no envkeep process is running."
    )]
    Busy {
        /// Path of the lock file.
        path: PathBuf,
        /// Description of the holder, if known (e.g. ", pid 4242").
        holder: String,
    },
    /// A document, manifest or log line could not be parsed.
    #[error("Malformed content in '{path}': {message}")]
    Malformed {
        /// The offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// The operation finished but left warnings behind.
    #[error("{operation} completed with {} warning(s).", .warnings.len())]
    PartialFailure {
        /// What was being done.
        operation: String,
        /// The accumulated warnings.
        warnings: Vec<String>,
    },
    /// A stale journal entry was asked to be undone without force.
    #[error("Operation #{id} cannot be undone: {reason}. Use --force to override.")]
    NotUndoable {
        /// The operation id.
        id: u64,
        /// Why it is no longer undoable.
        reason: String,
    },
    /// Invalid user input.
    #[error("{0}")]
    InvalidInput(String),
    /// A mutation failed after its pre-operation backup was taken. Nothing
    /// was journaled.
    #[error("{operation} failed; the previous state is preserved in backup '{backup_id}': {source}")]
    Aborted {
        /// What was being done.
        operation: String,
        /// The pre-operation backup.
        backup_id: String,
        /// The failure.
        #[source]
        source: Box<StoreError>,
    },
    /// Serialization of a store record failed.
    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        /// What was being serialized.
        what: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Builds an [`StoreError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classifies the error into the store's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackupNotFound { .. }
            | Self::VersionNotFound { .. }
            | Self::OperationNotFound { .. }
            | Self::JournalEmpty => ErrorKind::NotFound,
            Self::InUse { .. } => ErrorKind::InUse,
            Self::Incompatible { .. } => ErrorKind::Incompatible,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::NotUndoable { .. } => ErrorKind::NotUndoable,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Aborted { source, .. } => source.kind(),
            Self::Io { .. } | Self::Serialize { .. } => ErrorKind::Fatal,
        }
    }

    /// The process exit code the CLI uses for this error.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Fatal => 1,
            ErrorKind::NotFound => 2,
            ErrorKind::InUse => 3,
            ErrorKind::Incompatible => 4,
            ErrorKind::Busy => 5,
            ErrorKind::Malformed => 6,
            ErrorKind::PartialFailure => 7,
            ErrorKind::NotUndoable => 8,
            ErrorKind::InvalidInput => 64,
        }
    }
}

/// Result alias used throughout the core.
pub type StoreResult<T> = Result<T, StoreError>;
