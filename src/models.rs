// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// --- TIERS, SCOPES AND LAYERS ---

/// A configuration tier. Later tiers take precedence over earlier ones.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Shipped defaults, shared by everyone.
    Default,
    /// Team-wide overrides, usually a shared directory.
    Team,
    /// The user's own overrides.
    User,
}

impl Tier {
    /// All tiers in precedence order (lowest first).
    pub const ALL: [Tier; 3] = [Tier::Default, Tier::Team, Tier::User];

    /// The directory and display name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Default => "default",
            Tier::Team => "team",
            Tier::User => "user",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The scope of a layer within its tier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The tier's base directory.
    Base,
    /// A named environment overlay (e.g. "dev", "prod").
    Env(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Base => f.write_str("base"),
            Scope::Env(name) => write!(f, "env:{}", name),
        }
    }
}

/// A tier/scope pair. Every layer maps to exactly one directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Layer {
    /// The tier of the layer.
    pub tier: Tier,
    /// Base or a named environment.
    pub scope: Scope,
}

impl Layer {
    /// The base layer of `tier`.
    pub fn base(tier: Tier) -> Self {
        Self {
            tier,
            scope: Scope::Base,
        }
    }

    /// The environment overlay `name` of `tier`.
    pub fn env(tier: Tier, name: impl Into<String>) -> Self {
        Self {
            tier,
            scope: Scope::Env(name.into()),
        }
    }

    /// Builds a layer from an optional environment name (None means base).
    pub fn from_parts(tier: Tier, environment: Option<&str>) -> Self {
        match environment {
            Some(name) => Self::env(tier, name),
            None => Self::base(tier),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tier, self.scope)
    }
}

/// The four configuration documents a layer can hold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Applications to install and their settings.
    Applications,
    /// Environment variables and shell settings.
    Environment,
    /// System-level preferences.
    System,
    /// Desktop preferences. Optional in every tier.
    Desktop,
}

impl DocumentKind {
    /// All document kinds.
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Applications,
        DocumentKind::Environment,
        DocumentKind::System,
        DocumentKind::Desktop,
    ];

    /// The file stem used on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Applications => "applications",
            DocumentKind::Environment => "environment",
            DocumentKind::System => "system",
            DocumentKind::Desktop => "desktop",
        }
    }

    /// Whether the document may be absent from the Default/Team base layers
    /// without being reported.
    pub fn is_optional(&self) -> bool {
        matches!(self, DocumentKind::Desktop)
    }

    /// Maps a file stem back to its kind.
    pub fn from_stem(stem: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == stem)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- BACKUPS ---

/// A single captured file inside a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// The layer the file belongs to.
    pub layer: Layer,
    /// Path of the file relative to the layer directory, `/`-separated.
    pub file: String,
    /// Original (uncompressed) size in bytes.
    pub size: u64,
    /// Modification time at capture, when the platform reports one.
    pub modified: Option<DateTime<Utc>>,
    /// blake3 hash of the original content, hex encoded.
    pub hash: String,
    /// Location of the stored copy, relative to the backup directory.
    pub stored_as: String,
}

impl ManifestEntry {
    /// The stable, layout-independent key of the file (e.g. `team/base/system.yaml`).
    pub fn logical_path(&self) -> String {
        logical_path(&self.layer, &self.file)
    }
}

/// Builds the logical key of `file` inside `layer`.
pub fn logical_path(layer: &Layer, file: &str) -> String {
    match &layer.scope {
        Scope::Base => format!("{}/base/{}", layer.tier, file),
        Scope::Env(name) => format!("{}/env/{}/{}", layer.tier, name, file),
    }
}

/// Where and why a backup was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceContext {
    /// The command that triggered the backup (e.g. `edit`, `backup create`).
    pub command: String,
    /// The environment that was active.
    pub environment: Option<String>,
    /// The configuration root.
    pub root: PathBuf,
    /// Version of the tool that wrote the backup.
    pub tool_version: String,
}

/// An immutable snapshot of the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Timestamp-derived id; sorts lexicographically with creation time.
    pub id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Free-form description.
    pub description: String,
    /// User or system tags (e.g. `stable`, `pre-edit`).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Total bytes stored on disk for this backup's files.
    pub size_bytes: u64,
    /// Whether file contents are lz4-compressed.
    pub compressed: bool,
    /// The captured files.
    pub files: Vec<ManifestEntry>,
    /// Capture context.
    pub source: SourceContext,
    /// Files that could not be captured.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Parameters for [`crate::core::backup_store::BackupStore::create`].
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Description stored in the manifest.
    pub description: String,
    /// Tags stored in the manifest.
    pub tags: Vec<String>,
    /// Compress stored files with lz4.
    pub compress: bool,
    /// Retention limit enforced after the backup is written.
    pub max_retained: Option<usize>,
    /// Capture context.
    pub source: SourceContext,
}

/// A manifest-level diff between two backups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupComparison {
    /// Logical paths present only in the second backup.
    pub added: Vec<String>,
    /// Logical paths present only in the first backup.
    pub removed: Vec<String>,
    /// Logical paths present in both with different content.
    pub modified: Vec<String>,
}

impl BackupComparison {
    /// True when both manifests describe the same file set and contents.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// The outcome of replaying a backup onto disk.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// The backup that was replayed.
    pub backup_id: String,
    /// The root the files were written under.
    pub target_root: PathBuf,
    /// Logical paths rewritten from the backup.
    pub written: Vec<String>,
    /// Logical paths already identical to the backup.
    pub unchanged: Vec<String>,
    /// Logical paths removed because the backup did not contain them.
    pub removed: Vec<String>,
    /// Per-file failures. A non-empty list means the restore was partial.
    pub warnings: Vec<String>,
}

// --- VERSIONS ---

/// How a version record came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum VersionKind {
    /// Explicitly recorded by the user.
    Snapshot,
    /// Recorded after migrating to another version's content.
    Migration {
        /// The version that was current before the migration.
        from: Option<String>,
        /// The version whose content was applied.
        to: String,
    },
    /// Recorded after restoring another version's backup.
    Rollback {
        /// The version that was current before the rollback.
        from: Option<String>,
        /// The version that was restored.
        to: String,
    },
}

/// The structural shape of one resolved document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "keys")]
pub enum DocumentShape {
    /// A mapping with the given top-level keys (sorted).
    Mapping(Vec<String>),
    /// A list; lists are replaced wholesale so only the type is tracked.
    List,
    /// A scalar value.
    Scalar,
}

impl DocumentShape {
    /// Short name of the shape type.
    pub fn type_name(&self) -> &'static str {
        match self {
            DocumentShape::Mapping(_) => "mapping",
            DocumentShape::List => "list",
            DocumentShape::Scalar => "scalar",
        }
    }
}

/// Per-document shape of a fully resolved configuration.
pub type ConfigurationShape = BTreeMap<DocumentKind, DocumentShape>;

/// A named configuration state in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Position in the ledger, starting at 1.
    pub sequence: u64,
    /// Unique version name.
    pub version: String,
    /// When the record was appended.
    pub timestamp: DateTime<Utc>,
    /// Free-form description.
    pub description: String,
    /// Who recorded it.
    pub author: String,
    /// blake3 hash of the normalized merged configuration.
    pub content_hash: String,
    /// Backup holding the configuration tree of this version.
    pub backup_id: String,
    /// Human-readable change notes.
    #[serde(default)]
    pub changes: Vec<String>,
    /// How the record came to be.
    pub kind: VersionKind,
    /// Recorded structural shape used by compatibility checks.
    #[serde(default)]
    pub shape: ConfigurationShape,
}

/// Result of comparing the live configuration against a recorded version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompatibilityReport {
    /// The version that was checked.
    pub version: String,
    /// True when no issue blocks migration.
    pub compatible: bool,
    /// Blocking problems.
    pub issues: Vec<String>,
    /// Non-blocking differences.
    pub warnings: Vec<String>,
    /// Manual steps to perform before migrating safely.
    pub required_actions: Vec<String>,
}

// --- UNDO JOURNAL ---

/// The kind of mutating command recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A key was set or removed in a document.
    Edit,
    /// A document file was imported into a layer.
    Import,
    /// Another version's content was applied.
    Migrate,
    /// Another version's backup was restored.
    Rollback,
    /// A backup was restored onto the live tree.
    Restore,
    /// A previous operation was undone.
    Undo,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Edit => "edit",
            OperationKind::Import => "import",
            OperationKind::Migrate => "migrate",
            OperationKind::Rollback => "rollback",
            OperationKind::Restore => "restore",
            OperationKind::Undo => "undo",
        };
        f.write_str(name)
    }
}

/// What part of the configuration tree an operation touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum OperationTarget {
    /// One document of one layer.
    Document {
        /// The layer.
        layer: Layer,
        /// The document.
        document: DocumentKind,
    },
    /// Every file of one layer.
    Layer {
        /// The layer.
        layer: Layer,
    },
    /// The whole configuration tree.
    Tree,
}

impl OperationTarget {
    /// Whether `other` touches any file this target touches.
    pub fn overlaps(&self, other: &OperationTarget) -> bool {
        match (self, other) {
            (OperationTarget::Tree, _) | (_, OperationTarget::Tree) => true,
            (OperationTarget::Layer { layer: a }, OperationTarget::Layer { layer: b }) => a == b,
            (OperationTarget::Layer { layer: a }, OperationTarget::Document { layer: b, .. })
            | (OperationTarget::Document { layer: b, .. }, OperationTarget::Layer { layer: a }) => {
                a == b
            }
            (
                OperationTarget::Document {
                    layer: a,
                    document: da,
                },
                OperationTarget::Document {
                    layer: b,
                    document: db,
                },
            ) => a == b && da == db,
        }
    }

    /// Whether the file `file` of `layer` falls under this target.
    pub fn contains_file(&self, layer: &Layer, file: &str) -> bool {
        match self {
            OperationTarget::Tree => true,
            OperationTarget::Layer { layer: l } => l == layer,
            OperationTarget::Document { layer: l, document } => {
                l == layer
                    && file
                        .rsplit_once('.')
                        .and_then(|(stem, _)| DocumentKind::from_stem(stem))
                        == Some(*document)
            }
        }
    }

    /// The tier this target is confined to, if any.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            OperationTarget::Document { layer, .. } | OperationTarget::Layer { layer } => {
                Some(layer.tier)
            }
            OperationTarget::Tree => None,
        }
    }
}

impl fmt::Display for OperationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationTarget::Document { layer, document } => write!(f, "{}/{}", layer, document),
            OperationTarget::Layer { layer } => write!(f, "{}", layer),
            OperationTarget::Tree => f.write_str("*"),
        }
    }
}

/// A journal entry describing one mutating command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoableOperation {
    /// Monotonically increasing id.
    pub id: u64,
    /// The command kind.
    pub kind: OperationKind,
    /// Human-readable description.
    pub description: String,
    /// What the command touched.
    pub target: OperationTarget,
    /// When the entry was committed.
    pub timestamp: DateTime<Utc>,
    /// Derived from the log on load: false once a later entry touched an
    /// overlapping target.
    #[serde(skip)]
    pub can_undo: bool,
    /// Risks attached when the entry was recorded.
    #[serde(default)]
    pub undo_risks: Vec<String>,
    /// Backup taken immediately before the command mutated anything.
    pub preceding_backup_id: String,
    /// For undo entries, the id of the operation that was reversed.
    #[serde(default)]
    pub undoes: Option<u64>,
}

/// The outcome of an undo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoResult {
    /// Summary line.
    pub message: String,
    /// The backup whose content was restored.
    pub restored_from: String,
    /// The safety backup of the pre-undo state.
    pub new_backup_id: String,
    /// Risks of the undo itself: forced past staleness, shared tiers
    /// rewritten. Informational only.
    pub risks: Vec<String>,
    /// Files the safety backup could not capture and per-file restore
    /// failures.
    pub warnings: Vec<String>,
    /// Id of the journal entry recording the undo.
    pub undo_operation_id: u64,
}

/// Aggregate view of the journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoSummary {
    /// Number of entries in the journal.
    pub total_operations: usize,
    /// Number of entries that can currently be undone.
    pub undoable_operations: usize,
    /// The most recent entry, if any.
    pub last_operation: Option<UndoableOperation>,
    /// Timestamp of the oldest undoable entry.
    pub oldest_undoable: Option<DateTime<Utc>>,
}

// --- DIAGNOSTICS ---

/// One document found in a layer directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStatus {
    /// The document kind.
    pub kind: DocumentKind,
    /// The file that backs it.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
}

/// Diagnostic view of one layer directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerStatus {
    /// The layer.
    pub layer: Layer,
    /// Its directory.
    pub path: PathBuf,
    /// Whether the directory exists.
    pub exists: bool,
    /// Whether the layer takes part in resolution (active environment or base).
    pub active: bool,
    /// Documents present in the directory.
    pub documents: Vec<DocumentStatus>,
}
