// src/constants.rs

/// The name of the settings file inside the configuration root.
pub const SETTINGS_FILENAME: &str = "envkeep.toml";

/// The directory (inside the root) that holds the tier/scope directories.
pub const TIERS_DIR: &str = "tiers";

/// The directory name of a tier's base scope.
pub const BASE_SCOPE_DIR: &str = "base";

/// The directory (inside a tier) that holds one directory per named environment.
pub const ENV_SCOPE_DIR: &str = "env";

/// The directory (inside the root) that holds one subdirectory per backup.
pub const BACKUPS_DIR: &str = "backups";

/// The manifest file written inside every backup directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// The directory (inside a backup) holding the captured files.
pub const BACKUP_FILES_DIR: &str = "files";

/// Extension appended to captured files stored with lz4 compression.
pub const COMPRESSED_EXTENSION: &str = "lz4";

/// The append-only version ledger (one JSON record per line).
pub const LEDGER_FILENAME: &str = "versions.jsonl";

/// The append-only undo journal (one JSON record per line).
pub const JOURNAL_FILENAME: &str = "journal.jsonl";

/// The advisory lock file guarding mutating operations.
pub const LOCK_FILENAME: &str = ".envkeep.lock";

/// Recognised document extensions, in lookup priority order.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "toml"];

/// Default number of backups kept by the retention policy.
pub const DEFAULT_MAX_RETAINED_BACKUPS: usize = 50;

/// Number of journal entries shown by `undo list` when no limit is given.
pub const DEFAULT_UNDO_LIST_LIMIT: usize = 10;
