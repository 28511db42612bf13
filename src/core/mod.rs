// src/core/mod.rs

pub mod backup_store;
pub mod config_loader;
pub mod config_resolver;
pub mod document;
pub mod error;
pub mod hashing;
pub mod lock;
pub mod paths;
pub mod progress;
pub mod store;
pub mod undo_journal;
pub mod version_ledger;
