//! envkeep: layered developer-environment configuration with versioned
//! backups, a version ledger and an undo journal.

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
