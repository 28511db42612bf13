// One module per command group.

pub mod backup;
pub mod commons;
pub mod edit;
pub mod import;
pub mod resolve;
pub mod status;
pub mod undo;
pub mod version;
