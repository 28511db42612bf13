// src/cli/args.rs
use clap::Args;

use crate::models::Tier;

/// Which layer a document command writes to.
#[derive(Args, Debug, Clone)]
pub struct LayerArgs {
    /// Tier to write to.
    #[arg(long, value_enum, default_value_t = Tier::User)]
    pub tier: Tier,

    /// Write to this environment's layer of the tier instead of its base.
    #[arg(long = "layer-env", value_name = "NAME")]
    pub layer_env: Option<String>,
}
