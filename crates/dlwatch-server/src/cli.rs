// src/cli.rs
// Command-line surface (spec §6 configuration): where to find the config
// file, with an env-overridable default.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dlwatch", about = "Chat-driven control plane for a download engine")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', env = "DLWATCH_CONFIG", default_value = "dlwatch.toml")]
    pub config: PathBuf,
}
