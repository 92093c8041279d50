//! Subcommand handlers.

pub mod config_cmd;
pub mod run;
pub mod token;

use std::path::PathBuf;

use crate::cli::GlobalOpts;

/// `--config` if given, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(ringmqtt_config::config_path)
}
