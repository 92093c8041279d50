//! `ringmqtt token`: seed the state file with a refresh token.

use std::path::Path;

use tracing::info;

use ringmqtt_config::load_config;
use ringmqtt_core::StateStore;

use crate::cli::TokenArgs;
use crate::error::CliError;

pub fn handle(args: &TokenArgs, config_path: &Path) -> Result<(), CliError> {
    let token = args.token.trim();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "must not be empty".into(),
        });
    }

    let config = load_config(config_path)?;
    let store = StateStore::new(&config.state_file);
    let mut state = store.load()?;
    state.ensure_system_id();
    token.clone_into(&mut state.ring_token);
    store.save(&state)?;

    info!(path = %store.path().display(), "refresh token stored");
    eprintln!("Stored refresh token in {}", store.path().display());
    Ok(())
}
