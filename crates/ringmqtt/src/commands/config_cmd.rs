//! Config subcommand handlers.

use std::path::Path;

use ringmqtt_config::{Config, load_config, save_config};

use crate::cli::{ConfigArgs, ConfigCommand};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, path: &Path) -> Result<(), CliError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = load_config(path)?;
            // Surface validation errors before printing
            config.resolve()?;
            print!("{}", serde_yaml::to_string(&config.redacted())?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !*force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            save_config(&Config::default(), path)?;
            eprintln!("Wrote {}", path.display());
            Ok(())
        }
    }
}
