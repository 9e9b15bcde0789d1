//! Config command - show or write out the effective configuration.

use hoard_core::Config;
use std::path::Path;

/// Run the config command.
pub fn run(config: Config, explicit_path: Option<&Path>, write: bool) -> anyhow::Result<()> {
    let config_path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };

    if write {
        match explicit_path {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        println!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    println!("# {}", config_path.display());
    println!("# database: {}", config.database_path()?.display());
    println!();
    print!("{}", config.to_toml_string()?);

    Ok(())
}
