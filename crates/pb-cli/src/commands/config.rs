//! Config command implementations

use std::path::PathBuf;

use anyhow::Result;

use crate::output::print_info;
use pb_core::config::{self, ToolsConfig};

/// Print the effective configuration as TOML
pub fn config_show(config: &ToolsConfig, config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_path
        .cloned()
        .unwrap_or_else(config::default_config_path);

    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_info(&format!("No configuration file at {:?}, using defaults", path));
    }
    println!();
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Print the path of the configuration file
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_path
        .cloned()
        .unwrap_or_else(config::default_config_path);
    println!("{}", path.display());
    Ok(())
}
