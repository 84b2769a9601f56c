//! Config command implementations
//!
//! These act on the orchestrator's config file directly, so they work
//! whether or not the orchestrator is running.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use sx_core::config::{self, OrchestratorConfig};

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Show current configuration
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'sing-xboard config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Print the config file location
pub fn config_path(config_path: Option<&Path>) -> Result<()> {
    println!("{}", resolve(config_path).display());
    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &OrchestratorConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}
