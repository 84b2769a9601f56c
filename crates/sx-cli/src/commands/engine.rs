//! Engine lifecycle and log commands

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::api::ApiClient;
use crate::output::{format_logs, print_info, print_success};

/// Read a sing-box config from disk
fn read_config(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read engine config: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Engine config is not valid JSON: {:?}", path))
}

/// Start the engine, with `config` or a config generated from the subscription
pub async fn start_command(client: &ApiClient, config: Option<&Path>) -> Result<()> {
    let config = config.map(read_config).transpose()?;
    let info = client.start(config).await?;
    match info.pid {
        Some(pid) => print_success(&format!("Engine {} (pid {})", info.state, pid)),
        None => print_success(&format!("Engine {}", info.state)),
    }
    Ok(())
}

/// Stop the engine
pub async fn stop_command(client: &ApiClient) -> Result<()> {
    let info = client.stop().await?;
    print_success(&format!("Engine {}", info.state));
    Ok(())
}

/// Restart the engine, optionally with a new config
pub async fn restart_command(client: &ApiClient, config: Option<&Path>) -> Result<()> {
    let config = config.map(read_config).transpose()?;
    let info = client.restart(config).await?;
    match info.pid {
        Some(pid) => print_success(&format!("Engine restarted (pid {})", pid)),
        None => print_success(&format!("Engine {}", info.state)),
    }
    Ok(())
}

/// Print captured engine output
pub async fn logs_command(client: &ApiClient, tail: Option<usize>) -> Result<()> {
    let lines = client.logs(tail).await?;
    if lines.is_empty() {
        print_info("No engine output captured");
    } else {
        println!("{}", format_logs(&lines));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"log":{"level":"warn"}}"#).unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config["log"]["level"], "warn");
    }

    #[test]
    fn test_read_config_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "log: warn").unwrap();

        let err = read_config(&path).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
