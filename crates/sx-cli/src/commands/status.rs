//! Status command implementation

use anyhow::Result;

use crate::api::ApiClient;
use crate::output::{format_status, print_info};

/// Execute the status command
pub async fn status_command(client: &ApiClient, json: bool) -> Result<()> {
    let status = match client.status().await {
        Ok(s) => s,
        Err(e) => {
            print_info("Is the orchestrator running? Try: sx-orchestrator");
            return Err(e.context("Failed to get orchestrator status"));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    // The subscription only adds names and the source; its absence isn't fatal.
    let subscription = client.subscription().await.ok();
    println!("{}", format_status(&status, subscription.as_ref()));

    Ok(())
}
