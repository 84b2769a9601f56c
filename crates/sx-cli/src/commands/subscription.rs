//! Subscription commands

use anyhow::Result;

use crate::api::ApiClient;
use crate::output::{print_info, print_success};

/// Point the orchestrator at a new subscription and fetch it
pub async fn subscribe_command(client: &ApiClient, url: &str, token: Option<&str>) -> Result<()> {
    print_info("Fetching subscription...");
    let view = client.subscribe(url, token).await?;
    print_success(&format!(
        "Subscribed to {} ({} nodes)",
        view.source.as_deref().unwrap_or(url),
        view.nodes.len()
    ));
    Ok(())
}

/// Re-fetch the stored subscription
pub async fn refresh_command(client: &ApiClient) -> Result<()> {
    let view = client.refresh().await?;
    print_success(&format!("Subscription refreshed ({} nodes)", view.nodes.len()));
    Ok(())
}
