//! Watch command: follow the push stream

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, PushClient, PushEvent};
use crate::output::{format_status_line, print_success, print_warning};

/// Print every pushed snapshot until `cancel` fires.
///
/// Lost connections are reported and retried; the command itself only ends
/// on cancellation.
pub async fn watch_command(client: &ApiClient, cancel: CancellationToken) -> Result<()> {
    let push = PushClient::new(client.push_url());
    let delay = push.reconnect_delay();
    let (mut events, task) = push.spawn(cancel.clone());

    while let Some(event) = events.recv().await {
        match event {
            PushEvent::Connected => print_success(&format!("Connected to {}", client.base_url())),
            PushEvent::Snapshot(snapshot) => println!("{}", format_status_line(&snapshot)),
            PushEvent::Disconnected { reason } => {
                print_warning(&format!("Disconnected: {}. Retrying in {:?}", reason, delay))
            }
        }
    }

    task.await?;
    Ok(())
}
