//! Node list, selection and probe commands

use anyhow::Result;

use sx_core::types::NodeId;

use crate::api::ApiClient;
use crate::output::{format_nodes, format_probes, print_success, print_warning};

/// List the nodes of the current subscription
pub async fn nodes_command(client: &ApiClient) -> Result<()> {
    let nodes = client.nodes().await?;
    println!("{}", format_nodes(&nodes));
    Ok(())
}

/// Select the node the engine routes through
pub async fn select_command(client: &ApiClient, id: u64) -> Result<()> {
    let view = client.select_node(NodeId(id)).await?;
    let name = view
        .nodes
        .iter()
        .find(|n| n.id == NodeId(id))
        .map(|n| n.name.as_str())
        .unwrap_or("?");
    print_success(&format!("Selected node {} ({})", id, name));
    Ok(())
}

/// Probe one node, or every node when `id` is `None`
pub async fn probe_command(client: &ApiClient, id: Option<u64>) -> Result<()> {
    let reports = match id {
        Some(id) => vec![client.probe(NodeId(id)).await?],
        None => client.probe_all().await?,
    };

    println!("{}", format_probes(&reports));

    let unreachable = reports.iter().filter(|r| !r.reachable).count();
    if unreachable > 0 {
        print_warning(&format!(
            "{} of {} nodes unreachable",
            unreachable,
            reports.len()
        ));
    }
    Ok(())
}
