//! Output formatting utilities for the CLI
//!
//! Tables for nodes and probe results, a status summary, and colored status
//! messages.

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use sx_core::api::{LogLine, LogStream, NodeView, ProbeReport, SubscriptionView};
use sx_core::types::{StatusSnapshot, UserInfo};

/// Format the node list as an ASCII table
///
/// The selected node is marked with `*`. Latency shows `-` when the node has
/// not been probed or was unreachable.
pub fn format_nodes(nodes: &[NodeView]) -> String {
    if nodes.is_empty() {
        return "No nodes. Set a subscription with: sing-xboard subscribe <url>".to_string();
    }

    #[derive(Tabled)]
    struct NodeRow {
        #[tabled(rename = "")]
        selected: &'static str,
        #[tabled(rename = "ID")]
        id: u64,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "PROTOCOL")]
        protocol: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "LATENCY")]
        latency: String,
    }

    let rows: Vec<NodeRow> = nodes
        .iter()
        .map(|n| NodeRow {
            selected: if n.selected { "*" } else { "" },
            id: n.id.get(),
            name: truncate(&n.name, 32),
            protocol: n.protocol.clone(),
            address: n.address.clone(),
            latency: format_latency(n.latency),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

/// Format probe results as an ASCII table
pub fn format_probes(reports: &[ProbeReport]) -> String {
    if reports.is_empty() {
        return "No nodes to probe".to_string();
    }

    #[derive(Tabled)]
    struct ProbeRow {
        #[tabled(rename = "ID")]
        id: u64,
        #[tabled(rename = "REACHABLE")]
        reachable: &'static str,
        #[tabled(rename = "LATENCY")]
        latency: String,
        #[tabled(rename = "ERROR")]
        error: String,
    }

    let rows: Vec<ProbeRow> = reports
        .iter()
        .map(|r| ProbeRow {
            id: r.node_id.get(),
            reachable: if r.reachable { "yes" } else { "no" },
            latency: format_latency(r.latency),
            error: r.error.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a status snapshot as a human-readable block
pub fn format_status(status: &StatusSnapshot, subscription: Option<&SubscriptionView>) -> String {
    let mut output = String::new();

    output.push_str(&format!("Engine: {}", status.state));
    if let Some(pid) = status.pid {
        output.push_str(&format!(" (pid {})", pid));
    }
    output.push('\n');

    if status.running {
        output.push_str(&format!("Uptime: {}\n", format_duration(status.uptime)));
    }
    output.push_str(&format!(
        "Traffic: ↑ {}  ↓ {}\n",
        format_bytes(status.stats.upload),
        format_bytes(status.stats.download)
    ));

    let selected = match (status.selected_node, subscription) {
        (Some(id), Some(sub)) => sub
            .nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| format!("{} ({})", n.name, id))
            .unwrap_or_else(|| id.to_string()),
        (Some(id), None) => id.to_string(),
        (None, _) => "auto".to_string(),
    };
    output.push_str(&format!("Node: {}\n", selected));

    if let Some(sub) = subscription {
        output.push_str(&format!(
            "Subscription: {}\n",
            sub.source.as_deref().unwrap_or("not configured")
        ));
        if let Some(at) = sub.last_update {
            output.push_str(&format!(
                "Last refresh: {} ({} nodes)\n",
                format_timestamp_millis(at),
                sub.nodes.len()
            ));
        }
    }

    if let Some(user) = &status.user {
        output.push_str(&format_user(user));
    }

    if let Some(exit) = &status.last_exit {
        if !status.running {
            output.push_str(&format!(
                "Last exit: {} at {}\n",
                exit.reason,
                format_timestamp_millis(exit.at)
            ));
        }
    }

    output
}

/// One-line status summary, used by `watch`
pub fn format_status_line(status: &StatusSnapshot) -> String {
    let mut line = format!(
        "[{}] {}",
        format_timestamp_millis(status.last_update),
        status.state
    );
    if status.running {
        line.push_str(&format!(" {}", format_duration(status.uptime)));
    }
    line.push_str(&format!(
        "  ↑ {}  ↓ {}",
        format_bytes(status.stats.upload),
        format_bytes(status.stats.download)
    ));
    if let Some(id) = status.selected_node {
        line.push_str(&format!("  node {}", id));
    }
    line
}

fn format_user(user: &UserInfo) -> String {
    let quota = if user.total == 0 {
        "unlimited".to_string()
    } else {
        format_bytes(user.total)
    };
    let expiry = match user.expire_at {
        Some(secs) => chrono::DateTime::from_timestamp(secs, 0)
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| secs.to_string()),
        None => "never".to_string(),
    };

    format!(
        "Account: {}{}\nUsage: {} / {}\nExpires: {}\n",
        user.email,
        if user.active { "" } else { " (inactive)" },
        format_bytes(user.used()),
        quota,
        expiry
    )
}

/// Format captured engine output, one line per entry
pub fn format_logs(lines: &[LogLine]) -> String {
    lines
        .iter()
        .map(|l| {
            let stream = match l.stream {
                LogStream::Stdout => "out",
                LogStream::Stderr => "err",
            };
            format!("{} {} {}", format_timestamp_millis(l.at), stream, l.line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_latency(latency: Option<u64>) -> String {
    latency
        .map(|ms| format!("{}ms", ms))
        .unwrap_or_else(|| "-".to_string())
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn format_timestamp_millis(millis: u64) -> String {
    chrono::DateTime::from_timestamp_millis(millis as i64)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| millis.to_string())
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn print_tagged(to_stderr: bool, color: crossterm::style::Color, tag: &str, msg: &str) {
    use crossterm::style::{Print, ResetColor, SetForegroundColor};
    use std::io::Write;

    let mut out: Box<dyn Write> = if to_stderr {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(tag),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green to stdout
pub fn print_success(msg: &str) {
    print_tagged(false, crossterm::style::Color::Green, "✓ ", msg);
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    print_tagged(true, crossterm::style::Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    print_tagged(true, crossterm::style::Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan to stdout
pub fn print_info(msg: &str) {
    print_tagged(false, crossterm::style::Color::Cyan, "ℹ ", msg);
}
