//! CLI command implementations

mod config;
mod engine;
mod nodes;
mod status;
mod subscription;
mod watch;

pub use config::{config_init, config_path, config_show};
pub use engine::{logs_command, restart_command, start_command, stop_command};
pub use nodes::{nodes_command, probe_command, select_command};
pub use status::status_command;
pub use subscription::{refresh_command, subscribe_command};
pub use watch::watch_command;
