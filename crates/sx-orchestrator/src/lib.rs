//! sx-orchestrator: local daemon supervising sing-box for an Xboard subscription
//!
//! The orchestrator keeps the panel's node list in sync, runs the sing-box
//! engine as a child process, aggregates its state into status snapshots and
//! pushes them to connected clients over `/ws`. Clients drive it through the
//! HTTP API in [`server`].

pub mod engine_config;
pub mod prober;
pub mod push;
pub mod server;
pub mod state;
pub mod status;
pub mod subscription;
pub mod supervisor;

pub use state::OrchestratorState;
