//! sx-core: Core types and configuration for sing-xboard
//!
//! This crate provides the shared domain types, error taxonomy, the HTTP/push
//! API contract and configuration structures used by the orchestrator daemon
//! and the CLI.

pub mod api;
pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use error::{OrchestratorError, ProbeError, ProcessError, SubscriptionError};
pub use types::{Node, NodeId, UserInfo};
