//! sing-xboard: Command-line client for the sing-xboard orchestrator
//!
//! Provides the `sing-xboard` CLI for driving a running orchestrator over
//! its HTTP API and following its status push stream.

pub mod api;
pub mod commands;
pub mod output;
