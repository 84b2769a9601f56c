//! Clients for the orchestrator API
//!
//! [`ApiClient`] wraps the HTTP endpoints and unwraps the response envelope.
//! [`PushClient`] follows `/ws` and reconnects after a fixed delay whenever
//! the stream drops.

mod client;
mod push;

pub use client::{ApiClient, HealthInfo, DEFAULT_SERVER};
pub use push::{PushClient, PushEvent, RECONNECT_DELAY};
