//! Status push channel
//!
//! Every connected client holds a [`PushSubscription`]. Each message carries
//! the full snapshot, and a new subscription receives the current snapshot
//! right away, so a client that reconnects never has to replay anything.

mod hub;

pub use hub::{PushHub, PushSubscription};
