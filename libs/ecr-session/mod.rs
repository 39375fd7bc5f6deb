//! # ecr-session
//!
//! Client session engine for the ECR transaction service. Keeps one
//! authenticated WebSocket conversation with the service, queues outbound
//! operations until the handshake is confirmed, retransmits notifications
//! until acknowledged, probes liveness and reconnects after unexpected drops.
//!
//! ## Features
//!
//! - **Sans-IO state machine**: `Session` is driven by `on_*` events over pluggable transport and timers
//! - **Type-state builder**: the API key must be supplied before a client can be built
//! - **Reliable notify**: one in-flight ack-bearing frame, resent until acknowledged
//! - **Pluggable reconnection**: fixed delay, exponential backoff, or never

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use core::{
    builder::{states, SessionBuilder},
    client::EcrClient,
    config::SessionConfig,
    credentials::{generate_token, Credentials},
    message::{Operation, OutboundMessage},
    session::Session,
    state::{Metrics, SessionEvent, SessionState},
};

// Convenience function
pub use core::builder;
