//! # ecr-session core
//!
//! The session state machine and the pieces it coordinates:
//!
//! - **session**: lifecycle, dispatch, close and reconnect policy
//! - **pending / ack_tracker**: ordered queue and single in-flight ack-bearing frame
//! - **keepalive**: ping/pong liveness latch
//! - **message**: wire envelope encoding and parsing
//! - **driver / client / builder**: tokio runtime around the state machine
//!
//! ## Example
//!
//! ```rust,ignore
//! use ecr_session::core::*;
//! use ecr_session::traits::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ecr_session::builder()
//!         .api_key(std::env::var("API_KEY")?)
//!         .identity("POS1", "stored-token")
//!         .build()?;
//!
//!     client.start_transaction(
//!         r#"{"Amount":"59.0","CurrencyCode":"203","Operation":"CP"}"#,
//!         "T-1001",
//!         Callbacks::new()
//!             .on_connect(|| println!("connected"))
//!             .on_response(|message, op| {
//!                 println!("{:?}: {}", op, message);
//!                 if op == Some("complete_transaction") {
//!                     Disposition::Close
//!                 } else {
//!                     Disposition::KeepOpen
//!                 }
//!             }),
//!     )?;
//!
//!     client.wait_closed().await?;
//!     Ok(())
//! }
//! ```

pub mod ack_tracker;
pub mod builder;
pub mod client;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod keepalive;
pub mod message;
pub mod pending;
pub mod session;
pub mod state;

// Re-export main types
pub use builder::{states, SessionBuilder};
pub use client::EcrClient;
pub use config::SessionConfig;
pub use credentials::{generate_token, Credentials, TOKEN_LENGTH};
pub use driver::{DriverEvent, LinkEvent, SessionCommand, TokioTimers, WsLink, WsTransport};
pub use message::{InboundEnvelope, Operation, OutboundMessage, Target};
pub use session::Session;
pub use state::{AtomicMetrics, Metrics, SessionEvent, SessionState};

/// Create a new session builder
///
/// # Example
/// ```ignore
/// let client = ecr_session::builder()
///     .api_key("key")
///     .identity("POS1", token)
///     .reconnect_strategy(ExponentialBackoff::new(
///         Duration::from_secs(1),
///         Duration::from_secs(30),
///         Some(10),
///     ))
///     .build()?;
/// ```
pub fn builder() -> SessionBuilder<states::NoCredentials> {
    SessionBuilder::new()
}
