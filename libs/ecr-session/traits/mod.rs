//! # ecr-session Traits
//!
//! Capabilities and policies the session state machine is written against:
//!
//! - **Transport / Link**: secure duplex connection to the remote service
//! - **TimerService**: schedule-once, schedule-periodic, cancel
//! - **HeaderProvider**: headers for the WebSocket upgrade request
//! - **ReconnectionStrategy**: backoff policy after an unexpected drop
//! - **Callbacks**: per-operation response, error and connect handlers
//!
//! ## Example
//!
//! ```rust,ignore
//! use ecr_session::traits::*;
//!
//! let callbacks = Callbacks::new()
//!     .on_response(|message, _op| {
//!         println!("terminal answered: {}", message);
//!         Disposition::Close
//!     })
//!     .on_error(|code, message| {
//!         eprintln!("error {}: {}", code, message);
//!         Disposition::Close
//!     });
//! ```

pub mod callbacks;
pub mod error;
pub mod headers;
pub mod reconnect;
pub mod timer;
pub mod transport;

// Re-export commonly used types
pub use callbacks::{Callbacks, ConnectFn, Disposition, ErrorFn, ResponseFn};
pub use error::{EcrError, Result, SessionError};
pub use headers::{CredentialHeaders, HeaderProvider, Headers, NoHeaders};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use timer::{TimerId, TimerService};
pub use transport::{ConnectRequest, Link, LinkId, Transport};
