//! Secure duplex transport capability
//!
//! The session never touches sockets directly. A [`Transport`] opens
//! [`Link`]s; each link is one connection attempt and reports back through
//! the session's `on_*` handlers (open, frame, pong, error, closed), which
//! the owning event loop calls in delivery order.

use crate::traits::error::Result;

/// Identifier of a single connection attempt
///
/// Events tagged with an id other than the session's current link are stale
/// and must be dropped by the event loop.
pub type LinkId = u64;

/// Everything a transport needs to open one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Endpoint URL (`wss://` or `ws://`)
    pub url: String,
    /// Reconnection attempt this connect belongs to (0 for the initial connect)
    pub attempt: usize,
}

/// Handle to one connection
///
/// All methods are non-blocking: they hand work to the transport and return.
pub trait Link: Send {
    /// Id that the transport stamps on every event of this link
    fn id(&self) -> LinkId;

    /// Queue a text frame for sending
    fn send(&mut self, frame: String) -> Result<()>;

    /// Queue a liveness probe (WebSocket PING)
    fn send_ping(&mut self) -> Result<()>;

    /// Write every frame queued before this call, then close the connection
    ///
    /// The transport reports closure through the session's `on_closed`.
    fn close(&mut self);

    /// Tear the connection down immediately, without a close handshake
    ///
    /// No further events are reported for this link.
    fn abort(&mut self);
}

/// Factory for links to a fixed remote endpoint
pub trait Transport: Send {
    type Link: Link;

    /// Start connecting; the outcome arrives later as `on_open` or
    /// `on_connect_failed` for the returned link
    fn connect(&mut self, request: ConnectRequest) -> Self::Link;
}
