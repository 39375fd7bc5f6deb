//! Session lifecycle states, diagnostic events and counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lifecycle state of a session
///
/// ```text
/// Idle -> Connecting -> Authenticating -> Active -> Closing -> Closed
///                                           |
///                                           +--> Reconnecting -> Authenticating
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing sent yet
    Idle,
    /// Initial connect in progress
    Connecting,
    /// Transport open, waiting for the handshake confirmation
    Authenticating,
    /// Handshake confirmed, messages flow
    Active,
    /// Connection lost; waiting for backoff or reconnect in progress
    Reconnecting,
    /// Draining the transport before closing
    Closing,
    /// Terminal for the current conversation
    Closed,
}

impl SessionState {
    /// The session believes the transport is open
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Authenticating | SessionState::Active)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Diagnostic events published to an injected sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connect attempt started (0 = initial)
    Connecting { attempt: usize },
    /// Transport open, awaiting handshake
    Authenticating,
    /// Handshake confirmed
    Active,
    /// Reconnect scheduled after `delay`
    Reconnecting { attempt: usize, delay: Duration },
    /// Liveness probe unanswered; connection dropped
    PeerSilent,
    /// Ack-bearing frame resent
    Retransmit { uuid: String },
    /// Peer acknowledged an ack-bearing frame
    Acknowledged { uuid: String },
    /// Error surfaced to callers
    Error { code: i64, message: String },
    /// Session reached `Closed`
    Closed,
}

/// Lock-free counters shared between the session and client handles
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    reconnects: AtomicU64,
    retransmits: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_sent(&self, frames: u64) {
        self.frames_sent.fetch_add(frames, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_retransmits(&self) {
        self.retransmits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            retransmits: self.retransmits.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub reconnects: u64,
    pub retransmits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_states() {
        assert!(SessionState::Authenticating.is_open());
        assert!(SessionState::Active.is_open());
        assert!(!SessionState::Reconnecting.is_open());
        assert!(!SessionState::Closing.is_open());
        assert!(SessionState::Closed.is_closed());
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = AtomicMetrics::new();
        metrics.increment_sent();
        metrics.increment_sent();
        metrics.increment_received();
        metrics.increment_retransmits();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.frames_received, 1);
        assert_eq!(snapshot.reconnects, 0);
        assert_eq!(snapshot.retransmits, 1);
    }
}
