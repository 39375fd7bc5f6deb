//! Liveness monitoring
//!
//! A two-state latch per tick: the peer's PONG sets `Confirmed`; each tick
//! either finds the latch `Awaiting` (the previous probe went unanswered, so
//! the connection is dead) or flips it to `Awaiting` and sends a new probe.
//!
//! ```text
//! tick: Confirmed -> Awaiting + PING
//! pong: Awaiting  -> Confirmed
//! tick: Awaiting  -> PeerSilent
//! ```

use crate::traits::{TimerId, TimerService};
use std::time::Duration;

/// Latch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// A liveness response arrived since the last probe
    Confirmed,
    /// Probe sent, no response yet
    Awaiting,
}

/// What to do on a keepalive tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Send a new liveness probe
    SendPing,
    /// The previous probe went unanswered
    PeerSilent,
}

/// Periodic liveness probe and peer-silence detector
///
/// The timer exists exactly while a transport is open.
#[derive(Debug)]
pub struct KeepaliveMonitor {
    interval: Duration,
    timer: Option<TimerId>,
    liveness: Liveness,
}

impl KeepaliveMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: None,
            liveness: Liveness::Confirmed,
        }
    }

    /// Start probing a freshly opened transport
    pub fn start<S: TimerService>(&mut self, timers: &mut S) {
        self.stop(timers);
        self.liveness = Liveness::Confirmed;
        self.timer = Some(timers.schedule_periodic(self.interval));
    }

    pub fn stop<S: TimerService>(&mut self, timers: &mut S) {
        if let Some(timer) = self.timer.take() {
            timers.cancel(timer);
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    #[inline]
    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.timer == Some(id)
    }

    #[inline]
    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// Record the peer's liveness response
    pub fn record_pong(&mut self) {
        self.liveness = Liveness::Confirmed;
    }

    /// Advance the latch by one period
    pub fn tick(&mut self) -> Probe {
        match self.liveness {
            Liveness::Awaiting => Probe::PeerSilent,
            Liveness::Confirmed => {
                self.liveness = Liveness::Awaiting;
                Probe::SendPing
            }
        }
    }
}
