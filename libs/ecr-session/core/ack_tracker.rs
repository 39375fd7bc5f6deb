//! Acknowledgment tracking for ack-bearing frames
//!
//! Holds at most one unacknowledged frame. While armed, a periodic timer
//! resends the identical frame until the peer echoes its uuid. On a dropped
//! connection the timer is suspended but the frame is kept, so it can be
//! resent once the session is active again.

use crate::traits::{Link, Result, TimerId, TimerService};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct Tracked {
    seq: u64,
    uuid: String,
    frame: String,
    close_after_ack: bool,
}

/// Outcome of a matching acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledged {
    /// Session-local sequence number of the acknowledged message
    pub seq: u64,
    pub uuid: String,
    /// The session should terminate now that delivery is confirmed
    pub close_after_ack: bool,
}

/// Tracks zero-or-one outstanding unacknowledged frame
#[derive(Debug)]
pub struct AckTracker {
    interval: Duration,
    tracked: Option<Tracked>,
    timer: Option<TimerId>,
}

impl AckTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tracked: None,
            timer: None,
        }
    }

    /// A frame is awaiting acknowledgment
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.tracked.is_some()
    }

    /// The retransmission timer is running
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn tracked_uuid(&self) -> Option<&str> {
        self.tracked.as_ref().map(|t| t.uuid.as_str())
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.timer == Some(id)
    }

    /// Start tracking a frame that was just sent
    pub fn arm<S: TimerService>(
        &mut self,
        seq: u64,
        uuid: impl Into<String>,
        frame: String,
        close_after_ack: bool,
        timers: &mut S,
    ) {
        if let Some(old) = self.timer.take() {
            timers.cancel(old);
        }
        let uuid = uuid.into();
        debug!(uuid = %uuid, "Tracking frame until acknowledged");
        self.tracked = Some(Tracked {
            seq,
            uuid,
            frame,
            close_after_ack,
        });
        self.timer = Some(timers.schedule_periodic(self.interval));
    }

    /// Resend the tracked frame; returns its uuid
    pub fn retransmit<L: Link>(&mut self, link: &mut L) -> Result<Option<String>> {
        match &self.tracked {
            Some(tracked) => {
                debug!(uuid = %tracked.uuid, "Retransmitting unacknowledged frame");
                link.send(tracked.frame.clone())?;
                Ok(Some(tracked.uuid.clone()))
            }
            None => Ok(None),
        }
    }

    /// Match an inbound ack; a uuid other than the tracked one is ignored
    pub fn acknowledge<S: TimerService>(&mut self, uuid: &str, timers: &mut S) -> Option<Acknowledged> {
        let matches = self.tracked.as_ref().map_or(false, |t| t.uuid == uuid);
        if !matches {
            debug!(uuid = %uuid, tracked = ?self.tracked_uuid(), "Ignoring ack for untracked uuid");
            return None;
        }

        if let Some(timer) = self.timer.take() {
            timers.cancel(timer);
        }
        self.tracked.take().map(|t| Acknowledged {
            seq: t.seq,
            uuid: t.uuid,
            close_after_ack: t.close_after_ack,
        })
    }

    /// Stop retransmitting but keep the frame for [`AckTracker::resume`]
    pub fn suspend<S: TimerService>(&mut self, timers: &mut S) {
        if let Some(timer) = self.timer.take() {
            timers.cancel(timer);
        }
    }

    /// Resend a suspended frame on a fresh link and restart the timer
    ///
    /// Returns true when a frame was resent.
    pub fn resume<L: Link, S: TimerService>(&mut self, link: &mut L, timers: &mut S) -> Result<bool> {
        if self.timer.is_some() {
            return Ok(false);
        }
        match &self.tracked {
            Some(tracked) => {
                debug!(uuid = %tracked.uuid, "Resending unacknowledged frame after reconnect");
                link.send(tracked.frame.clone())?;
                self.timer = Some(timers.schedule_periodic(self.interval));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Forget the tracked frame; delivery stays unresolved
    pub fn reset<S: TimerService>(&mut self, timers: &mut S) {
        if let Some(timer) = self.timer.take() {
            timers.cancel(timer);
        }
        self.tracked = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{EcrError, LinkId};
    use std::collections::HashSet;

    #[derive(Default)]
    struct Timers {
        next: u64,
        active: HashSet<TimerId>,
    }

    impl TimerService for Timers {
        fn schedule_once(&mut self, _delay: Duration) -> TimerId {
            self.next += 1;
            self.active.insert(TimerId(self.next));
            TimerId(self.next)
        }

        fn schedule_periodic(&mut self, delay: Duration) -> TimerId {
            self.schedule_once(delay)
        }

        fn cancel(&mut self, id: TimerId) {
            self.active.remove(&id);
        }
    }

    #[derive(Default)]
    struct Sink {
        frames: Vec<String>,
        broken: bool,
    }

    impl Link for Sink {
        fn id(&self) -> LinkId {
            1
        }

        fn send(&mut self, frame: String) -> Result<()> {
            if self.broken {
                return Err(EcrError::ChannelSend("closed".into()));
            }
            self.frames.push(frame);
            Ok(())
        }

        fn send_ping(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}

        fn abort(&mut self) {}
    }

    #[test]
    fn test_retransmit_until_acknowledged() {
        let mut timers = Timers::default();
        let mut link = Sink::default();
        let mut tracker = AckTracker::new(Duration::from_secs(1));

        tracker.arm(1, "u-1", "frame".into(), true, &mut timers);
        assert!(tracker.is_busy());
        assert_eq!(timers.active.len(), 1);

        tracker.retransmit(&mut link).unwrap();
        tracker.retransmit(&mut link).unwrap();
        assert_eq!(link.frames, vec!["frame", "frame"]);

        let acked = tracker.acknowledge("u-1", &mut timers).unwrap();
        assert_eq!(acked.seq, 1);
        assert!(acked.close_after_ack);
        assert!(!tracker.is_busy());
        assert!(timers.active.is_empty());

        // Nothing left to resend
        assert_eq!(tracker.retransmit(&mut link).unwrap(), None);
    }

    #[test]
    fn test_mismatched_ack_is_ignored() {
        let mut timers = Timers::default();
        let mut tracker = AckTracker::new(Duration::from_secs(1));
        tracker.arm(3, "u-3", "frame".into(), false, &mut timers);

        assert!(tracker.acknowledge("other", &mut timers).is_none());
        assert!(tracker.is_busy());
        assert!(tracker.is_armed());
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut timers = Timers::default();
        let mut link = Sink::default();
        let mut tracker = AckTracker::new(Duration::from_secs(1));
        tracker.arm(1, "u-1", "frame".into(), true, &mut timers);

        tracker.suspend(&mut timers);
        assert!(tracker.is_busy());
        assert!(!tracker.is_armed());
        assert!(timers.active.is_empty());

        assert!(tracker.resume(&mut link, &mut timers).unwrap());
        assert_eq!(link.frames, vec!["frame"]);
        assert!(tracker.is_armed());

        // Already armed: no duplicate resend
        assert!(!tracker.resume(&mut link, &mut timers).unwrap());
        assert_eq!(link.frames.len(), 1);
    }

    #[test]
    fn test_resume_on_broken_link_keeps_frame() {
        let mut timers = Timers::default();
        let mut link = Sink {
            broken: true,
            ..Sink::default()
        };
        let mut tracker = AckTracker::new(Duration::from_secs(1));
        tracker.arm(1, "u-1", "frame".into(), false, &mut timers);
        tracker.suspend(&mut timers);

        assert!(tracker.resume(&mut link, &mut timers).is_err());
        assert!(tracker.is_busy());
        assert!(!tracker.is_armed());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut timers = Timers::default();
        let mut tracker = AckTracker::new(Duration::from_secs(1));
        tracker.arm(1, "u-1", "frame".into(), false, &mut timers);

        tracker.reset(&mut timers);
        tracker.reset(&mut timers);
        assert!(!tracker.is_busy());
        assert!(timers.active.is_empty());
    }
}
