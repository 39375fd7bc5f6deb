use std::fmt;
use std::time::Duration;

/// Handle of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Timer capability the session schedules against
///
/// Expirations are delivered back to the session as `on_timer(id)` by the
/// same event loop that delivers transport events. A cancelled timer must
/// not fire afterwards; an expiration already in flight is ignored by the
/// session because the id no longer matches.
pub trait TimerService: Send {
    /// Fire once after `delay`
    fn schedule_once(&mut self, delay: Duration) -> TimerId;

    /// Fire every `period`, first after one full period
    fn schedule_periodic(&mut self, period: Duration) -> TimerId;

    /// Cancel a timer; unknown ids are ignored
    fn cancel(&mut self, id: TimerId);
}
