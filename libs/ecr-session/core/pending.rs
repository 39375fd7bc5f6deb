//! FIFO of messages waiting for an active connection

use crate::core::ack_tracker::AckTracker;
use crate::core::message::OutboundMessage;
use crate::traits::{Link, Result, TimerService};
use std::collections::VecDeque;
use tracing::debug;

/// A message plus the session-local sequence number identifying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub seq: u64,
    pub message: OutboundMessage,
}

/// Result of one flush pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Frames handed to the link
    pub sent: usize,
    /// A notify-class message was flushed; the session closes once it is acked
    pub close_after_ack: bool,
    /// Stopped in front of an ack-bearing message while another is unacknowledged
    pub blocked: bool,
}

/// Ordered queue of not-yet-sent messages
#[derive(Debug, Default)]
pub struct PendingQueue {
    messages: VecDeque<QueuedMessage>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, seq: u64, message: OutboundMessage) {
        self.messages.push_back(QueuedMessage { seq, message });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.messages.iter()
    }

    /// Send queued messages in order until empty or blocked
    ///
    /// Notify-class messages get a fresh uuid here and are handed to the
    /// tracker. Only one ack-bearing message is in flight at a time; the
    /// queue stops in front of the next one. A message whose send fails is
    /// put back at the front.
    pub fn flush<L: Link, S: TimerService>(
        &mut self,
        link: &mut L,
        tracker: &mut AckTracker,
        timers: &mut S,
    ) -> Result<FlushReport> {
        let mut report = FlushReport::default();

        while let Some(front) = self.messages.front() {
            if front.message.needs_delivery_ack() && tracker.is_busy() {
                debug!(
                    queued = self.messages.len(),
                    "Flush paused until the in-flight frame is acknowledged"
                );
                report.blocked = true;
                break;
            }

            let Some(QueuedMessage { seq, message }) = self.messages.pop_front() else {
                break;
            };
            let message = message.prepare_for_flush();

            let frame = match message.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    self.messages.push_front(QueuedMessage { seq, message });
                    return Err(e.into());
                }
            };

            if let Err(e) = link.send(frame.clone()) {
                self.messages.push_front(QueuedMessage { seq, message });
                return Err(e);
            }
            debug!(op = message.operation().as_str(), seq, "Flushed message");

            if message.requires_ack() {
                if let Some(uuid) = message.correlation_id() {
                    let close_after_ack = message.operation().is_notify();
                    report.close_after_ack |= close_after_ack;
                    tracker.arm(seq, uuid, frame, close_after_ack, timers);
                }
            }
            report.sent += 1;
        }

        Ok(report)
    }
}
