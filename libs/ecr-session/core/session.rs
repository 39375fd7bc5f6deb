//! Session state machine
//!
//! Owns the lifecycle of one logical conversation and coordinates the
//! pending queue, ack tracker and keepalive monitor. Every input is a method
//! call (`send`, `close`, `on_open`, `on_frame`, `on_pong`,
//! `on_transport_error`, `on_connect_failed`, `on_closed`, `on_timer`) made
//! by a single event loop, so no two handlers ever run concurrently.
//!
//! ```text
//!  send() ──> Idle ──> Connecting ──on_open──> Authenticating ──handshake──> Active
//!                                                                 │    ▲        │
//!                                                    unexpected close  │  on_open │ reply / ack / error
//!                                                                 ▼    │        ▼
//!                                                            Reconnecting    Closing ──on_closed──> Closed
//! ```

use crate::core::ack_tracker::AckTracker;
use crate::core::config::SessionConfig;
use crate::core::credentials::Credentials;
use crate::core::keepalive::{KeepaliveMonitor, Probe};
use crate::core::message::{
    ack_frame, InboundData, InboundEnvelope, OutboundMessage, OP_ACK, OP_COMPLETE_TRANSACTION,
};
use crate::core::pending::PendingQueue;
use crate::core::state::{AtomicMetrics, SessionEvent, SessionState};
use crate::traits::*;
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An operation whose callbacks are still live
struct Outstanding {
    seq: u64,
    transaction_id: Option<String>,
    expects_response: bool,
    callbacks: Callbacks,
}

/// Where an inbound reply goes
enum Route<'a> {
    Operation(usize),
    /// Carries a transaction id no live operation owns
    Foreign(&'a str),
    Nobody,
}

/// The connection/session state machine
///
/// # Type Parameters
/// - `T`: transport opening the links
/// - `S`: timer service for keepalive, retransmission and backoff
pub struct Session<T, S>
where
    T: Transport,
    S: TimerService,
{
    config: SessionConfig,
    credentials: Credentials,
    transport: T,
    timers: S,
    state: SessionState,
    /// At most one link exists at any time
    link: Option<T::Link>,
    pending: PendingQueue,
    ack: AckTracker,
    keepalive: KeepaliveMonitor,
    reconnect_enabled: bool,
    reconnect_attempt: usize,
    reconnect_timer: Option<TimerId>,
    /// A close-after-ack was acknowledged while replies were still due
    close_after_ack_pending: bool,
    outstanding: VecDeque<Outstanding>,
    next_seq: u64,
    last_error: Option<SessionError>,
    events: Option<Sender<SessionEvent>>,
    metrics: Arc<AtomicMetrics>,
}

impl<T, S> Session<T, S>
where
    T: Transport,
    S: TimerService,
{
    pub fn new(config: SessionConfig, credentials: Credentials, transport: T, timers: S) -> Self {
        let ack = AckTracker::new(config.ack_retry_interval);
        let keepalive = KeepaliveMonitor::new(config.keepalive_interval);
        let reconnect_enabled = config.reconnect;

        Self {
            config,
            credentials,
            transport,
            timers,
            state: SessionState::Idle,
            link: None,
            pending: PendingQueue::new(),
            ack,
            keepalive,
            reconnect_enabled,
            reconnect_attempt: 0,
            reconnect_timer: None,
            close_after_ack_pending: false,
            outstanding: VecDeque::new(),
            next_seq: 1,
            last_error: None,
            events: None,
            metrics: Arc::new(AtomicMetrics::new()),
        }
    }

    /// Publish diagnostic events to `events`
    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the current link, used by the event loop to drop stale events
    #[inline]
    pub fn link_id(&self) -> Option<LinkId> {
        self.link.as_ref().map(Link::id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Operations whose callbacks may still fire
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_reconnect_enabled(&self) -> bool {
        self.reconnect_enabled
    }

    pub fn is_keepalive_running(&self) -> bool {
        self.keepalive.is_running()
    }

    /// Uuid of the frame awaiting acknowledgment
    pub fn awaiting_ack(&self) -> Option<&str> {
        self.ack.tracked_uuid()
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn metrics(&self) -> Arc<AtomicMetrics> {
        Arc::clone(&self.metrics)
    }

    // ------------------------------------------------------------------
    // Caller operations
    // ------------------------------------------------------------------

    /// Queue a message and make sure a connection is on its way
    ///
    /// Returns immediately; results arrive through `callbacks`.
    pub fn send(&mut self, message: OutboundMessage, mut callbacks: Callbacks) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.state == SessionState::Active {
            // Connect callbacks belong to the operations that opened the connection
            callbacks.on_connect = None;
        }

        debug!(op = message.operation().as_str(), seq, state = %self.state, "Queued message");
        self.outstanding.push_back(Outstanding {
            seq,
            transaction_id: message.transaction_id().map(str::to_string),
            expects_response: !message.needs_delivery_ack(),
            callbacks,
        });
        self.pending.enqueue(seq, message);

        match self.state {
            SessionState::Idle | SessionState::Closed => self.start_connect(),
            SessionState::Active => self.flush(),
            _ => {}
        }
    }

    /// Cancel every timer, close the link, drop queued work and enter `Closed`
    ///
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed && self.link.is_none() {
            debug!("Session already closed");
            return;
        }

        info!("Closing session");
        self.reconnect_enabled = false;
        self.cancel_timers();
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.pending.clear();
        self.outstanding.clear();
        self.close_after_ack_pending = false;
        self.enter_closed();
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    /// The transport finished connecting
    pub fn on_open(&mut self) {
        if !matches!(self.state, SessionState::Connecting | SessionState::Reconnecting) {
            debug!(state = %self.state, "Ignoring open event");
            return;
        }
        if self.link.is_none() {
            warn!("Open event without a link");
            return;
        }

        info!(endpoint = %self.config.endpoint, "Transport open, awaiting handshake");
        self.state = SessionState::Authenticating;
        self.keepalive.start(&mut self.timers);
        self.emit(SessionEvent::Authenticating);

        if !self.config.require_handshake {
            self.activate();
        }
    }

    /// The transport could not connect
    pub fn on_connect_failed(&mut self, reason: &str) {
        if self.link.take().is_none() {
            debug!(reason, "Connect failure for a discarded link");
            return;
        }

        match self.state {
            SessionState::Reconnecting if self.reconnect_enabled => {
                warn!(attempt = self.reconnect_attempt, reason, "Reconnect attempt failed");
                self.schedule_reconnect();
            }
            SessionState::Connecting | SessionState::Reconnecting => {
                self.report_error(SessionError::TransportConnectFailure(reason.to_string()));
            }
            SessionState::Closing => self.finalize_close(),
            state => debug!(%state, reason, "Ignoring connect failure"),
        }
    }

    /// A text frame arrived
    pub fn on_frame(&mut self, text: &str) {
        self.metrics.increment_received();

        if !self.state.is_open() {
            debug!(state = %self.state, "Dropping frame received while not open");
            return;
        }

        let envelope = match InboundEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Unparseable frame");
                self.report_error(SessionError::MalformedMessage {
                    detail: e.to_string(),
                });
                return;
            }
        };

        if let Some(remote) = envelope.error {
            self.report_error(SessionError::RemoteError {
                code: remote.code,
                message: remote.message,
            });
            return;
        }

        let Some(data) = envelope.data else {
            debug!("Frame without data member");
            return;
        };

        if data.is_op(&self.config.handshake_op) {
            if self.state == SessionState::Authenticating {
                self.activate();
            } else {
                debug!("Duplicate handshake confirmation");
            }
            return;
        }

        if data.is_op(OP_ACK) {
            self.handle_ack(&data.message_text());
            return;
        }

        if let Some(uuid) = data.uuid.as_deref() {
            self.send_ack(uuid);
            if !self.state.is_open() {
                return;
            }
        }

        self.deliver_response(&data);
    }

    /// The peer answered a liveness probe
    pub fn on_pong(&mut self) {
        debug!("Liveness response received");
        self.keepalive.record_pong();
    }

    /// The open connection failed
    pub fn on_transport_error(&mut self, reason: &str) {
        if self.link.is_none() || matches!(self.state, SessionState::Closing | SessionState::Closed) {
            debug!(reason, "Ignoring transport error after close");
            return;
        }
        self.report_error(SessionError::TransportRuntimeError(reason.to_string()));
    }

    /// The current link closed
    pub fn on_closed(&mut self) {
        if self.link.is_none() {
            debug!("Close event for a discarded link");
            return;
        }

        match self.state {
            SessionState::Closing | SessionState::Closed => self.finalize_close(),
            SessionState::Connecting | SessionState::Reconnecting => {
                self.on_connect_failed("connection closed before it opened");
            }
            SessionState::Authenticating | SessionState::Active => {
                warn!("Connection closed unexpectedly");
                self.link = None;
                self.handle_connection_lost();
            }
            SessionState::Idle => self.link = None,
        }
    }

    /// A timer scheduled by this session expired
    pub fn on_timer(&mut self, id: TimerId) {
        if self.keepalive.owns_timer(id) {
            self.keepalive_tick();
        } else if self.ack.owns_timer(id) {
            self.retransmit();
        } else if self.reconnect_timer == Some(id) {
            self.reconnect_timer = None;
            self.reconnect_now();
        } else {
            debug!(%id, "Ignoring stale timer");
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn start_connect(&mut self) {
        if self.link.is_some() {
            warn!("Connect requested while a link is live");
            return;
        }

        // An error reported earlier keeps auto-reconnect off for good
        self.reconnect_enabled = self.config.reconnect && self.last_error.is_none();
        self.reconnect_attempt = 0;
        self.close_after_ack_pending = false;
        self.state = SessionState::Connecting;
        info!(endpoint = %self.config.endpoint, "Connecting");
        self.emit(SessionEvent::Connecting { attempt: 0 });
        self.open_link(0);
    }

    fn open_link(&mut self, attempt: usize) {
        let request = ConnectRequest {
            url: self.config.endpoint.clone(),
            attempt,
        };
        self.link = Some(self.transport.connect(request));
    }

    fn activate(&mut self) {
        self.state = SessionState::Active;
        self.reconnect_attempt = 0;
        self.config.reconnect_strategy.reset();
        info!("Session active");
        self.emit(SessionEvent::Active);

        for op in self.outstanding.iter_mut() {
            op.callbacks.fire_connect();
        }

        let resumed = match self.link.as_mut() {
            Some(link) => self.ack.resume(link, &mut self.timers),
            None => Ok(false),
        };
        match resumed {
            Ok(true) => self.metrics.increment_sent(),
            Ok(false) => {}
            Err(e) => {
                self.report_error(SessionError::TransportRuntimeError(e.to_string()));
                return;
            }
        }

        self.flush();
    }

    fn flush(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let result = self.pending.flush(link, &mut self.ack, &mut self.timers);
        match result {
            Ok(report) => {
                self.metrics.add_sent(report.sent as u64);
                if report.sent > 0 {
                    debug!(
                        sent = report.sent,
                        close_after_ack = report.close_after_ack,
                        still_queued = self.pending.len(),
                        "Flushed pending queue"
                    );
                }
            }
            Err(e) => self.report_error(SessionError::TransportRuntimeError(e.to_string())),
        }
    }

    fn handle_ack(&mut self, uuid: &str) {
        let Some(acked) = self.ack.acknowledge(uuid, &mut self.timers) else {
            return;
        };

        info!(uuid = %acked.uuid, "Delivery acknowledged");
        self.emit(SessionEvent::Acknowledged {
            uuid: acked.uuid.clone(),
        });
        self.outstanding.retain(|op| op.seq != acked.seq);

        if acked.close_after_ack {
            self.close_after_ack_pending = true;
        }
        if !self.close_if_delivered() {
            self.flush();
        }
    }

    /// Close once an acknowledged close-after-ack has nothing left to wait for
    fn close_if_delivered(&mut self) -> bool {
        if !self.close_after_ack_pending || self.has_outstanding_work() {
            return false;
        }
        debug!("Delivery confirmed and no replies outstanding");
        self.begin_close();
        true
    }

    fn has_outstanding_work(&self) -> bool {
        !self.pending.is_empty() || self.has_awaiting_reply()
    }

    fn send_ack(&mut self, uuid: &str) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        debug!(uuid, "Acknowledging peer frame");
        let result = link.send(ack_frame(uuid));
        match result {
            Ok(()) => self.metrics.increment_sent(),
            Err(e) => self.report_error(SessionError::TransportRuntimeError(e.to_string())),
        }
    }

    fn deliver_response(&mut self, data: &InboundData) {
        let op = data.op.as_deref();
        let index = match self.route(data.transaction_id.as_deref()) {
            Route::Operation(index) => index,
            Route::Foreign(transaction_id) if self.has_awaiting_reply() => {
                warn!(op, transaction_id, "Dropping reply for an unknown transaction");
                return;
            }
            Route::Foreign(_) | Route::Nobody => {
                debug!(op, "Reply with no outstanding operation");
                self.begin_close();
                return;
            }
        };

        let message = data.message_text();
        let entry = &mut self.outstanding[index];
        let disposition = match entry.callbacks.on_response.as_mut() {
            Some(on_response) => on_response(&message, op),
            None => Disposition::Close,
        };

        if disposition == Disposition::Close || op == Some(OP_COMPLETE_TRANSACTION) {
            self.outstanding.remove(index);
        }
        if disposition == Disposition::Close {
            self.begin_close();
        } else {
            self.close_if_delivered();
        }
    }

    fn has_awaiting_reply(&self) -> bool {
        self.outstanding.iter().any(|op| op.expects_response)
    }

    /// Pick the operation a reply belongs to
    ///
    /// A reply carrying a transaction id only ever reaches the operation with
    /// that id. Replies without one go to the oldest operation awaiting a
    /// reply.
    fn route<'a>(&self, transaction_id: Option<&'a str>) -> Route<'a> {
        let position = match transaction_id {
            Some(transaction_id) => {
                let matched = self.outstanding.iter().position(|op| {
                    op.expects_response && op.transaction_id.as_deref() == Some(transaction_id)
                });
                match matched {
                    Some(index) => Some(index),
                    None => return Route::Foreign(transaction_id),
                }
            }
            None => self.outstanding.iter().position(|op| op.expects_response),
        };
        position.map_or(Route::Nobody, Route::Operation)
    }

    fn keepalive_tick(&mut self) {
        match self.keepalive.tick() {
            Probe::SendPing => {
                let Some(link) = self.link.as_mut() else {
                    return;
                };
                debug!("Sending liveness probe");
                let result = link.send_ping();
                if let Err(e) = result {
                    self.report_error(SessionError::TransportRuntimeError(e.to_string()));
                }
            }
            Probe::PeerSilent => {
                if self.reconnect_enabled {
                    warn!("Liveness probe unanswered, dropping connection");
                    self.emit(SessionEvent::PeerSilent);
                    // Gone before the replacement link is opened
                    if let Some(mut link) = self.link.take() {
                        link.abort();
                    }
                    self.handle_connection_lost();
                } else {
                    self.report_error(SessionError::PeerSilent);
                }
            }
        }
    }

    fn retransmit(&mut self) {
        if !self.state.is_open() {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let result = self.ack.retransmit(link);
        match result {
            Ok(Some(uuid)) => {
                self.metrics.increment_sent();
                self.metrics.increment_retransmits();
                self.emit(SessionEvent::Retransmit { uuid });
            }
            Ok(None) => {}
            Err(e) => self.report_error(SessionError::TransportRuntimeError(e.to_string())),
        }
    }

    /// The link is gone without a close request
    fn handle_connection_lost(&mut self) {
        self.keepalive.stop(&mut self.timers);
        if self.reconnect_enabled {
            self.ack.suspend(&mut self.timers);
            self.schedule_reconnect();
        } else {
            self.begin_close();
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.config.require_credentials_on_reconnect && !self.credentials.has_identity() {
            warn!("Reconnect requires identifier and token, closing instead");
            self.begin_close();
            return;
        }

        match self.config.reconnect_strategy.next_delay(self.reconnect_attempt) {
            Some(delay) => {
                let delay = self.config.reconnection_delay_offset + delay;
                self.reconnect_attempt += 1;
                self.state = SessionState::Reconnecting;
                self.metrics.increment_reconnects();
                info!(attempt = self.reconnect_attempt, ?delay, "Reconnecting after backoff");
                self.emit(SessionEvent::Reconnecting {
                    attempt: self.reconnect_attempt,
                    delay,
                });
                self.reconnect_timer = Some(self.timers.schedule_once(delay));
            }
            None => {
                warn!(attempts = self.reconnect_attempt, "Reconnection strategy exhausted");
                self.report_error(SessionError::TransportConnectFailure(format!(
                    "reconnection failed after {} attempts",
                    self.reconnect_attempt
                )));
            }
        }
    }

    fn reconnect_now(&mut self) {
        if self.state != SessionState::Reconnecting || self.link.is_some() {
            return;
        }
        info!(attempt = self.reconnect_attempt, "Reconnect attempt");
        self.emit(SessionEvent::Connecting {
            attempt: self.reconnect_attempt,
        });
        self.open_link(self.reconnect_attempt);
    }

    /// Surface an error to every live operation and apply the close policy
    ///
    /// Reconnection stays disabled afterwards. Transport failures always
    /// close; otherwise a missing handler or any handler answering `Close`
    /// closes.
    fn report_error(&mut self, err: SessionError) {
        let code = err.code();
        let message = err.to_string();
        error!(code, %message, "Session error");

        self.reconnect_enabled = false;
        self.last_error = Some(err.clone());
        self.emit(SessionEvent::Error {
            code,
            message: message.clone(),
        });

        let mut close = err.is_terminal() || self.outstanding.is_empty();
        for op in self.outstanding.iter_mut() {
            match op.callbacks.on_error.as_mut() {
                Some(on_error) => {
                    if on_error(code, &message) == Disposition::Close {
                        close = true;
                    }
                }
                None => close = true,
            }
        }

        if close {
            self.begin_close();
        }
    }

    /// Drop queued work and drain the link before closing
    fn begin_close(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }

        self.cancel_timers();
        self.pending.clear();
        self.outstanding.clear();
        self.close_after_ack_pending = false;

        match self.link.as_mut() {
            Some(link) => {
                info!("Draining transport before close");
                link.close();
                self.state = SessionState::Closing;
            }
            None => self.finalize_close(),
        }
    }

    fn finalize_close(&mut self) {
        self.cancel_timers();
        self.link = None;
        self.enter_closed();

        // Sent while draining: start a fresh conversation
        if !self.pending.is_empty() {
            info!(queued = self.pending.len(), "Messages queued while closing, reconnecting");
            self.start_connect();
        }
    }

    fn enter_closed(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closed;
            info!("Session closed");
            self.emit(SessionEvent::Closed);
        }
    }

    fn cancel_timers(&mut self) {
        self.keepalive.stop(&mut self.timers);
        self.ack.reset(&mut self.timers);
        if let Some(timer) = self.reconnect_timer.take() {
            self.timers.cancel(timer);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
