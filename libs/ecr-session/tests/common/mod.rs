//! Common test utilities for ecr-session integration tests
//!
//! A recording transport, manually fired timers and a harness wrapping a
//! `Session` over both, so scenarios can be driven event by event.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver};
use ecr_session::core::config::SessionConfig;
use ecr_session::core::credentials::Credentials;
use ecr_session::core::session::Session;
use ecr_session::core::state::SessionEvent;
use ecr_session::traits::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const KEEPALIVE: Duration = Duration::from_secs(1);
pub const ACK_RETRY: Duration = Duration::from_millis(250);
pub const BACKOFF: Duration = Duration::from_secs(3);

/// Distinct periods so each timer kind can be fired on its own
pub fn test_config() -> SessionConfig {
    SessionConfig::default()
        .with_endpoint("wss://ecr.test")
        .with_keepalive_interval(KEEPALIVE)
        .with_ack_retry_interval(ACK_RETRY)
        .with_reconnect_strategy(FixedDelay::new(BACKOFF, None))
}

pub fn test_credentials() -> Credentials {
    Credentials::new("test-key").with_identity("POS1", "token-1")
}

// ----------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------

/// Everything the session asked the transport to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    Connect { link: LinkId, url: String, attempt: usize },
    Send { link: LinkId, frame: String },
    Ping { link: LinkId },
    Close { link: LinkId },
    Abort { link: LinkId },
}

#[derive(Clone, Default)]
pub struct WireLog(Arc<Mutex<Vec<Wire>>>);

impl WireLog {
    fn push(&self, wire: Wire) {
        self.0.lock().push(wire);
    }

    pub fn all(&self) -> Vec<Wire> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub struct MockTransport {
    log: WireLog,
    next_id: LinkId,
}

impl Transport for MockTransport {
    type Link = MockLink;

    fn connect(&mut self, request: ConnectRequest) -> MockLink {
        self.next_id += 1;
        self.log.push(Wire::Connect {
            link: self.next_id,
            url: request.url,
            attempt: request.attempt,
        });
        MockLink {
            id: self.next_id,
            log: self.log.clone(),
        }
    }
}

pub struct MockLink {
    id: LinkId,
    log: WireLog,
}

impl Link for MockLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn send(&mut self, frame: String) -> Result<()> {
        self.log.push(Wire::Send { link: self.id, frame });
        Ok(())
    }

    fn send_ping(&mut self) -> Result<()> {
        self.log.push(Wire::Ping { link: self.id });
        Ok(())
    }

    fn close(&mut self) {
        self.log.push(Wire::Close { link: self.id });
    }

    fn abort(&mut self) {
        self.log.push(Wire::Abort { link: self.id });
    }
}

// ----------------------------------------------------------------------
// Timers
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    period: Duration,
    periodic: bool,
}

#[derive(Default)]
struct TimerTable {
    next: u64,
    active: BTreeMap<TimerId, Scheduled>,
}

/// Timers that only fire when the test says so
#[derive(Clone, Default)]
pub struct ManualTimers(Arc<Mutex<TimerTable>>);

impl ManualTimers {
    fn schedule(&self, period: Duration, periodic: bool) -> TimerId {
        let mut table = self.0.lock();
        table.next += 1;
        let id = TimerId(table.next);
        table.active.insert(id, Scheduled { period, periodic });
        id
    }

    /// Active timers with the given period
    pub fn due(&self, period: Duration) -> Vec<TimerId> {
        self.0
            .lock()
            .active
            .iter()
            .filter(|(_, scheduled)| scheduled.period == period)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn active(&self) -> usize {
        self.0.lock().active.len()
    }

    /// Mark a timer as fired; returns false when it was cancelled meanwhile
    fn take(&self, id: TimerId) -> bool {
        let mut table = self.0.lock();
        match table.active.get(&id).copied() {
            Some(scheduled) => {
                if !scheduled.periodic {
                    table.active.remove(&id);
                }
                true
            }
            None => false,
        }
    }
}

impl TimerService for ManualTimers {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        self.schedule(delay, false)
    }

    fn schedule_periodic(&mut self, period: Duration) -> TimerId {
        self.schedule(period, true)
    }

    fn cancel(&mut self, id: TimerId) {
        self.0.lock().active.remove(&id);
    }
}

// ----------------------------------------------------------------------
// Callbacks
// ----------------------------------------------------------------------

/// Records every callback invocation of the operations it builds
#[derive(Clone, Default)]
pub struct Recorder {
    responses: Arc<Mutex<Vec<(String, Option<String>)>>>,
    errors: Arc<Mutex<Vec<(i64, String)>>>,
    connects: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn callbacks(&self, on_response: Disposition, on_error: Disposition) -> Callbacks {
        let responses = Arc::clone(&self.responses);
        let errors = Arc::clone(&self.errors);
        let connects = Arc::clone(&self.connects);

        Callbacks::new()
            .on_response(move |message, op| {
                responses.lock().push((message.to_string(), op.map(str::to_string)));
                on_response
            })
            .on_error(move |code, message| {
                errors.lock().push((code, message.to_string()));
                on_error
            })
            .on_connect(move || {
                connects.fetch_add(1, Ordering::SeqCst);
            })
    }

    pub fn responses(&self) -> Vec<(String, Option<String>)> {
        self.responses.lock().clone()
    }

    pub fn errors(&self) -> Vec<(i64, String)> {
        self.errors.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

pub struct Harness {
    pub session: Session<MockTransport, ManualTimers>,
    pub wire: WireLog,
    pub timers: ManualTimers,
    pub events: Receiver<SessionEvent>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_credentials(config, test_credentials())
    }

    pub fn with_credentials(config: SessionConfig, credentials: Credentials) -> Self {
        let wire = WireLog::default();
        let timers = ManualTimers::default();
        let (tx, events) = unbounded();

        let transport = MockTransport {
            log: wire.clone(),
            next_id: 0,
        };
        let session = Session::new(config, credentials, transport, timers.clone()).with_events(tx);

        Self {
            session,
            wire,
            timers,
            events,
        }
    }

    /// Transport reports open
    pub fn open(&mut self) {
        self.session.on_open();
    }

    pub fn handshake(&mut self) {
        self.feed(json!({"data": {"op": "connection_established"}}));
    }

    /// Open and confirm the handshake
    pub fn connect(&mut self) {
        self.open();
        self.handshake();
    }

    pub fn feed(&mut self, value: Value) {
        self.session.on_frame(&value.to_string());
    }

    pub fn feed_raw(&mut self, text: &str) {
        self.session.on_frame(text);
    }

    /// Fire every active timer with `period`; returns how many fired
    pub fn fire(&mut self, period: Duration) -> usize {
        let mut fired = 0;
        for id in self.timers.due(period) {
            if self.timers.take(id) {
                self.session.on_timer(id);
                fired += 1;
            }
        }
        fired
    }

    /// Every data frame sent, parsed
    pub fn sent(&self) -> Vec<Value> {
        self.wire
            .all()
            .into_iter()
            .filter_map(|wire| match wire {
                Wire::Send { frame, .. } => Some(serde_json::from_str(&frame).unwrap()),
                _ => None,
            })
            .collect()
    }

    /// Raw frames sent
    pub fn sent_raw(&self) -> Vec<String> {
        self.wire
            .all()
            .into_iter()
            .filter_map(|wire| match wire {
                Wire::Send { frame, .. } => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub fn sent_ops(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|frame| frame["data"]["op"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.count(|wire| matches!(wire, Wire::Connect { .. }))
    }

    pub fn pings(&self) -> usize {
        self.count(|wire| matches!(wire, Wire::Ping { .. }))
    }

    pub fn closes(&self) -> usize {
        self.count(|wire| matches!(wire, Wire::Close { .. }))
    }

    pub fn aborts(&self) -> usize {
        self.count(|wire| matches!(wire, Wire::Abort { .. }))
    }

    fn count(&self, pred: impl Fn(&Wire) -> bool) -> usize {
        self.wire.all().iter().filter(|wire| pred(wire)).count()
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }
}
