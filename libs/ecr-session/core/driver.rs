//! Tokio driver for the session state machine
//!
//! One task owns the [`Session`] and consumes a single unbounded event queue.
//! Caller commands, link events and timer expirations all arrive on it, so
//! the session sees one event at a time in delivery order.
//!
//! Each link is its own task holding the split WebSocket stream. The session
//! talks to it through a command channel; the channel is FIFO, so frames
//! queued before a close command are written before the close frame.

use crate::core::message::OutboundMessage;
use crate::core::session::Session;
use crate::core::state::{AtomicMetrics, SessionState};
use crate::traits::*;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake once a link is asked to close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests from client handles
#[derive(Debug)]
pub enum SessionCommand {
    Send(OutboundMessage, Callbacks),
    Close,
    /// Close and stop the driver task
    Shutdown,
}

/// What happened on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    ConnectFailed(String),
    Frame(String),
    Pong,
    Error(String),
    Closed,
}

/// Everything the driver loop reacts to
#[derive(Debug)]
pub enum DriverEvent {
    Command(SessionCommand),
    Link { link: LinkId, event: LinkEvent },
    Timer(TimerId),
}

#[derive(Debug)]
enum LinkCommand {
    Frame(String),
    Ping,
    Close,
}

// ----------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------

/// WebSocket transport over tokio-tungstenite
pub struct WsTransport {
    headers: Arc<dyn HeaderProvider>,
    events: mpsc::UnboundedSender<DriverEvent>,
    next_id: LinkId,
}

impl WsTransport {
    pub fn new(headers: Arc<dyn HeaderProvider>, events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self {
            headers,
            events,
            next_id: 0,
        }
    }
}

impl Transport for WsTransport {
    type Link = WsLink;

    fn connect(&mut self, request: ConnectRequest) -> WsLink {
        self.next_id += 1;
        let id = self.next_id;
        let (commands, command_rx) = mpsc::unbounded_channel();

        debug!(link = id, url = %request.url, attempt = request.attempt, "Opening link");
        let task = tokio::spawn(run_link(
            id,
            request.url,
            Arc::clone(&self.headers),
            command_rx,
            self.events.clone(),
        ));

        WsLink { id, commands, task }
    }
}

/// Handle to one link task
#[derive(Debug)]
pub struct WsLink {
    id: LinkId,
    commands: mpsc::UnboundedSender<LinkCommand>,
    task: JoinHandle<()>,
}

impl Link for WsLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn send(&mut self, frame: String) -> Result<()> {
        self.commands
            .send(LinkCommand::Frame(frame))
            .map_err(|e| EcrError::ChannelSend(e.to_string()))
    }

    fn send_ping(&mut self) -> Result<()> {
        self.commands
            .send(LinkCommand::Ping)
            .map_err(|e| EcrError::ChannelSend(e.to_string()))
    }

    fn close(&mut self) {
        let _ = self.commands.send(LinkCommand::Close);
    }

    fn abort(&mut self) {
        // Dropping the task drops the socket
        self.task.abort();
    }
}

async fn open_stream(url: &str, headers: &dyn HeaderProvider) -> Result<WsStream> {
    let mut request = url
        .into_client_request()
        .map_err(|e| EcrError::WebSocket(e.to_string()))?;

    for (key, value) in headers.get_headers().await {
        match key.parse::<http::header::HeaderName>() {
            Ok(name) => match value.parse::<http::header::HeaderValue>() {
                Ok(value) => {
                    request.headers_mut().insert(name, value);
                }
                Err(_) => warn!("Invalid header value for key '{}'", key),
            },
            Err(_) => warn!("Invalid header name: {}", key),
        }
    }

    let (stream, response) = connect_async(request)
        .await
        .map_err(|e| EcrError::WebSocket(e.to_string()))?;
    debug!(status = %response.status(), "WebSocket upgrade complete");
    Ok(stream)
}

async fn run_link(
    id: LinkId,
    url: String,
    headers: Arc<dyn HeaderProvider>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<DriverEvent>,
) {
    let emit = |event: LinkEvent| {
        let _ = events.send(DriverEvent::Link { link: id, event });
    };

    let stream = match open_stream(&url, headers.as_ref()).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(link = id, error = %e, "Connect failed");
            emit(LinkEvent::ConnectFailed(e.to_string()));
            return;
        }
    };

    info!(link = id, "Connected to {}", url);
    emit(LinkEvent::Opened);

    let (mut write, mut read) = stream.split();
    let mut ping_seq: u64 = 0;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => emit(LinkEvent::Frame(text)),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => emit(LinkEvent::Frame(text)),
                        Err(_) => warn!(link = id, "Dropping non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Pong(_))) => emit(LinkEvent::Pong),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(link = id, ?frame, "Peer closed the connection");
                        break;
                    }
                    // Pings are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(link = id, "WebSocket error: {}", e);
                        emit(LinkEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        debug!(link = id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(LinkCommand::Frame(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            emit(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(LinkCommand::Ping) => {
                        ping_seq += 1;
                        let payload = ping_seq.to_be_bytes().to_vec();
                        if let Err(e) = write.send(Message::Ping(payload)).await {
                            emit(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(LinkCommand::Close) | None => {
                        debug!(link = id, "Closing link");
                        if tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await.is_err() {
                            warn!(link = id, "Close handshake timed out");
                        }
                        break;
                    }
                }
            }
        }
    }

    emit(LinkEvent::Closed);
}

// ----------------------------------------------------------------------
// Timers
// ----------------------------------------------------------------------

/// Timer service backed by tokio tasks
///
/// Expirations are posted to the driver queue as [`DriverEvent::Timer`].
/// Ids are never reused, so an expiry that races a cancel is recognisably
/// stale.
pub struct TokioTimers {
    events: mpsc::UnboundedSender<DriverEvent>,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioTimers {
    pub fn new(events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self {
            events,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }

    /// Number of timers that have not finished or been cancelled
    pub fn active(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }

    fn register(&mut self, task: impl FnOnce(TimerId) -> JoinHandle<()>) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.tasks.retain(|_, task| !task.is_finished());
        self.tasks.insert(id, task(id));
        id
    }
}

impl TimerService for TokioTimers {
    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        let events = self.events.clone();
        self.register(move |id| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(DriverEvent::Timer(id));
            })
        })
    }

    fn schedule_periodic(&mut self, period: Duration) -> TimerId {
        let events = self.events.clone();
        self.register(move |id| {
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if events.send(DriverEvent::Timer(id)).is_err() {
                        break;
                    }
                }
            })
        })
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------
// Event loop
// ----------------------------------------------------------------------

/// Shared views of the session published after every event
pub(crate) struct DriverHandle {
    pub(crate) events: mpsc::UnboundedSender<DriverEvent>,
    pub(crate) state: watch::Receiver<SessionState>,
    pub(crate) last_error: Arc<Mutex<Option<SessionError>>>,
    pub(crate) metrics: Arc<AtomicMetrics>,
}

/// Spawn the driver task for a WebSocket session
pub(crate) fn spawn(
    build: impl FnOnce(WsTransport, TokioTimers) -> Session<WsTransport, TokioTimers>,
    headers: Arc<dyn HeaderProvider>,
) -> DriverHandle {
    let (events, event_rx) = mpsc::unbounded_channel();
    let transport = WsTransport::new(headers, events.clone());
    let timers = TokioTimers::new(events.clone());
    let session = build(transport, timers);

    let (state_tx, state) = watch::channel(session.state());
    let last_error = Arc::new(Mutex::new(None));
    let metrics = session.metrics();

    tokio::spawn(run_session(session, event_rx, state_tx, Arc::clone(&last_error)));

    DriverHandle {
        events,
        state,
        last_error,
        metrics,
    }
}

/// Feed queued events to the session until shutdown
pub async fn run_session<T, S>(
    mut session: Session<T, S>,
    mut events: mpsc::UnboundedReceiver<DriverEvent>,
    state_tx: watch::Sender<SessionState>,
    last_error: Arc<Mutex<Option<SessionError>>>,
) where
    T: Transport,
    S: TimerService,
{
    while let Some(event) = events.recv().await {
        let shutdown = matches!(event, DriverEvent::Command(SessionCommand::Shutdown));
        dispatch(&mut session, event);
        publish(&session, &state_tx, &last_error);
        if shutdown {
            break;
        }
    }

    info!("Session driver exiting");
}

fn dispatch<T: Transport, S: TimerService>(session: &mut Session<T, S>, event: DriverEvent) {
    match event {
        DriverEvent::Command(SessionCommand::Send(message, callbacks)) => session.send(message, callbacks),
        DriverEvent::Command(SessionCommand::Close) | DriverEvent::Command(SessionCommand::Shutdown) => {
            session.close()
        }
        DriverEvent::Link { link, event } => {
            if session.link_id() != Some(link) {
                debug!(link, ?event, "Dropping event from a stale link");
                return;
            }
            match event {
                LinkEvent::Opened => session.on_open(),
                LinkEvent::ConnectFailed(reason) => session.on_connect_failed(&reason),
                LinkEvent::Frame(text) => session.on_frame(&text),
                LinkEvent::Pong => session.on_pong(),
                LinkEvent::Error(reason) => session.on_transport_error(&reason),
                LinkEvent::Closed => session.on_closed(),
            }
        }
        DriverEvent::Timer(id) => session.on_timer(id),
    }
}

fn publish<T: Transport, S: TimerService>(
    session: &Session<T, S>,
    state_tx: &watch::Sender<SessionState>,
    last_error: &Mutex<Option<SessionError>>,
) {
    *last_error.lock() = session.last_error().cloned();

    let state = session.state();
    state_tx.send_if_modified(|current| {
        if *current == state {
            return false;
        }
        *current = state;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_once_timer_fires_and_cancel_suppresses() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(events);

        let fired = timers.schedule_once(Duration::from_millis(100));
        let cancelled = timers.schedule_once(Duration::from_millis(100));
        timers.cancel(cancelled);

        tokio::time::sleep(Duration::from_millis(150)).await;
        match rx.try_recv() {
            Ok(DriverEvent::Timer(id)) => assert_eq!(id, fired),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_timer_repeats() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(events);
        let id = timers.schedule_periodic(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;
        let mut ticks = 0;
        while let Ok(DriverEvent::Timer(tick)) = rx.try_recv() {
            assert_eq!(tick, id);
            ticks += 1;
        }
        assert_eq!(ticks, 3);

        timers.cancel(id);
        assert_eq!(timers.active(), 0);
    }

    #[tokio::test]
    async fn test_abort_drops_socket_without_close_event() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Ends without a close frame once the client side is dropped
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) => return false,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => return true,
                }
            }
        });

        let (events, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsTransport::new(Arc::new(NoHeaders), events);
        let mut link = transport.connect(ConnectRequest { url, attempt: 0 });

        let opened = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(
            opened,
            Some(DriverEvent::Link { event: LinkEvent::Opened, .. })
        ));

        link.abort();
        let dropped = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(dropped);
        assert!(rx.try_recv().is_err());
    }
}
