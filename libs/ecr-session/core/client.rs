use crate::core::driver::{DriverEvent, DriverHandle, SessionCommand};
use crate::core::message::{Operation, OutboundMessage};
use crate::core::state::{AtomicMetrics, Metrics, SessionState};
use crate::traits::*;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

struct ClientInner {
    events: mpsc::UnboundedSender<DriverEvent>,
    state: watch::Receiver<SessionState>,
    last_error: Arc<Mutex<Option<SessionError>>>,
    metrics: Arc<AtomicMetrics>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        debug!("Last client handle dropped, stopping session");
        let _ = self.events.send(DriverEvent::Command(SessionCommand::Shutdown));
    }
}

/// Handle to a running session
///
/// Cheap to clone; every clone talks to the same session. All operations
/// return as soon as the request is queued; outcomes are delivered through
/// the [`Callbacks`] passed with each operation. Dropping the last handle
/// closes the session.
#[derive(Clone)]
pub struct EcrClient {
    inner: Arc<ClientInner>,
}

impl EcrClient {
    pub(crate) fn from_driver(handle: DriverHandle) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                events: handle.events,
                state: handle.state,
                last_error: handle.last_error,
                metrics: handle.metrics,
            }),
        }
    }

    /// Queue any message
    pub fn send(&self, message: OutboundMessage, callbacks: Callbacks) -> Result<()> {
        self.command(SessionCommand::Send(message, callbacks))
    }

    /// Send an arbitrary op with an optional message body
    pub fn send_op(&self, op: &str, message: Option<String>, callbacks: Callbacks) -> Result<()> {
        self.send(OutboundMessage::new(Operation::from_name(op), message), callbacks)
    }

    /// Ask the terminal to start a payment; `payload` is the serialized
    /// transaction request
    pub fn start_transaction(
        &self,
        payload: impl Into<String>,
        transaction_id: impl Into<String>,
        callbacks: Callbacks,
    ) -> Result<()> {
        self.send(OutboundMessage::start_transaction(payload, transaction_id), callbacks)
    }

    pub fn cancel_transaction(&self, transaction_id: impl Into<String>, callbacks: Callbacks) -> Result<()> {
        self.send(OutboundMessage::cancel_transaction(transaction_id), callbacks)
    }

    /// Broadcast to a device group; the session closes once the service
    /// acknowledges delivery
    pub fn notify_group(
        &self,
        message: impl Into<String>,
        group: impl Into<String>,
        callbacks: Callbacks,
    ) -> Result<()> {
        self.send(OutboundMessage::notify_group(message, group), callbacks)
    }

    /// Notify a single device by identifier
    pub fn notify(
        &self,
        message: impl Into<String>,
        identifier: impl Into<String>,
        callbacks: Callbacks,
    ) -> Result<()> {
        self.send(OutboundMessage::notify(message, identifier), callbacks)
    }

    /// Close the current conversation; a later send starts a new one
    pub fn close(&self) -> Result<()> {
        self.command(SessionCommand::Close)
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.clone()
    }

    /// Most recent error surfaced to callbacks
    pub fn last_error(&self) -> Option<SessionError> {
        self.inner.last_error.lock().clone()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Wait until the session reaches `Closed`
    pub async fn wait_closed(&self) -> Result<()> {
        let mut state = self.inner.state.clone();
        state
            .wait_for(|state| state.is_closed())
            .await
            .map_err(|_| EcrError::DriverStopped)?;
        Ok(())
    }

    fn command(&self, command: SessionCommand) -> Result<()> {
        self.inner
            .events
            .send(DriverEvent::Command(command))
            .map_err(|_| EcrError::DriverStopped)
    }
}

impl std::fmt::Debug for EcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcrClient")
            .field("state", &self.state())
            .field("metrics", &self.metrics())
            .finish()
    }
}
