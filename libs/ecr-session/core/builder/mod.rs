pub mod states;

use crate::core::client::EcrClient;
use crate::core::config::SessionConfig;
use crate::core::credentials::Credentials;
use crate::core::driver;
use crate::core::session::Session;
use crate::core::state::SessionEvent;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Type-state builder for [`EcrClient`]
///
/// The API key is the only required input; everything else has a default
/// (production endpoint, 1s keepalive and ack retry, 10s fixed reconnect
/// delay).
pub struct SessionBuilder<C>
where
    C: CredentialState,
{
    _state: TypeState<C>,
    config: SessionConfig,
    credentials: Option<Credentials>,
    headers: Option<Arc<dyn HeaderProvider>>,
    events: Option<crossbeam_channel::Sender<SessionEvent>>,
}

impl SessionBuilder<NoCredentials> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: SessionConfig::default(),
            credentials: None,
            headers: None,
            events: None,
        }
    }

    pub fn credentials(self, credentials: Credentials) -> SessionBuilder<HasCredentials> {
        SessionBuilder {
            _state: TypeState::new(),
            config: self.config,
            credentials: Some(credentials),
            headers: self.headers,
            events: self.events,
        }
    }

    /// Shorthand for anonymous credentials carrying only the API key
    pub fn api_key(self, api_key: impl Into<String>) -> SessionBuilder<HasCredentials> {
        self.credentials(Credentials::new(api_key))
    }
}

impl Default for SessionBuilder<NoCredentials> {
    fn default() -> Self {
        Self::new()
    }
}

// Optional configuration methods
impl<C> SessionBuilder<C>
where
    C: CredentialState,
{
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config = self.config.with_endpoint(endpoint);
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_keepalive_interval(interval);
        self
    }

    pub fn ack_retry_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_ack_retry_interval(interval);
        self
    }

    /// Enable or disable automatic reconnection after an unexpected drop
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config = self.config.with_reconnect(enabled);
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.config = self.config.with_reconnect_strategy(strategy);
        self
    }

    /// Extra delay added on top of the strategy delay before each reconnect
    pub fn reconnection_delay_offset(mut self, offset: Duration) -> Self {
        self.config = self.config.with_reconnection_delay_offset(offset);
        self
    }

    pub fn handshake_op(mut self, op: impl Into<String>) -> Self {
        self.config = self.config.with_handshake_op(op);
        self
    }

    /// Treat the session as active as soon as the transport opens
    pub fn skip_handshake(mut self) -> Self {
        self.config = self.config.with_require_handshake(false);
        self
    }

    /// Refuse to reconnect unless an identifier and token are configured
    pub fn require_credentials_on_reconnect(mut self, require: bool) -> Self {
        self.config = self.config.with_require_credentials_on_reconnect(require);
        self
    }

    /// Replace the credential-derived upgrade headers
    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    /// Publish lifecycle events to `sender`
    pub fn events(mut self, sender: crossbeam_channel::Sender<SessionEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

// Build methods - only available once credentials are set
impl SessionBuilder<HasCredentials> {
    /// Attach a device identity used for the bearer header
    pub fn identity(mut self, identifier: impl Into<String>, token: impl Into<String>) -> Self {
        self.credentials = self
            .credentials
            .map(|credentials| credentials.with_identity(identifier, token));
        self
    }

    /// Build a bare state machine over caller-supplied capabilities
    pub fn build_session<T, S>(self, transport: T, timers: S) -> Result<Session<T, S>>
    where
        T: Transport,
        S: TimerService,
    {
        self.config.validate()?;
        let credentials = self
            .credentials
            .ok_or_else(|| EcrError::Configuration("credentials must be set".into()))?;

        let session = Session::new(self.config, credentials, transport, timers);
        Ok(match self.events {
            Some(events) => session.with_events(events),
            None => session,
        })
    }

    /// Spawn the session on the current tokio runtime
    pub fn build(self) -> Result<EcrClient> {
        self.config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|_| {
            EcrError::Configuration("SessionBuilder::build must be called within a tokio runtime".into())
        })?;

        let credentials = self
            .credentials
            .ok_or_else(|| EcrError::Configuration("credentials must be set".into()))?;
        let headers = self
            .headers
            .unwrap_or_else(|| Arc::new(CredentialHeaders::new(credentials.clone())));
        let config = self.config;
        let events = self.events;

        info!(endpoint = %config.endpoint(), identity = credentials.has_identity(), "Starting session driver");

        let handle = driver::spawn(
            move |transport, timers| {
                let session = Session::new(config, credentials, transport, timers);
                match events {
                    Some(events) => session.with_events(events),
                    None => session,
                }
            },
            headers,
        );

        Ok(EcrClient::from_driver(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = SessionBuilder::new().api_key("key").build();
        assert!(matches!(result, Err(EcrError::Configuration(_))));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = SessionBuilder::new()
            .api_key("key")
            .endpoint("tcp://localhost:1")
            .build();
        assert!(matches!(result, Err(EcrError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_starts_idle() {
        let client = SessionBuilder::new()
            .api_key("key")
            .identity("POS1", "token")
            .endpoint("ws://127.0.0.1:9")
            .build()
            .unwrap();
        assert_eq!(client.state(), crate::core::state::SessionState::Idle);
    }
}
