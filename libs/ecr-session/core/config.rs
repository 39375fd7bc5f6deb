use crate::core::message::OP_CONNECTION_ESTABLISHED;
use crate::traits::*;
use std::fmt;
use std::time::Duration;

/// Production endpoint of the remote transaction service
pub const DEFAULT_ENDPOINT: &str = "wss://connect.sobitecr.com";

/// Default liveness probe period
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Default retransmission period for unacknowledged frames
pub const DEFAULT_ACK_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default backoff before a reconnect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Configuration for a session
///
/// Built through [`SessionConfig::default`] and the `with_*` methods, or
/// through the session builder which forwards to them.
pub struct SessionConfig {
    /// WebSocket URL (wss:// or ws://)
    pub(crate) endpoint: String,

    /// Liveness probe period
    pub(crate) keepalive_interval: Duration,

    /// Retransmission period for the tracked ack-bearing frame
    pub(crate) ack_retry_interval: Duration,

    /// Whether an unexpected drop is followed by a reconnect
    pub(crate) reconnect: bool,

    /// Backoff policy consulted before each reconnect
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Delay added on top of the strategy delay
    pub(crate) reconnection_delay_offset: Duration,

    /// Op name of the handshake confirmation
    pub(crate) handshake_op: String,

    /// When false, the session is active as soon as the transport opens
    pub(crate) require_handshake: bool,

    /// Refuse to reconnect without identifier and token
    pub(crate) require_credentials_on_reconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            ack_retry_interval: DEFAULT_ACK_RETRY_INTERVAL,
            reconnect: true,
            reconnect_strategy: Box::new(FixedDelay::new(DEFAULT_RECONNECT_DELAY, None)),
            reconnection_delay_offset: Duration::ZERO,
            handshake_op: OP_CONNECTION_ESTABLISHED.to_string(),
            require_handshake: true,
            require_credentials_on_reconnect: false,
        }
    }
}

impl SessionConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_ack_retry_interval(mut self, interval: Duration) -> Self {
        self.ack_retry_interval = interval;
        self
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Box::new(strategy);
        self
    }

    pub fn with_reconnection_delay_offset(mut self, offset: Duration) -> Self {
        self.reconnection_delay_offset = offset;
        self
    }

    pub fn with_handshake_op(mut self, op: impl Into<String>) -> Self {
        self.handshake_op = op.into();
        self
    }

    pub fn with_require_handshake(mut self, require: bool) -> Self {
        self.require_handshake = require;
        self
    }

    pub fn with_require_credentials_on_reconnect(mut self, require: bool) -> Self {
        self.require_credentials_on_reconnect = require;
        self
    }

    /// Get a reference to the endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    pub fn ack_retry_interval(&self) -> Duration {
        self.ack_retry_interval
    }

    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect
    }

    pub fn handshake_op(&self) -> &str {
        &self.handshake_op
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("wss://") || self.endpoint.starts_with("ws://")) {
            return Err(EcrError::Configuration(format!(
                "endpoint must be a ws:// or wss:// URL, got '{}'",
                self.endpoint
            )));
        }
        if self.keepalive_interval.is_zero() {
            return Err(EcrError::Configuration("keepalive interval must be non-zero".into()));
        }
        if self.ack_retry_interval.is_zero() {
            return Err(EcrError::Configuration("ack retry interval must be non-zero".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("ack_retry_interval", &self.ack_retry_interval)
            .field("reconnect", &self.reconnect)
            .field("reconnection_delay_offset", &self.reconnection_delay_offset)
            .field("handshake_op", &self.handshake_op)
            .field("require_handshake", &self.require_handshake)
            .field(
                "require_credentials_on_reconnect",
                &self.require_credentials_on_reconnect,
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.keepalive_interval(), Duration::from_secs(1));
        assert_eq!(config.ack_retry_interval(), Duration::from_secs(1));
        assert!(config.reconnect_enabled());
        assert_eq!(config.handshake_op(), "connection_established");
        assert_eq!(
            config.reconnect_strategy.next_delay(0),
            Some(DEFAULT_RECONNECT_DELAY)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_http_endpoint() {
        let config = SessionConfig::default().with_endpoint("https://connect.sobitecr.com");
        assert!(matches!(config.validate(), Err(EcrError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = SessionConfig::default().with_keepalive_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = SessionConfig::default().with_ack_retry_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
