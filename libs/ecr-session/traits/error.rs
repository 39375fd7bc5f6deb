use thiserror::Error;

/// Main error type for API-level failures of the session engine
#[derive(Error, Debug)]
pub enum EcrError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Header name or value rejected while building the upgrade request
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Outbound frame could not be serialized
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session driver is no longer running
    #[error("Session driver stopped")]
    DriverStopped,
}

/// Result type for ecr-session operations
pub type Result<T> = std::result::Result<T, EcrError>;

/// Errors reported to callers through `on_error(code, message)`
///
/// `Display` yields exactly the message handed to the callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The initial connect (or a reconnect the strategy gave up on) was rejected
    #[error("Connection unsuccessful ({0})")]
    TransportConnectFailure(String),

    /// The open connection failed
    #[error("WebSocket error: {0}")]
    TransportRuntimeError(String),

    /// An inbound frame was not a valid envelope
    #[error("Error parsing message")]
    MalformedMessage { detail: String },

    /// The peer answered with an error envelope
    #[error("{message}")]
    RemoteError { code: i64, message: String },

    /// The liveness probe went unanswered for a whole period
    #[error("Peer did not answer liveness probe")]
    PeerSilent,
}

impl SessionError {
    /// Code reported for every locally detected error
    pub const LOCAL_CODE: i64 = -1;

    /// Code handed to `on_error`: the peer's own code for remote errors, -1 otherwise
    pub fn code(&self) -> i64 {
        match self {
            SessionError::RemoteError { code, .. } => *code,
            _ => Self::LOCAL_CODE,
        }
    }

    /// Transport failures close the session whatever the error handler answers
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::TransportConnectFailure(_)
                | SessionError::TransportRuntimeError(_)
                | SessionError::PeerSilent
        )
    }
}
