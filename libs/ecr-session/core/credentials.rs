//! Account credentials and token generation

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;
use std::fmt;

/// Length of tokens produced by [`generate_token`]
pub const TOKEN_LENGTH: usize = 64;

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Credentials presented on every connection attempt
///
/// Immutable for the lifetime of a session. Identifier and token are
/// optional for anonymous or device-targeted use.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    identifier: Option<String>,
    token: Option<String>,
}

impl Credentials {
    /// Credentials carrying only the API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            identifier: None,
            token: None,
        }
    }

    /// Attach the register identifier and its token
    pub fn with_identity(mut self, identifier: impl Into<String>, token: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self.token = Some(token.into());
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// True when both identifier and token are present
    pub fn has_identity(&self) -> bool {
        self.identifier.is_some() && self.token.is_some()
    }

    /// `base64("<identifier> <token>")`, when an identity is present
    pub fn bearer(&self) -> Option<String> {
        match (&self.identifier, &self.token) {
            (Some(identifier), Some(token)) => {
                Some(STANDARD.encode(format!("{} {}", identifier, token)))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("identifier", &self.identifier)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Random token of [`TOKEN_LENGTH`] characters over `[0-9a-z]`
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}
