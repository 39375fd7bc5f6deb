use crate::core::credentials::Credentials;
use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers sent with the WebSocket upgrade request
pub type Headers = HashMap<String, String>;

/// Header carrying the account API key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Header carrying the bearer credential
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Trait for providing HTTP headers dynamically
///
/// Called on every connection attempt, including reconnections, so
/// implementations may generate fresh values each time.
///
/// # Example
/// ```ignore
/// struct StaticKey(String);
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for StaticKey {
///     async fn get_headers(&self) -> Headers {
///         let mut headers = Headers::new();
///         headers.insert("X-Api-Key".to_string(), self.0.clone());
///         headers
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers to send with the WebSocket connection
    async fn get_headers(&self) -> Headers;
}

/// A no-op header provider that doesn't add any headers
pub struct NoHeaders;

#[async_trait]
impl HeaderProvider for NoHeaders {
    async fn get_headers(&self) -> Headers {
        HashMap::new()
    }
}

/// Header provider derived from session credentials
///
/// Always sends `X-Api-Key`. `Authorization: Bearer <base64(identifier token)>`
/// is added only when both identifier and token are present.
#[derive(Debug, Clone)]
pub struct CredentialHeaders {
    credentials: Credentials,
}

impl CredentialHeaders {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Build the header map without going through the async trait
    pub fn headers(&self) -> Headers {
        let mut headers = HashMap::new();
        headers.insert(
            API_KEY_HEADER.to_string(),
            self.credentials.api_key().to_string(),
        );
        if let Some(bearer) = self.credentials.bearer() {
            headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {}", bearer));
        }
        headers
    }
}

#[async_trait]
impl HeaderProvider for CredentialHeaders {
    async fn get_headers(&self) -> Headers {
        self.headers()
    }
}
