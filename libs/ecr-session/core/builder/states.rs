/// Type-state markers for the session builder
///
/// A session cannot be built until an API key has been supplied.

use std::marker::PhantomData;

/// Marker trait for credential state
pub trait CredentialState {}

/// API key has not been set
pub struct NoCredentials;
impl CredentialState for NoCredentials {}

/// API key has been set
pub struct HasCredentials;
impl CredentialState for HasCredentials {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<C> {
    _credentials: PhantomData<C>,
}

impl<C> TypeState<C> {
    pub(crate) fn new() -> Self {
        Self {
            _credentials: PhantomData,
        }
    }
}

impl<C> Default for TypeState<C> {
    fn default() -> Self {
        Self::new()
    }
}
