use std::fmt;

/// What the session should do after a callback returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No more messages expected: drain and close the session
    Close,
    /// Keep the session open for further traffic
    KeepOpen,
}

/// Called with `(message, op)` for every reply routed to the operation
pub type ResponseFn = Box<dyn FnMut(&str, Option<&str>) -> Disposition + Send>;

/// Called with `(code, message)` for transport, parse and remote errors
pub type ErrorFn = Box<dyn FnMut(i64, &str) -> Disposition + Send>;

/// Called once after the handshake confirmation
pub type ConnectFn = Box<dyn FnOnce() + Send>;

/// Optional callbacks attached to one operation
///
/// A missing response or error handler means "close when it would have been
/// called".
#[derive(Default)]
pub struct Callbacks {
    pub(crate) on_response: Option<ResponseFn>,
    pub(crate) on_error: Option<ErrorFn>,
    pub(crate) on_connect: Option<ConnectFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, Option<&str>) -> Disposition + Send + 'static,
    {
        self.on_response = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(i64, &str) -> Disposition + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_connect = Some(Box::new(f));
        self
    }

    pub fn has_response_handler(&self) -> bool {
        self.on_response.is_some()
    }

    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }

    /// Run the connect callback; later calls do nothing
    pub(crate) fn fire_connect(&mut self) {
        if let Some(f) = self.on_connect.take() {
            f();
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_response", &self.on_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .finish()
    }
}
