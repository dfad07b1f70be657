//! Callback bundle for one endpoint path.

use std::fmt;
use std::sync::Arc;

use crate::domain::Session;
use crate::error::CallbackError;

/// Result type returned by application callbacks.
pub type CallbackResult = Result<(), CallbackError>;

/// Invoked once after a session is registered.
pub type OpenCallback = Arc<dyn Fn(&Arc<Session>) -> CallbackResult + Send + Sync>;
/// Invoked for each text frame that passed the filter pipeline.
pub type TextCallback = Arc<dyn Fn(&Arc<Session>, &str) -> CallbackResult + Send + Sync>;
/// Invoked for each binary frame that passed the filter pipeline.
pub type BinaryCallback = Arc<dyn Fn(&Arc<Session>, &[u8]) -> CallbackResult + Send + Sync>;
/// Invoked once after a session is removed.
pub type CloseCallback = Arc<dyn Fn(&Arc<Session>) -> CallbackResult + Send + Sync>;
/// Invoked when another callback or the transport fails.
pub type ErrorCallback = Arc<dyn Fn(&Arc<Session>, &CallbackError) + Send + Sync>;

/// Up to five optional lifecycle callbacks plus ordering metadata.
///
/// A missing callback means "no-op for this path". Callbacks run on the
/// connection's worker task and must not block; long work belongs on a
/// task the callback spawns itself.
///
/// ```
/// use relay_gateway::endpoint::EndpointCallbacks;
///
/// let callbacks = EndpointCallbacks::new()
///     .on_open(|session| {
///         session.send_text("welcome");
///         Ok(())
///     })
///     .on_message(|session, text| {
///         session.send_text(format!("you said: {text}"));
///         Ok(())
///     });
/// assert!(callbacks.has_on_message());
/// ```
#[derive(Clone, Default)]
pub struct EndpointCallbacks {
    pub(crate) order: i32,
    pub(crate) on_open: Option<OpenCallback>,
    pub(crate) on_message: Option<TextCallback>,
    pub(crate) on_binary: Option<BinaryCallback>,
    pub(crate) on_close: Option<CloseCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl EndpointCallbacks {
    /// Creates an empty bundle (every callback is a no-op).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ordering metadata used when endpoints are listed.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Sets the connect callback.
    #[must_use]
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Session>) -> CallbackResult + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Sets the text message callback.
    #[must_use]
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Session>, &str) -> CallbackResult + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Sets the binary message callback.
    #[must_use]
    pub fn on_binary<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Session>, &[u8]) -> CallbackResult + Send + Sync + 'static,
    {
        self.on_binary = Some(Arc::new(f));
        self
    }

    /// Sets the disconnect callback.
    #[must_use]
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Session>) -> CallbackResult + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Sets the error callback.
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<Session>, &CallbackError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Returns `true` if a text message callback is set.
    #[must_use]
    pub fn has_on_message(&self) -> bool {
        self.on_message.is_some()
    }

    /// Returns the names of the callbacks that are set.
    #[must_use]
    pub fn present(&self) -> Vec<&'static str> {
        [
            ("on_open", self.on_open.is_some()),
            ("on_message", self.on_message.is_some()),
            ("on_binary", self.on_binary.is_some()),
            ("on_close", self.on_close.is_some()),
            ("on_error", self.on_error.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

impl fmt::Debug for EndpointCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointCallbacks")
            .field("order", &self.order)
            .field("present", &self.present())
            .finish()
    }
}
