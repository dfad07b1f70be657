//! Endpoint dispatch table.
//!
//! Maps an endpoint path to its [`EndpointCallbacks`]. The table is built
//! once at startup through [`EndpointTableBuilder`] and is read-only
//! afterwards, so dispatch needs no locking.
//!
//! Every callback invocation is isolated: an error or a panic inside
//! application code is caught here, logged with the session id and path,
//! routed to the path's `on_error` callback when one exists, and never
//! reaches the connection task or any other session.

pub mod callbacks;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub use callbacks::{CallbackResult, EndpointCallbacks};

use crate::domain::{Payload, Session};
use crate::error::{CallbackError, GatewayError};

/// Path prefixes owned by the gateway's own HTTP surface.
pub const RESERVED_PREFIXES: &[&str] = &[
    "/api",
    "/internal",
    "/health",
    "/stats",
    "/swagger-ui",
    "/api-docs",
];

/// Result of invoking one callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The callback ran and returned `Ok`.
    Handled,
    /// No callback is registered for this event on this path.
    NoCallback,
    /// The callback failed; the error was already routed to `on_error`.
    Failed(CallbackError),
}

/// A registered endpoint: its path and callbacks.
#[derive(Debug)]
pub struct Endpoint {
    path: String,
    callbacks: EndpointCallbacks,
}

impl Endpoint {
    /// Returns the endpoint path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the ordering metadata.
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.callbacks.order
    }

    /// Returns the callback bundle.
    #[must_use]
    pub const fn callbacks(&self) -> &EndpointCallbacks {
        &self.callbacks
    }

    /// Fires the connect callback.
    pub fn dispatch_open(&self, session: &Arc<Session>) -> DispatchOutcome {
        let Some(callback) = &self.callbacks.on_open else {
            return DispatchOutcome::NoCallback;
        };
        let result = guard(|| callback(session));
        self.finish(session, "on_open", result)
    }

    /// Fires the text or binary message callback matching the payload.
    pub fn dispatch_message(&self, session: &Arc<Session>, payload: &Payload) -> DispatchOutcome {
        match payload {
            Payload::Text(text) => {
                let Some(callback) = &self.callbacks.on_message else {
                    return DispatchOutcome::NoCallback;
                };
                let result = guard(|| callback(session, text.as_str()));
                self.finish(session, "on_message", result)
            }
            Payload::Binary(bytes) => {
                let Some(callback) = &self.callbacks.on_binary else {
                    return DispatchOutcome::NoCallback;
                };
                let result = guard(|| callback(session, bytes.as_slice()));
                self.finish(session, "on_binary", result)
            }
        }
    }

    /// Fires the disconnect callback.
    pub fn dispatch_close(&self, session: &Arc<Session>) -> DispatchOutcome {
        let Some(callback) = &self.callbacks.on_close else {
            return DispatchOutcome::NoCallback;
        };
        let result = guard(|| callback(session));
        self.finish(session, "on_close", result)
    }

    /// Fires the error callback. A failing error callback is only logged.
    pub fn dispatch_error(&self, session: &Arc<Session>, error: &CallbackError) -> DispatchOutcome {
        let Some(callback) = &self.callbacks.on_error else {
            return DispatchOutcome::NoCallback;
        };
        match guard(|| {
            callback(session, error);
            Ok(())
        }) {
            Ok(()) => DispatchOutcome::Handled,
            Err(nested) => {
                tracing::error!(
                    session_id = %session.id(),
                    path = %self.path,
                    error = %nested,
                    "on_error callback failed"
                );
                DispatchOutcome::Failed(nested)
            }
        }
    }

    fn finish(
        &self,
        session: &Arc<Session>,
        stage: &'static str,
        result: CallbackResult,
    ) -> DispatchOutcome {
        match result {
            Ok(()) => DispatchOutcome::Handled,
            Err(error) => {
                tracing::warn!(
                    session_id = %session.id(),
                    path = %self.path,
                    stage,
                    %error,
                    "endpoint callback failed"
                );
                self.dispatch_error(session, &error);
                DispatchOutcome::Failed(error)
            }
        }
    }
}

/// Runs a callback, turning a panic into [`CallbackError::Panicked`].
fn guard<F>(f: F) -> CallbackResult
where
    F: FnOnce() -> CallbackResult,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(CallbackError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Read-only map from path to [`Endpoint`].
#[derive(Debug, Default)]
pub struct EndpointTable {
    entries: HashMap<String, Arc<Endpoint>>,
}

impl EndpointTable {
    /// Starts a fluent registration.
    #[must_use]
    pub fn builder() -> EndpointTableBuilder {
        EndpointTableBuilder::default()
    }

    /// Builds a table from a pre-resolved `path -> callbacks` map.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidEndpointPath`] if a key is not a
    /// usable endpoint path.
    pub fn from_map(map: HashMap<String, EndpointCallbacks>) -> Result<Self, GatewayError> {
        map.into_iter()
            .fold(Self::builder(), |builder, (path, callbacks)| {
                builder.endpoint(path, callbacks)
            })
            .build()
    }

    /// Looks up the endpoint for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Arc<Endpoint>> {
        self.entries.get(path)
    }

    /// Returns every endpoint, sorted by order metadata and then path.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        let mut endpoints: Vec<Arc<Endpoint>> = self.entries.values().map(Arc::clone).collect();
        endpoints.sort_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.path.cmp(&b.path)));
        endpoints
    }

    /// Returns every registered path, in [`EndpointTable::endpoints`] order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.endpoints()
            .iter()
            .map(|endpoint| endpoint.path.clone())
            .collect()
    }

    /// Returns the number of endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no endpoint is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fluent builder for [`EndpointTable`].
///
/// The first registration error is kept and reported by
/// [`EndpointTableBuilder::build`].
#[derive(Debug, Default)]
pub struct EndpointTableBuilder {
    entries: HashMap<String, Arc<Endpoint>>,
    error: Option<GatewayError>,
}

impl EndpointTableBuilder {
    /// Registers `callbacks` for `path`.
    #[must_use]
    pub fn endpoint(mut self, path: impl Into<String>, callbacks: EndpointCallbacks) -> Self {
        if self.error.is_some() {
            return self;
        }
        let path = path.into();
        if let Err(err) = validate_path(&path) {
            self.error = Some(err);
            return self;
        }
        if self.entries.contains_key(&path) {
            self.error = Some(GatewayError::DuplicateEndpoint(path));
            return self;
        }
        let endpoint = Endpoint {
            path: path.clone(),
            callbacks,
        };
        self.entries.insert(path, Arc::new(endpoint));
        self
    }

    /// Finishes registration.
    ///
    /// # Errors
    ///
    /// Returns the first registration error: an invalid or reserved path
    /// ([`GatewayError::InvalidEndpointPath`]) or a path registered twice
    /// ([`GatewayError::DuplicateEndpoint`]).
    pub fn build(self) -> Result<EndpointTable, GatewayError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(EndpointTable {
                entries: self.entries,
            }),
        }
    }
}

fn validate_path(path: &str) -> Result<(), GatewayError> {
    let invalid = |why: &str| GatewayError::InvalidEndpointPath(format!("{path:?}: {why}"));
    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }
    if path
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '*' | '?' | '#'))
    {
        return Err(invalid("contains a reserved character"));
    }
    let reserved = RESERVED_PREFIXES.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    });
    if path == "/" || reserved {
        return Err(invalid("path is reserved by the gateway"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn session(path: &str) -> Arc<Session> {
        Arc::new(Session::new(path, SocketAddr::from(([127, 0, 0, 1], 1)), None, 8).0)
    }

    #[test]
    fn builder_registers_and_looks_up() {
        let Ok(table) = EndpointTable::builder()
            .endpoint("/chat", EndpointCallbacks::new())
            .endpoint("/feed", EndpointCallbacks::new().order(-1))
            .build()
        else {
            panic!("valid table");
        };
        assert_eq!(table.len(), 2);
        assert!(table.get("/chat").is_some());
        assert!(table.get("/nope").is_none());
        assert_eq!(table.paths(), vec!["/feed".to_string(), "/chat".to_string()]);
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let result = EndpointTable::builder()
            .endpoint("/chat", EndpointCallbacks::new())
            .endpoint("/chat", EndpointCallbacks::new())
            .build();
        assert!(matches!(result, Err(GatewayError::DuplicateEndpoint(p)) if p == "/chat"));
    }

    #[test]
    fn invalid_and_reserved_paths_are_rejected() {
        for path in ["chat", "/chat/", "/a b", "/{id}", "/", "/api", "/api/v2", "/internal/x"] {
            let result = EndpointTable::builder()
                .endpoint(path, EndpointCallbacks::new())
                .build();
            assert!(
                matches!(result, Err(GatewayError::InvalidEndpointPath(_))),
                "{path} should be rejected"
            );
        }
        assert!(
            EndpointTable::builder()
                .endpoint("/apiary", EndpointCallbacks::new())
                .build()
                .is_ok()
        );
    }

    #[test]
    fn from_map_builds_table() {
        let mut map = HashMap::new();
        map.insert("/a".to_string(), EndpointCallbacks::new());
        map.insert("/b".to_string(), EndpointCallbacks::new());
        let Ok(table) = EndpointTable::from_map(map) else {
            panic!("valid map");
        };
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn missing_callback_is_noop() {
        let Ok(table) = EndpointTable::builder()
            .endpoint("/chat", EndpointCallbacks::new())
            .build()
        else {
            panic!("valid table");
        };
        let Some(endpoint) = table.get("/chat") else {
            panic!("endpoint registered");
        };
        let s = session("/chat");
        assert_eq!(endpoint.dispatch_open(&s), DispatchOutcome::NoCallback);
        assert_eq!(
            endpoint.dispatch_message(&s, &Payload::from("x")),
            DispatchOutcome::NoCallback
        );
        assert_eq!(endpoint.dispatch_close(&s), DispatchOutcome::NoCallback);
    }

    #[test]
    fn text_and_binary_route_to_their_callbacks() {
        let texts = Arc::new(Mutex::new(Vec::new()));
        let binaries = Arc::new(AtomicUsize::new(0));
        let callbacks = {
            let texts = Arc::clone(&texts);
            let binaries = Arc::clone(&binaries);
            EndpointCallbacks::new()
                .on_message(move |_, text| {
                    if let Ok(mut texts) = texts.lock() {
                        texts.push(text.to_string());
                    }
                    Ok(())
                })
                .on_binary(move |_, bytes| {
                    binaries.fetch_add(bytes.len(), Ordering::SeqCst);
                    Ok(())
                })
        };
        let Ok(table) = EndpointTable::builder().endpoint("/chat", callbacks).build() else {
            panic!("valid table");
        };
        let Some(endpoint) = table.get("/chat") else {
            panic!("endpoint registered");
        };
        let s = session("/chat");
        assert_eq!(
            endpoint.dispatch_message(&s, &Payload::from("hello")),
            DispatchOutcome::Handled
        );
        assert_eq!(
            endpoint.dispatch_message(&s, &Payload::from(vec![1u8, 2])),
            DispatchOutcome::Handled
        );
        let Ok(texts) = texts.lock() else {
            panic!("lock poisoned");
        };
        assert_eq!(texts.as_slice(), ["hello".to_string()]);
        assert_eq!(binaries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn errors_are_routed_to_on_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let callbacks = {
            let seen = Arc::clone(&seen);
            EndpointCallbacks::new()
                .on_message(|_, _| Err(CallbackError::failed("bad input")))
                .on_error(move |_, error| {
                    if let Ok(mut seen) = seen.lock() {
                        seen.push(error.clone());
                    }
                })
        };
        let Ok(table) = EndpointTable::builder().endpoint("/x", callbacks).build() else {
            panic!("valid table");
        };
        let Some(endpoint) = table.get("/x") else {
            panic!("endpoint registered");
        };
        let outcome = endpoint.dispatch_message(&session("/x"), &Payload::from("m"));
        assert_eq!(outcome, DispatchOutcome::Failed(CallbackError::failed("bad input")));
        let Ok(seen) = seen.lock() else {
            panic!("lock poisoned");
        };
        assert_eq!(seen.as_slice(), [CallbackError::failed("bad input")]);
    }

    #[test]
    #[allow(clippy::panic)]
    fn panics_are_caught_and_other_paths_keep_working() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let healthy = {
            let delivered = Arc::clone(&delivered);
            EndpointCallbacks::new().on_message(move |_, _| {
                delivered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let Ok(table) = EndpointTable::builder()
            .endpoint(
                "/x",
                EndpointCallbacks::new().on_message(|_, _| panic!("handler exploded")),
            )
            .endpoint("/y", healthy)
            .build()
        else {
            panic!("valid table");
        };
        let (Some(x), Some(y)) = (table.get("/x"), table.get("/y")) else {
            panic!("endpoints registered");
        };

        let outcome = x.dispatch_message(&session("/x"), &Payload::from("m"));
        assert_eq!(
            outcome,
            DispatchOutcome::Failed(CallbackError::Panicked("handler exploded".to_string()))
        );
        assert_eq!(
            y.dispatch_message(&session("/y"), &Payload::from("m")),
            DispatchOutcome::Handled
        );
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }
}
