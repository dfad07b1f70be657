//! Service layer: session lifecycle and outbound dispatch.
//!
//! [`SessionLifecycle`] drives sessions through open, inbound and close,
//! and [`MessageDispatcher`] is the send API handed to application code.

pub mod dispatcher;
pub mod lifecycle;

pub use dispatcher::MessageDispatcher;
pub use lifecycle::SessionLifecycle;
