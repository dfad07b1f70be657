//! Domain layer: sessions, payloads, and the concurrent session index.
//!
//! This module contains the server-side model of a live connection
//! ([`Session`]), its cluster-visible projection ([`SessionInfo`]), the
//! message payload type shared by clients, callbacks, and peers, and the
//! [`SessionRegistry`] that indexes sessions by id and by path.

pub mod payload;
pub mod session;
pub mod session_id;
pub mod session_info;
pub mod session_registry;

pub use payload::Payload;
pub use session::{CloseReason, OutboundReceiver, Session};
pub use session_id::SessionId;
pub use session_info::{NodeId, SessionInfo};
pub use session_registry::SessionRegistry;
