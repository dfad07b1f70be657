//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers are serialized as plain strings.

pub mod message_dto;
pub mod session_dto;
pub mod system_dto;

pub use message_dto::*;
pub use session_dto::*;
pub use system_dto::*;
