//! WebSocket layer: handshake admission and the per-connection loop.
//!
//! Every registered endpoint path is mounted as its own `GET` route served
//! by [`handler::ws_handler`]. A connection that passes admission runs
//! [`connection::run_connection`] until either side closes.

pub mod connection;
pub mod handler;
pub mod messages;
