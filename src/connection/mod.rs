//! Cloud socket management.
//!
//! This module contains:
//! - [`websocket`]: Low-level WebSocket helpers (upgrade request, connect,
//!   line framing, inbound parsing)
//! - [`shared`]: The background connection task with write queue and
//!   auto-reconnect

pub mod shared;
pub mod websocket;

pub(crate) use shared::{
    closed_error, connection_task, supervise, ConnCmd, ConnectionShared, TaskConfig,
};
pub(crate) use websocket::{
    build_request, connect, is_plain_closure, parse_frame, send_message, WebSocketStream,
};

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);
