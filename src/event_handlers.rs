//! Connection lifecycle event handlers for cloud connections.
//!
//! Each event keeps an ordered list of callbacks, invoked synchronously in
//! registration order from the connection task:
//!
//! - [`on_connect`](EventHandlers::on_connect): handshake sent, write queue about to flush
//! - [`on_set`](EventHandlers::on_set): a `set` broadcast was observed
//! - [`on_reconnect`](EventHandlers::on_reconnect): an open socket dropped, a new attempt is starting
//! - [`on_error`](EventHandlers::on_error): transport-level failure
//! - [`on_close`](EventHandlers::on_close): the caller closed the connection
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send):
//!   debug hooks for raw wire lines
//!
//! A panicking callback is caught and logged; the remaining callbacks for the
//! same event still run.
//!
//! # Example
//!
//! ```rust
//! use cloud_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("Connected to cloud"))
//!     .on_set(|update| println!("{} = {}", update.name, update.value))
//!     .on_reconnect(|info| println!("Reconnecting: {}", info))
//!     .on_error(|error| eprintln!("Cloud error: {}", error));
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::models::VariableUpdate;

/// Reason the physical socket went away.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Passed to `on_reconnect` when a new connection attempt is scheduled.
#[derive(Debug, Clone)]
pub struct ReconnectInfo {
    /// One-based number of this attempt since the last successful handshake.
    pub attempt: u32,
    /// Backoff delay before the attempt is made.
    pub delay: Duration,
    /// Why the previous socket is gone.
    pub reason: DisconnectReason,
}

impl fmt::Display for ReconnectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt {} in {:?} after: {}",
            self.attempt, self.delay, self.reason
        )
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub message: String,
    /// Whether auto-reconnect may still succeed. `false` means the
    /// connection has moved to its terminal closed state.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnSetCallback = Arc<dyn Fn(&VariableUpdate) + Send + Sync>;
pub type OnReconnectCallback = Arc<dyn Fn(&ReconnectInfo) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(&ConnectionError) + Send + Sync>;
pub type OnCloseCallback = Arc<dyn Fn() + Send + Sync>;
/// Debug hook for raw inbound lines.
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Debug hook for raw outbound lines.
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Ordered callback lists for every connection event.
///
/// Handlers can be supplied up front through the builder methods here, or
/// added to a live connection through the `on_*` methods of
/// [`CloudConnection`](crate::CloudConnection).
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Vec<OnConnectCallback>,
    pub(crate) on_set: Vec<OnSetCallback>,
    pub(crate) on_reconnect: Vec<OnReconnectCallback>,
    pub(crate) on_error: Vec<OnErrorCallback>,
    pub(crate) on_close: Vec<OnCloseCallback>,
    pub(crate) on_receive: Vec<OnReceiveCallback>,
    pub(crate) on_send: Vec<OnSendCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.len())
            .field("on_set", &self.on_set.len())
            .field("on_reconnect", &self.on_reconnect.len())
            .field("on_error", &self.on_error.len())
            .field("on_close", &self.on_close.len())
            .field("on_receive", &self.on_receive.len())
            .field("on_send", &self.on_send.len())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked after each successful handshake.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect.push(Arc::new(f));
        self
    }

    /// Register a callback invoked for every `set` broadcast.
    ///
    /// The variable cache is already updated when the callback runs.
    pub fn on_set(mut self, f: impl Fn(&VariableUpdate) + Send + Sync + 'static) -> Self {
        self.on_set.push(Arc::new(f));
        self
    }

    /// Register a callback invoked when a reconnect attempt is scheduled.
    ///
    /// Only fires once a handshake has succeeded at least once; failed
    /// initial attempts surface through `on_error` alone.
    pub fn on_reconnect(mut self, f: impl Fn(&ReconnectInfo) + Send + Sync + 'static) -> Self {
        self.on_reconnect.push(Arc::new(f));
        self
    }

    /// Register a callback invoked on transport errors.
    pub fn on_error(mut self, f: impl Fn(&ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(f));
        self
    }

    /// Register a callback invoked once when the caller closes the connection.
    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close.push(Arc::new(f));
        self
    }

    /// Register a **debug hook** receiving every raw inbound line before parsing.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive.push(Arc::new(f));
        self
    }

    /// Register a **debug hook** receiving every raw outbound line.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send.push(Arc::new(f));
        self
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        for cb in &self.on_connect {
            isolate("connect", || cb());
        }
    }

    pub(crate) fn emit_set(&self, update: &VariableUpdate) {
        for cb in &self.on_set {
            isolate("set", || cb(update));
        }
    }

    pub(crate) fn emit_reconnect(&self, info: &ReconnectInfo) {
        for cb in &self.on_reconnect {
            isolate("reconnect", || cb(info));
        }
    }

    pub(crate) fn emit_error(&self, error: &ConnectionError) {
        for cb in &self.on_error {
            isolate("error", || cb(error));
        }
    }

    pub(crate) fn emit_close(&self) {
        for cb in &self.on_close {
            isolate("close", || cb());
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        for cb in &self.on_receive {
            isolate("receive", || cb(raw));
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        for cb in &self.on_send {
            isolate("send", || cb(raw));
        }
    }
}

/// Run one callback, containing any panic it raises.
///
/// Returns `false` when the callback panicked.
pub(crate) fn isolate(event: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            log::error!(
                "[cloud-link] '{}' handler panicked: {}",
                event,
                panic_message(payload.as_ref())
            );
            false
        },
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
