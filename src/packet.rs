//! Packet layer: named request/notify messages over cloud variables.
//!
//! Outbound packets are written to a single reserved variable,
//! `☁ FROM_SERVER_SEND`, whose value is the codec encoding of the packet
//! name followed by the encoding of its value. Inbound packets arrive on any
//! variable whose name contains `FROM_USER`; everything else on the channel
//! is left to other consumers of the connection.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloud_link::{CloudConnection, Identity, PacketCloud};
//!
//! # async fn example() -> cloud_link::Result<()> {
//! let cloud = Arc::new(CloudConnection::connect(Identity::new("bot", "cookie"), 1)?);
//! let packets = PacketCloud::new(cloud);
//!
//! let replies = packets.clone();
//! packets.on("ping", move |packet| {
//!     replies.send("pong", &packet.value)?;
//!     Ok(())
//! });
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
};

use crate::{
    client::CloudConnection,
    codec::{Codec, CodecError},
    error::Result,
    models::VariableUpdate,
};

/// Variable that carries packets sent by this client.
pub const OUTBOUND_VARIABLE: &str = "FROM_SERVER_SEND";

/// Substring identifying variables that carry packets from project users.
pub const INBOUND_MARKER: &str = "FROM_USER";

/// Practical upper bound on an encoded packet accepted by the cloud server.
pub const DEFAULT_MAX_ENCODED_LEN: usize = 250;

/// A decoded logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub name: String,
    pub value: String,
    /// Cloud variable the packet arrived on
    pub variable: String,
}

/// Error type handlers may return; it is logged and otherwise ignored.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type PacketHandler = Arc<dyn Fn(&Packet) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// What to do with a packet whose encoding exceeds the size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Log a warning and send anyway.
    #[default]
    Warn,
    /// Fail with [`CodecError::PacketTooLarge`] without sending.
    Reject,
}

#[derive(Debug, Clone)]
pub struct PacketOptions {
    pub max_encoded_len: usize,
    pub oversize_policy: OversizePolicy,
}

impl Default for PacketOptions {
    fn default() -> Self {
        Self {
            max_encoded_len: DEFAULT_MAX_ENCODED_LEN,
            oversize_policy: OversizePolicy::Warn,
        }
    }
}

impl PacketOptions {
    pub fn with_max_encoded_len(mut self, len: usize) -> Self {
        self.max_encoded_len = len;
        self
    }

    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize_policy = policy;
        self
    }
}

#[derive(Default)]
struct Registry {
    requests: Vec<PacketHandler>,
    named: HashMap<String, Vec<PacketHandler>>,
}

/// Demultiplexes `set` updates into packets and dispatches them.
///
/// Independent of any socket: [`PacketCloud`] feeds it from a connection's
/// `on_set` stream, but it can be driven directly as well.
#[derive(Clone, Default)]
pub struct PacketRouter {
    codec: Codec,
    registry: Arc<RwLock<Registry>>,
}

impl fmt::Debug for PacketRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("PacketRouter")
            .field("request_handlers", &registry.requests.len())
            .field("named_handlers", &registry.named.len())
            .finish()
    }
}

impl PacketRouter {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            registry: Arc::default(),
        }
    }

    /// Register a handler for every inbound packet.
    pub fn on_request(
        &self,
        f: impl Fn(&Packet) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .push(Arc::new(f));
    }

    /// Register a handler for inbound packets named `name`.
    pub fn on(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Packet) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .named
            .entry(name.into())
            .or_default()
            .push(Arc::new(f));
    }

    /// Decode an update into a packet if it is inbound protocol traffic.
    ///
    /// Returns `None` for foreign variables, undecodable payloads and
    /// packets with an empty name or value.
    pub fn decode(&self, update: &VariableUpdate) -> Option<Packet> {
        if !update.name.contains(INBOUND_MARKER) {
            return None;
        }

        let mut segments = self.codec.decode(&update.value);
        let (name, value) = match (segments.next(), segments.next()) {
            (Some(Ok(name)), Some(Ok(value))) => (name, value),
            (Some(Err(e)), _) | (_, Some(Err(e))) => {
                log::warn!("[cloud-link] Dropping undecodable packet on {}: {}", update.name, e);
                return None;
            },
            _ => {
                log::debug!("[cloud-link] Dropping incomplete packet on {}", update.name);
                return None;
            },
        };
        if name.is_empty() || value.is_empty() {
            log::debug!("[cloud-link] Dropping packet with empty name or value on {}", update.name);
            return None;
        }

        Some(Packet {
            name,
            value,
            variable: update.name.clone(),
        })
    }

    /// Dispatch one update. Returns the number of handlers that completed
    /// without error.
    ///
    /// Request handlers run first, then handlers bound to the packet name,
    /// each list in registration order. A handler that errors or panics is
    /// logged and skipped.
    pub fn dispatch(&self, update: &VariableUpdate) -> usize {
        let Some(packet) = self.decode(update) else {
            return 0;
        };

        let handlers: Vec<PacketHandler> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            registry
                .requests
                .iter()
                .chain(registry.named.get(&packet.name).into_iter().flatten())
                .cloned()
                .collect()
        };

        handlers
            .iter()
            .filter(|handler| invoke(handler, &packet))
            .count()
    }
}

fn invoke(handler: &PacketHandler, packet: &Packet) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(packet))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("[cloud-link] Handler for packet '{}' failed: {}", packet.name, e);
            false
        },
        Err(_) => {
            log::error!("[cloud-link] Handler for packet '{}' panicked", packet.name);
            false
        },
    }
}

/// Packet messaging on top of a [`CloudConnection`].
///
/// Cheap to clone; clones share the connection and the handler lists.
/// Several independent `PacketCloud`s may sit on one connection, each with
/// its own handlers.
///
/// A handler that captures a `PacketCloud` clone keeps the connection alive
/// through its own handler list, so dropping the last handle does not stop
/// it; call [`CloudConnection::close`] explicitly.
#[derive(Clone, Debug)]
pub struct PacketCloud {
    connection: Arc<CloudConnection>,
    router: PacketRouter,
    options: PacketOptions,
}

impl PacketCloud {
    pub fn new(connection: Arc<CloudConnection>) -> Self {
        Self::with_options(connection, Codec::default(), PacketOptions::default())
    }

    pub fn with_options(connection: Arc<CloudConnection>, codec: Codec, options: PacketOptions) -> Self {
        let router = PacketRouter::new(codec);
        let inbound = router.clone();
        connection.on_set(move |update| {
            inbound.dispatch(update);
        });

        Self {
            connection,
            router,
            options,
        }
    }

    pub fn connection(&self) -> &Arc<CloudConnection> {
        &self.connection
    }

    /// Encode a packet into the value written to the outbound variable.
    pub fn encode(&self, name: &str, value: &str) -> std::result::Result<String, CodecError> {
        let encoded = self.router.codec.encode_all([name, value])?;
        if encoded.len() > self.options.max_encoded_len {
            match self.options.oversize_policy {
                OversizePolicy::Warn => log::warn!(
                    "[cloud-link] Packet '{}' encodes to {} characters, over the {} limit; the server may drop it",
                    name,
                    encoded.len(),
                    self.options.max_encoded_len
                ),
                OversizePolicy::Reject => {
                    return Err(CodecError::PacketTooLarge {
                        len: encoded.len(),
                        limit: self.options.max_encoded_len,
                    })
                },
            }
        }
        Ok(encoded)
    }

    /// Send a packet. Codec failures are returned before anything is written.
    pub fn send(&self, name: &str, value: &str) -> Result<()> {
        let encoded = self.encode(name, value)?;
        self.connection.set_variable(OUTBOUND_VARIABLE, encoded)
    }

    /// Register a handler for every inbound packet.
    pub fn on_request(
        &self,
        f: impl Fn(&Packet) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        self.router.on_request(f);
    }

    /// Register a handler for inbound packets named `name`.
    pub fn on(
        &self,
        name: impl Into<String>,
        f: impl Fn(&Packet) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        self.router.on(name, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn inbound(codec: &Codec, name: &str, value: &str) -> VariableUpdate {
        VariableUpdate::new("☁ FROM_USER_1", codec.encode_all([name, value]).unwrap())
    }

    #[test]
    fn test_request_and_named_handlers_receive_packet() {
        let router = PacketRouter::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        router.on_request(move |p| {
            log.lock().unwrap().push(format!("request {}={}", p.name, p.value));
            Ok(())
        });
        let log = seen.clone();
        router.on("ping", move |p| {
            log.lock().unwrap().push(format!("ping {}", p.value));
            Ok(())
        });
        let log = seen.clone();
        router.on("other", move |_| {
            log.lock().unwrap().push("other".to_string());
            Ok(())
        });

        let update = inbound(&Codec::default(), "ping", "hello");
        assert_eq!(router.dispatch(&update), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["request ping=hello", "ping hello"]);
    }

    #[test]
    fn test_foreign_variables_are_ignored() {
        let router = PacketRouter::default();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        router.on_request(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let codec = Codec::default();
        let payload = codec.encode_all(["ping", "hello"]).unwrap();
        assert_eq!(router.dispatch(&VariableUpdate::new("☁ score", payload.clone())), 0);
        assert_eq!(router.dispatch(&VariableUpdate::new("☁ FROM_SERVER_SEND", payload)), 0);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_failing_handler_does_not_block_the_next() {
        let router = PacketRouter::default();
        let reached = Arc::new(Mutex::new(Vec::new()));

        router.on_request(|_| Err("handler one failed".into()));
        let log = reached.clone();
        router.on_request(move |p| {
            log.lock().unwrap().push(p.name.clone());
            Ok(())
        });

        assert_eq!(router.dispatch(&inbound(&Codec::default(), "a", "b")), 1);
        assert_eq!(*reached.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_panicking_handler_does_not_block_the_next() {
        let router = PacketRouter::default();
        let reached = Arc::new(Mutex::new(false));

        router.on_request(|_| panic!("handler one exploded"));
        let flag = reached.clone();
        router.on_request(move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        assert_eq!(router.dispatch(&inbound(&Codec::default(), "a", "b")), 1);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_incomplete_or_invalid_packets_are_dropped() {
        let router = PacketRouter::default();
        let codec = Codec::default();

        // name only
        let only_name = VariableUpdate::new("☁ FROM_USER_1", codec.encode("ping").unwrap());
        assert!(router.decode(&only_name).is_none());

        // empty value
        assert!(router.decode(&inbound(&codec, "ping", "")).is_none());

        // garbage digits
        assert!(router.decode(&VariableUpdate::new("☁ FROM_USER_1", "9999")).is_none());
    }

    #[test]
    fn test_decode_keeps_source_variable() {
        let router = PacketRouter::default();
        let packet = router
            .decode(&VariableUpdate::new(
                "☁ FROM_USER_2",
                Codec::default().encode_all(["hi", "there"]).unwrap(),
            ))
            .unwrap();

        assert_eq!(
            packet,
            Packet {
                name: "hi".to_string(),
                value: "there".to_string(),
                variable: "☁ FROM_USER_2".to_string(),
            }
        );
    }
}
