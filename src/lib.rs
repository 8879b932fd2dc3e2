//! # cloud-link
//!
//! Client for the cloud-variable broadcast channel of the Scratch platform,
//! plus a packet protocol that multiplexes named messages over it.
//!
//! - [`CloudConnection`]: one WebSocket per project, with handshake,
//!   variable cache, write queue for the pre-handshake period and
//!   auto-reconnect with capped exponential backoff
//! - [`PacketCloud`]: request/notify packets encoded into cloud variables
//! - [`Codec`]: the two-digit symbol encoding cloud values are restricted to
//!
//! Authentication is not handled here. Callers supply an [`Identity`]
//! (username + session cookie) obtained from the platform login.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloud_link::{CloudConnection, EventHandlers, Identity, PacketCloud};
//!
//! # async fn example() -> cloud_link::Result<()> {
//! let cloud = CloudConnection::builder()
//!     .identity(Identity::from_session("griffpatch", "csrf", "session"))
//!     .project_id(10128407)
//!     .event_handlers(
//!         EventHandlers::new()
//!             .on_connect(|| println!("handshake done"))
//!             .on_error(|e| eprintln!("cloud error: {}", e)),
//!     )
//!     .build()?;
//! let cloud = Arc::new(cloud);
//!
//! let packets = PacketCloud::new(cloud.clone());
//! packets.on_request(|packet| {
//!     println!("{} sent {}", packet.name, packet.value);
//!     Ok(())
//! });
//! packets.send("status", "ready")?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod packet;
pub mod timeouts;

pub use client::{CloudConnection, CloudConnectionBuilder};
pub use codec::{Charset, Codec, CodecError, Decode, DEFAULT_CHARSET};
pub use error::{CloudLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers, ReconnectInfo};
pub use models::{
    ConnectionOptions, ConnectionState, Identity, Username, VariableUpdate, CLOUD_PREFIX,
};
pub use packet::{
    OversizePolicy, Packet, PacketCloud, PacketOptions, PacketRouter, INBOUND_MARKER,
    OUTBOUND_VARIABLE,
};
pub use timeouts::CloudLinkTimeouts;
