//! Data models for the cloud-link client library.
//!
//! Defines the wire messages exchanged with the broadcast server, the
//! connection configuration, and the identity the connection runs as.

pub mod client_message;
pub mod connection_options;
pub mod connection_state;
pub mod identity;
pub mod server_message;
pub mod variable_update;

#[cfg(test)]
mod tests;

pub use client_message::ClientMessage;
pub use connection_options::{ConnectionOptions, DEFAULT_ORIGIN, DEFAULT_SERVER_URL};
pub use connection_state::ConnectionState;
pub use identity::{Identity, Username};
pub use server_message::ServerMessage;
pub use variable_update::{canonical_name, VariableUpdate, CLOUD_PREFIX};
