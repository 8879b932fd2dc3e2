use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::variable_update::VariableUpdate;

/// Messages broadcast by the cloud server.
///
/// Only `set` carries information for this client; every other method
/// (handshake acks, server notices) deserializes to [`ServerMessage::Other`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A variable changed. The server may send the value as a JSON string or number.
    Set { name: String, value: JsonValue },

    #[serde(other)]
    Other,
}

impl ServerMessage {
    /// Convert a `set` broadcast into a variable update.
    pub fn into_update(self) -> Option<VariableUpdate> {
        match self {
            ServerMessage::Set { name, value } => {
                let value = match value {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                Some(VariableUpdate { name, value })
            },
            ServerMessage::Other => None,
        }
    }
}
