use serde::{Deserialize, Serialize};

/// Client-to-server messages on the cloud broadcast socket.
///
/// Each message is sent as one minified JSON object followed by `\n`.
///
/// # JSON Wire Format
///
/// ```json
/// {"method":"handshake","user":"griffpatch","project_id":"10128407"}
/// {"method":"set","user":"griffpatch","name":"☁ score","value":"42","project_id":10128407}
/// ```
///
/// The endpoint expects `project_id` as a string on the handshake and as a
/// number on `set`; both shapes are kept as-is for wire compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Binds the socket to a project and user. Sent once per physical socket.
    Handshake { user: String, project_id: String },

    /// Sets a cloud variable.
    Set {
        user: String,
        /// Canonical variable name, including the `☁ ` prefix
        name: String,
        value: String,
        project_id: u64,
    },
}

impl ClientMessage {
    pub fn handshake(user: impl Into<String>, project_id: u64) -> Self {
        ClientMessage::Handshake {
            user: user.into(),
            project_id: project_id.to_string(),
        }
    }

    pub fn set(
        user: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        project_id: u64,
    ) -> Self {
        ClientMessage::Set {
            user: user.into(),
            name: name.into(),
            value: value.into(),
            project_id,
        }
    }

    /// Serialize to a single newline-terminated wire line.
    pub fn to_line(&self) -> crate::error::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
