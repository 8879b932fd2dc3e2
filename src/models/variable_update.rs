use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix every cloud variable name carries on the wire.
pub const CLOUD_PREFIX: &str = "☁ ";

/// Return `name` with the cloud prefix, adding it when missing.
///
/// ```rust
/// use cloud_link::models::canonical_name;
///
/// assert_eq!(canonical_name("score"), "☁ score");
/// assert_eq!(canonical_name("☁ score"), "☁ score");
/// ```
pub fn canonical_name(name: &str) -> String {
    if name.starts_with(CLOUD_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", CLOUD_PREFIX, name)
    }
}

/// A cloud variable value observed on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableUpdate {
    /// Canonical variable name, as broadcast by the server
    pub name: String,
    pub value: String,
}

impl VariableUpdate {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Variable name without the cloud prefix.
    pub fn short_name(&self) -> &str {
        self.name.strip_prefix(CLOUD_PREFIX).unwrap_or(&self.name)
    }
}

impl fmt::Display for VariableUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}
