use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe wrapper for platform usernames.
///
/// Keeps usernames apart from variable names and cookie strings at compile
/// time.
///
/// ```rust
/// use cloud_link::Username;
///
/// let username = Username::new("griffpatch");
/// assert_eq!(username.as_str(), "griffpatch");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Username {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Authenticated identity used to open a cloud connection.
///
/// Produced by the login flow, which lives outside this crate. The cookie
/// header is sent verbatim on the WebSocket upgrade; the username goes into
/// every handshake and `set` message.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    username: Username,
    cookie_header: String,
}

impl Identity {
    pub fn new(username: impl Into<Username>, cookie_header: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            cookie_header: cookie_header.into(),
        }
    }

    /// Build an identity from the session tokens returned by the platform login.
    ///
    /// ```rust
    /// use cloud_link::Identity;
    ///
    /// let identity = Identity::from_session("griffpatch", "csrf123", "sess456");
    /// assert_eq!(
    ///     identity.cookie_header(),
    ///     "scratchcsrftoken=csrf123;scratchlanguage=en;scratchsessionsid=sess456;"
    /// );
    /// ```
    pub fn from_session(
        username: impl Into<Username>,
        csrf_token: &str,
        session_id: &str,
    ) -> Self {
        let cookie_header = format!(
            "scratchcsrftoken={};scratchlanguage=en;scratchsessionsid={};",
            csrf_token, session_id
        );
        Self::new(username, cookie_header)
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn cookie_header(&self) -> &str {
        &self.cookie_header
    }

    /// Both the username and the credential cookie are present.
    pub fn is_complete(&self) -> bool {
        !self.username.as_str().trim().is_empty() && !self.cookie_header.trim().is_empty()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("cookie_header", &"<redacted>")
            .finish()
    }
}
