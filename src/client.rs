//! Cloud connection handle with builder pattern.
//!
//! A [`CloudConnection`] is bound to one project and one identity. Building
//! it spawns the background connection task and returns immediately; writes
//! made before the handshake completes are queued and flushed in order once
//! the socket is open.

use std::{collections::HashMap, fmt, sync::Arc};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    connection::{closed_error, connection_task, supervise, ConnCmd, ConnectionShared, TaskConfig},
    error::{CloudLinkError, Result},
    event_handlers::{ConnectionError, EventHandlers, ReconnectInfo},
    models::{
        canonical_name, ClientMessage, ConnectionOptions, ConnectionState, Identity, Username,
        VariableUpdate,
    },
    timeouts::CloudLinkTimeouts,
};

/// Live connection to the cloud broadcast channel of one project.
///
/// # Examples
///
/// ```rust,no_run
/// use cloud_link::{CloudConnection, Identity};
///
/// # async fn example() -> cloud_link::Result<()> {
/// let identity = Identity::from_session("griffpatch", "csrf-token", "session-id");
/// let cloud = CloudConnection::builder()
///     .identity(identity)
///     .project_id(10128407)
///     .build()?;
///
/// // Queued until the handshake completes, then sent in order
/// cloud.set_variable("score", 42)?;
/// assert_eq!(cloud.get_variable("score").as_deref(), Some("42"));
///
/// cloud.close();
/// # Ok(())
/// # }
/// ```
pub struct CloudConnection {
    username: Username,
    project_id: u64,
    cmd_tx: mpsc::UnboundedSender<ConnCmd>,
    shared: Arc<ConnectionShared>,
    _task: JoinHandle<()>,
}

impl fmt::Debug for CloudConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConnection")
            .field("username", &self.username)
            .field("project_id", &self.project_id)
            .field("state", &self.state())
            .finish()
    }
}

impl CloudConnection {
    /// Create a new builder for configuring the connection
    pub fn builder() -> CloudConnectionBuilder {
        CloudConnectionBuilder::new()
    }

    /// Connect with default options.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(identity: Identity, project_id: u64) -> Result<Self> {
        Self::builder().identity(identity).project_id(project_id).build()
    }

    /// Set a cloud variable.
    ///
    /// The name gets the `☁ ` prefix if it lacks one. The local cache is
    /// updated right away; the write is sent immediately when the socket is
    /// open and queued otherwise. Nothing waits for the server.
    pub fn set_variable(&self, name: &str, value: impl fmt::Display) -> Result<()> {
        if self.shared.state() == ConnectionState::Closed {
            return Err(closed_error(&self.shared));
        }

        let name = canonical_name(name);
        let value = value.to_string();
        self.shared.put_variable(name.clone(), value.clone());

        let message = ClientMessage::set(self.username.as_str(), name, value, self.project_id);
        self.cmd_tx
            .send(ConnCmd::Set(message))
            .map_err(|_| closed_error(&self.shared))
    }

    /// Last known value of a cloud variable, with or without the `☁ ` prefix.
    pub fn get_variable(&self, name: &str) -> Option<String> {
        self.shared.get_variable(&canonical_name(name))
    }

    /// Snapshot of every cached variable, keyed by canonical name.
    pub fn variables(&self) -> HashMap<String, String> {
        self.shared.variables()
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Idempotent: `on_close` handlers fire on the first call only. Close is
    /// best-effort, not a barrier; a write racing with it may or may not
    /// reach the wire.
    pub fn close(&self) {
        if self.shared.mark_closed() {
            log::info!("[cloud-link] Closing connection for project {}", self.project_id);
            self.shared.handlers().emit_close();
            let _ = self.cmd_tx.send(ConnCmd::Shutdown);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the handshake has completed on the current socket.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn project_id(&self) -> u64 {
        self.project_id
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    /// Register an `on_connect` handler on the live connection.
    pub fn on_connect(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.register(|h| h.on_connect.push(Arc::new(f)));
    }

    /// Register an `on_set` handler on the live connection.
    pub fn on_set(&self, f: impl Fn(&VariableUpdate) + Send + Sync + 'static) {
        self.shared.register(|h| h.on_set.push(Arc::new(f)));
    }

    pub fn on_reconnect(&self, f: impl Fn(&ReconnectInfo) + Send + Sync + 'static) {
        self.shared.register(|h| h.on_reconnect.push(Arc::new(f)));
    }

    pub fn on_error(&self, f: impl Fn(&ConnectionError) + Send + Sync + 'static) {
        self.shared.register(|h| h.on_error.push(Arc::new(f)));
    }

    pub fn on_close(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.register(|h| h.on_close.push(Arc::new(f)));
    }
}

impl Drop for CloudConnection {
    fn drop(&mut self) {
        self.shared.mark_closed();
        let _ = self.cmd_tx.send(ConnCmd::Shutdown);
    }
}

/// Builder for [`CloudConnection`].
#[derive(Debug)]
pub struct CloudConnectionBuilder {
    identity: Option<Identity>,
    project_id: Option<u64>,
    options: ConnectionOptions,
    timeouts: CloudLinkTimeouts,
    event_handlers: EventHandlers,
}

impl CloudConnectionBuilder {
    fn new() -> Self {
        Self {
            identity: None,
            project_id: None,
            options: ConnectionOptions::default(),
            timeouts: CloudLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
        }
    }

    /// Authenticated identity the connection runs as. Required.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Project whose cloud variables to join. Required.
    pub fn project_id(mut self, project_id: u64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Set connection options (endpoint, origin, reconnect policy)
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Shorthand for overriding only the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.options.server_url = url.into();
        self
    }

    pub fn timeouts(mut self, timeouts: CloudLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Handlers registered before the first connection attempt, so no
    /// early event is missed.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Validate the configuration and spawn the connection task.
    ///
    /// Fails with [`CloudLinkError::AuthRequired`] before any network
    /// activity if no complete identity was given.
    pub fn build(self) -> Result<CloudConnection> {
        let identity = match self.identity {
            Some(identity) if identity.is_complete() => identity,
            Some(_) => {
                return Err(CloudLinkError::AuthRequired(
                    "identity needs both a username and a session cookie".to_string(),
                ))
            },
            None => {
                return Err(CloudLinkError::AuthRequired(
                    "cloud connections require a logged-in identity".to_string(),
                ))
            },
        };
        let project_id = self.project_id.ok_or_else(|| {
            CloudLinkError::ConfigurationError("project_id is required".to_string())
        })?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CloudLinkError::ConfigurationError(
                "CloudConnection must be built inside a tokio runtime".to_string(),
            )
        })?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ConnectionShared::new(self.event_handlers));
        let username = identity.username().clone();
        let config = TaskConfig {
            identity,
            project_id,
            options: self.options,
            timeouts: self.timeouts,
        };

        let task = runtime.spawn(supervise(
            connection_task(cmd_rx, config, shared.clone()),
            shared.clone(),
        ));

        Ok(CloudConnection {
            username,
            project_id,
            cmd_tx,
            shared,
            _task: task,
        })
    }
}
