//! Background connection task for one cloud connection.
//!
//! The task owns the physical socket and handles:
//!
//! - Connect + handshake, then a FIFO flush of writes queued while not open
//! - Routing inbound `set` broadcasts into the variable cache and `on_set`
//! - Automatic reconnection with capped exponential backoff and an optional
//!   attempt budget
//! - Keepalive pings
//!
//! The public handle talks to it over an unbounded command channel, so
//! `set_variable` never waits on the socket.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};

use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::{error::Error as WsError, protocol::Message};

use crate::{
    connection::{
        build_request, connect, is_plain_closure, parse_frame, send_message, WebSocketStream,
        FAR_FUTURE,
    },
    error::{CloudLinkError, Result},
    event_handlers::{panic_message, ConnectionError, DisconnectReason, EventHandlers, ReconnectInfo},
    models::{ClientMessage, ConnectionOptions, ConnectionState, Identity, VariableUpdate},
    timeouts::CloudLinkTimeouts,
};

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public handle to the connection task.
#[derive(Debug)]
pub(crate) enum ConnCmd {
    Set(ClientMessage),
    Shutdown,
}

// ── State shared with the public handle ─────────────────────────────────────

pub(crate) struct ConnectionShared {
    variables: RwLock<HashMap<String, String>>,
    state: AtomicU8,
    closed: AtomicBool,
    handlers: RwLock<EventHandlers>,
}

impl ConnectionShared {
    pub(crate) fn new(handlers: EventHandlers) -> Self {
        Self {
            variables: RwLock::new(HashMap::new()),
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            closed: AtomicBool::new(false),
            handlers: RwLock::new(handlers),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Mark the connection as intentionally closed.
    ///
    /// Returns `true` for the first caller only.
    pub(crate) fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Closed);
        first
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn get_variable(&self, name: &str) -> Option<String> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub(crate) fn put_variable(&self, name: String, value: String) {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    pub(crate) fn variables(&self) -> HashMap<String, String> {
        self.variables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add handlers to the live registry.
    pub(crate) fn register(&self, f: impl FnOnce(&mut EventHandlers)) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut handlers);
    }

    /// Snapshot of the registry so callbacks run without holding the lock.
    pub(crate) fn handlers(&self) -> EventHandlers {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything the task needs to (re)connect.
pub(crate) struct TaskConfig {
    pub(crate) identity: Identity,
    pub(crate) project_id: u64,
    pub(crate) options: ConnectionOptions,
    pub(crate) timeouts: CloudLinkTimeouts,
}

/// How a live session ended.
enum SessionEnd {
    Shutdown,
    /// The socket went away; eligible for reconnect.
    Lost(DisconnectReason),
    /// A socket-level fault; the connection is not recovered.
    Failed(String),
}

// ── Background connection task ──────────────────────────────────────────────

async fn establish_ws(config: &TaskConfig, handlers: &EventHandlers) -> Result<WebSocketStream> {
    log::debug!(
        "[cloud-link] Establishing cloud connection to {} for project {}",
        config.options.server_url,
        config.project_id
    );
    let request = build_request(&config.options, &config.identity)?;
    let mut ws = connect(request, &config.timeouts).await?;

    let handshake = ClientMessage::handshake(config.identity.username().as_str(), config.project_id);
    send_message(&mut ws, &handshake, &config.timeouts, handlers).await?;
    log::info!(
        "[cloud-link] Handshake sent for project {} as {}",
        config.project_id,
        config.identity.username()
    );
    Ok(ws)
}

/// Send one write; on failure it goes back to the front of the queue so it
/// is retried first after the next handshake.
async fn send_or_requeue<S>(
    ws: &mut S,
    message: ClientMessage,
    pending: &mut VecDeque<ClientMessage>,
    timeouts: &CloudLinkTimeouts,
    handlers: &EventHandlers,
) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    if let Err(e) = send_message(ws, &message, timeouts, handlers).await {
        pending.push_front(message);
        return Err(e);
    }
    Ok(())
}

/// Send everything queued while the socket was not open, oldest first.
async fn flush_queue<S>(
    ws: &mut S,
    pending: &mut VecDeque<ClientMessage>,
    timeouts: &CloudLinkTimeouts,
    handlers: &EventHandlers,
) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    if !pending.is_empty() {
        log::debug!("[cloud-link] Flushing {} queued write(s)", pending.len());
    }
    while let Some(message) = pending.pop_front() {
        send_or_requeue(ws, message, pending, timeouts, handlers).await?;
    }
    Ok(())
}

/// Reply to a server ping. A failed reply means the socket is gone.
async fn answer_ping<S>(ws: &mut S, payload: Bytes) -> std::result::Result<(), DisconnectReason>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    ws.send(Message::Pong(payload)).await.map_err(|e| {
        log::warn!("[cloud-link] Pong reply failed: {}", e);
        DisconnectReason::new(format!("Pong reply failed: {}", e))
    })
}

fn route_frame(text: &str, shared: &ConnectionShared) {
    let handlers = shared.handlers();
    handlers.emit_receive(text);
    for update in parse_frame(text) {
        let VariableUpdate { name, value } = &update;
        shared.put_variable(name.clone(), value.clone());
        handlers.emit_set(&update);
    }
}

async fn run_session(
    ws: &mut WebSocketStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>,
    pending: &mut VecDeque<ClientMessage>,
    timeouts: &CloudLinkTimeouts,
    shared: &ConnectionShared,
) -> SessionEnd {
    let has_keepalive = !timeouts.keepalive_interval.is_zero();
    let keepalive_dur = if has_keepalive {
        timeouts.keepalive_interval
    } else {
        FAR_FUTURE
    };
    let has_pong_timeout = has_keepalive && !timeouts.pong_timeout.is_zero();
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;
    let mut awaiting_pong = false;
    let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

    loop {
        let idle_sleep = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle_sleep);
        let pong_sleep = tokio::time::sleep_until(pong_deadline);
        tokio::pin!(pong_sleep);

        tokio::select! {
            biased;

            _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                log::warn!(
                    "[cloud-link] Pong timeout ({:?}), server unresponsive",
                    timeouts.pong_timeout,
                );
                return SessionEnd::Lost(DisconnectReason::new(format!(
                    "Pong timeout ({:?})",
                    timeouts.pong_timeout
                )));
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnCmd::Set(message)) => {
                        let handlers = shared.handlers();
                        if let Err(e) = send_or_requeue(ws, message, pending, timeouts, &handlers).await {
                            log::warn!("[cloud-link] Write failed, re-queued: {}", e);
                            return SessionEnd::Lost(DisconnectReason::new(e.to_string()));
                        }
                    },
                    Some(ConnCmd::Shutdown) | None => return SessionEnd::Shutdown,
                }
            }

            _ = &mut idle_sleep, if has_keepalive && !awaiting_pong => {
                if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                    log::warn!("[cloud-link] Keepalive ping failed: {}", e);
                    return SessionEnd::Lost(DisconnectReason::new(format!(
                        "Keepalive ping failed: {}", e
                    )));
                }
                if has_pong_timeout {
                    awaiting_pong = true;
                    pong_deadline = TokioInstant::now() + timeouts.pong_timeout;
                }
                idle_deadline = TokioInstant::now() + keepalive_dur;
            }

            frame = ws.next() => {
                idle_deadline = TokioInstant::now() + keepalive_dur;
                if awaiting_pong {
                    awaiting_pong = false;
                    pong_deadline = TokioInstant::now() + FAR_FUTURE;
                }

                match frame {
                    Some(Ok(Message::Text(text))) => route_frame(text.as_str(), shared),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => route_frame(text, shared),
                        Err(e) => log::debug!("[cloud-link] Ignoring non-UTF-8 binary frame: {}", e),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(reason) = answer_ping(ws, payload).await {
                            return SessionEnd::Lost(reason);
                        }
                    },
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {},
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                            None => DisconnectReason::new("Server closed connection"),
                        };
                        return SessionEnd::Lost(reason);
                    },
                    Some(Err(e)) if is_plain_closure(&e) => {
                        log::warn!("[cloud-link] Connection dropped: {}", e);
                        return SessionEnd::Lost(DisconnectReason::new(format!(
                            "Connection dropped: {}", e
                        )));
                    },
                    Some(Err(e)) => return SessionEnd::Failed(format!("WebSocket error: {}", e)),
                    None => return SessionEnd::Lost(DisconnectReason::new("WebSocket stream ended")),
                }
            }
        }
    }
}

/// Move to the terminal state after an unrecoverable failure.
fn give_up(shared: &ConnectionShared, pending: &VecDeque<ClientMessage>, message: String) {
    log::warn!("[cloud-link] {}", message);
    shared.set_state(ConnectionState::Closed);
    if !pending.is_empty() {
        log::warn!("[cloud-link] Dropping {} queued write(s)", pending.len());
    }
    shared.handlers().emit_error(&ConnectionError::new(message, false));
}

/// Wait out the backoff delay, queueing writes that arrive meanwhile.
///
/// Returns `false` if a shutdown was requested while waiting.
async fn backoff(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>,
    pending: &mut VecDeque<ClientMessage>,
) -> bool {
    let sleep_fut = tokio::time::sleep(delay);
    tokio::pin!(sleep_fut);

    loop {
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnCmd::Set(message)) => pending.push_back(message),
                Some(ConnCmd::Shutdown) | None => return false,
            },
            _ = &mut sleep_fut => return true,
        }
    }
}

pub(crate) async fn connection_task(
    mut cmd_rx: mpsc::UnboundedReceiver<ConnCmd>,
    config: TaskConfig,
    shared: Arc<ConnectionShared>,
) {
    let mut pending: VecDeque<ClientMessage> = VecDeque::new();
    let mut attempts: u32 = 0;
    let mut handshaken = false;

    loop {
        if shared.is_closed() {
            return;
        }

        let handlers = shared.handlers();
        let reason = match establish_ws(&config, &handlers).await {
            Ok(mut ws) => {
                if shared.is_closed() {
                    let _ = ws.close(None).await;
                    return;
                }
                attempts = 0;
                handshaken = true;
                shared.set_state(ConnectionState::Open);
                handlers.emit_connect();

                let end = match flush_queue(&mut ws, &mut pending, &config.timeouts, &handlers).await {
                    Ok(()) => run_session(&mut ws, &mut cmd_rx, &mut pending, &config.timeouts, &shared).await,
                    Err(e) => SessionEnd::Lost(DisconnectReason::new(e.to_string())),
                };

                match end {
                    SessionEnd::Shutdown => {
                        let _ = ws.close(None).await;
                        log::info!("[cloud-link] Connection closed for project {}", config.project_id);
                        return;
                    },
                    SessionEnd::Lost(reason) => reason,
                    SessionEnd::Failed(message) => {
                        give_up(&shared, &pending, message);
                        return;
                    },
                }
            },
            Err(e) if !e.is_recoverable() => {
                give_up(&shared, &pending, format!("Cloud connection failed: {}", e));
                return;
            },
            Err(e) => {
                log::warn!("[cloud-link] Connection attempt failed: {}", e);
                handlers.emit_error(&ConnectionError::new(e.to_string(), true));
                DisconnectReason::new(e.to_string())
            },
        };

        if shared.is_closed() {
            return;
        }
        if !config.options.may_reconnect(attempts) {
            let message = if config.options.auto_reconnect {
                format!("Max reconnection attempts ({}) reached", attempts)
            } else {
                format!("Connection lost and auto-reconnect is disabled: {}", reason)
            };
            give_up(&shared, &pending, message);
            return;
        }

        shared.set_state(ConnectionState::Connecting);
        let delay = config.options.reconnect_delay(attempts);
        attempts += 1;
        log::info!(
            "[cloud-link] Reconnecting in {:?} (attempt {}): {}",
            delay,
            attempts,
            reason
        );
        if handshaken {
            shared.handlers().emit_reconnect(&ReconnectInfo {
                attempt: attempts,
                delay,
                reason,
            });
        }

        if !backoff(delay, &mut cmd_rx, &mut pending).await {
            return;
        }
    }
}

/// Run the connection task and turn a panic inside it into a terminal
/// `on_error` instead of a connection stuck in `Connecting`.
pub(crate) async fn supervise<F>(task: F, shared: Arc<ConnectionShared>)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(task).await {
        if e.is_panic() {
            let detail = panic_message(e.into_panic().as_ref());
            give_up(
                &shared,
                &VecDeque::new(),
                format!("Connection task panicked: {}", detail),
            );
        }
    }
}

/// Returned by the public handle when the task can no longer accept writes.
pub(crate) fn closed_error(shared: &ConnectionShared) -> CloudLinkError {
    if shared.is_closed() {
        CloudLinkError::WebSocketError("Connection was closed".to_string())
    } else {
        CloudLinkError::WebSocketError("Connection task is not running".to_string())
    }
}
