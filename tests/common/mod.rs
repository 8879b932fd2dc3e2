//! In-process cloud server used by the integration tests.
//!
//! Accepts WebSocket connections on `127.0.0.1:0`, records the upgrade
//! headers and every line the client sends, and lets a test push broadcast
//! lines, ping the client, stop reading, write raw bytes or drop the socket
//! without a close handshake.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    handshake::server::{ErrorResponse, Request, Response},
    http::StatusCode,
    protocol::Message,
};

pub const WAIT: Duration = Duration::from_secs(5);

static LOGGER: Once = Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn: usize,
        cookie: Option<String>,
        origin: Option<String>,
    },
    Line {
        conn: usize,
        line: Value,
    },
    Disconnected {
        conn: usize,
    },
    Pong {
        conn: usize,
        payload: Vec<u8>,
    },
    /// Upgrade answered with an HTTP error instead of 101.
    Rejected {
        status: u16,
    },
}

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Answer every upgrade with this HTTP status.
    pub reject_status: Option<u16>,
}

enum Control {
    Send(String),
    Ping(Vec<u8>),
    Raw(Vec<u8>),
    Stall,
    Drop,
}

pub struct MockCloudServer {
    pub url: String,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    connections: Arc<Mutex<Vec<mpsc::UnboundedSender<Control>>>>,
}

impl MockCloudServer {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let (event_tx, events) = mpsc::unbounded_channel();
        let connections: Arc<Mutex<Vec<mpsc::UnboundedSender<Control>>>> = Arc::default();

        let registry = connections.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let mut cookie = None;
                let mut origin = None;
                let reject_status = options.reject_status;
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let header = |name: &str| {
                        req.headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string)
                    };
                    cookie = header("cookie");
                    origin = header("origin");
                    match reject_status {
                        Some(status) => {
                            let mut rejection = ErrorResponse::new(Some("rejected".to_string()));
                            *rejection.status_mut() = StatusCode::from_u16(status).unwrap();
                            Err(rejection)
                        },
                        None => Ok(resp),
                    }
                };
                let accepted = tokio_tungstenite::accept_hdr_async(tcp, callback).await;
                let Ok(ws) = accepted else {
                    if let Some(status) = reject_status {
                        let _ = event_tx.send(ServerEvent::Rejected { status });
                    }
                    continue;
                };

                let (control_tx, control_rx) = mpsc::unbounded_channel();
                let conn = {
                    let mut registry = registry.lock().unwrap();
                    registry.push(control_tx);
                    registry.len() - 1
                };
                let _ = event_tx.send(ServerEvent::Connected { conn, cookie, origin });
                tokio::spawn(serve_connection(conn, ws, control_rx, event_tx.clone()));
            }
        });

        Self {
            url: format!("ws://{}", addr),
            events,
            connections,
        }
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("server event channel closed")
    }

    /// Next event if one arrives within `within`.
    pub async fn try_next_event(&mut self, within: Duration) -> Option<ServerEvent> {
        tokio::time::timeout(within, self.events.recv()).await.ok().flatten()
    }

    pub async fn expect_connected(&mut self) -> (usize, Option<String>, Option<String>) {
        match self.next_event().await {
            ServerEvent::Connected { conn, cookie, origin } => (conn, cookie, origin),
            other => panic!("expected connection, got {:?}", other),
        }
    }

    pub async fn expect_line(&mut self) -> Value {
        match self.next_event().await {
            ServerEvent::Line { line, .. } => line,
            other => panic!("expected line, got {:?}", other),
        }
    }

    pub async fn expect_disconnected(&mut self) -> usize {
        loop {
            match self.next_event().await {
                ServerEvent::Disconnected { conn } => return conn,
                ServerEvent::Line { .. } => continue,
                other => panic!("expected disconnect, got {:?}", other),
            }
        }
    }

    /// Broadcast one raw frame to connection `conn`.
    pub fn broadcast(&self, conn: usize, frame: impl Into<String>) {
        let connections = self.connections.lock().unwrap();
        let _ = connections[conn].send(Control::Send(frame.into()));
    }

    pub fn broadcast_set(&self, conn: usize, name: &str, value: &str) {
        let line = serde_json::json!({ "method": "set", "name": name, "value": value });
        self.broadcast(conn, format!("{}\n", line));
    }

    /// Send a WebSocket ping carrying `payload`.
    pub fn ping(&self, conn: usize, payload: &[u8]) {
        let connections = self.connections.lock().unwrap();
        let _ = connections[conn].send(Control::Ping(payload.to_vec()));
    }

    /// Write bytes straight to the TCP stream, bypassing framing.
    pub fn send_raw(&self, conn: usize, bytes: &[u8]) {
        let connections = self.connections.lock().unwrap();
        let _ = connections[conn].send(Control::Raw(bytes.to_vec()));
    }

    /// Stop reading from connection `conn`, so pings go unanswered.
    pub fn stall(&self, conn: usize) {
        let connections = self.connections.lock().unwrap();
        let _ = connections[conn].send(Control::Stall);
    }

    /// Drop connection `conn` without a close handshake.
    pub fn drop_connection(&self, conn: usize) {
        let connections = self.connections.lock().unwrap();
        let _ = connections[conn].send(Control::Drop);
    }
}

async fn serve_connection(
    conn: usize,
    mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut stalled = false;
    loop {
        tokio::select! {
            frame = ws.next(), if !stalled => match frame {
                Some(Ok(Message::Text(text))) => {
                    for raw in text.as_str().split('\n').filter(|l| !l.trim().is_empty()) {
                        let line = serde_json::from_str(raw).expect("client sent invalid JSON");
                        let _ = event_tx.send(ServerEvent::Line { conn, line });
                    }
                },
                Some(Ok(Message::Pong(payload))) => {
                    let _ = event_tx.send(ServerEvent::Pong { conn, payload: payload.to_vec() });
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {},
            },
            control = control_rx.recv() => match control {
                Some(Control::Send(text)) => {
                    let _ = ws.send(Message::Text(text.into())).await;
                },
                Some(Control::Ping(payload)) => {
                    let _ = ws.send(Message::Ping(payload.into())).await;
                },
                Some(Control::Raw(bytes)) => {
                    let _ = ws.get_mut().write_all(&bytes).await;
                },
                Some(Control::Stall) => stalled = true,
                Some(Control::Drop) | None => {
                    drop(ws);
                    let _ = event_tx.send(ServerEvent::Disconnected { conn });
                    return;
                },
            },
        }
    }
    let _ = event_tx.send(ServerEvent::Disconnected { conn });
}

/// Address of a listener that accepts TCP connections and hangs up at once.
pub async fn hangup_listener() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            drop(tcp);
        }
    });
    addr
}

/// A `ws://` URL on which nothing is listening.
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{}", addr)
}
