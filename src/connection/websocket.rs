//! Low-level WebSocket helpers: upgrade request construction, connect with
//! timeout and HTTP error mapping, line framing for outbound messages and
//! parsing of inbound broadcast lines.

use std::sync::Once;

use futures_util::{Sink, SinkExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{
        client::IntoClientRequest,
        error::{Error as WsError, ProtocolError},
        handshake::client::Request,
        http::{header, HeaderValue},
        protocol::Message,
    },
    MaybeTlsStream,
};

use crate::{
    error::{CloudLinkError, Result},
    event_handlers::EventHandlers,
    models::{ClientMessage, ConnectionOptions, Identity, ServerMessage, VariableUpdate},
    timeouts::CloudLinkTimeouts,
};

pub(crate) type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the upgrade request carrying the session cookie and origin.
pub(crate) fn build_request(options: &ConnectionOptions, identity: &Identity) -> Result<Request> {
    let mut request = options.server_url.as_str().into_client_request().map_err(|e| {
        CloudLinkError::ConfigurationError(format!(
            "Invalid cloud server URL '{}': {}",
            options.server_url, e
        ))
    })?;

    let cookie = HeaderValue::from_str(identity.cookie_header()).map_err(|e| {
        CloudLinkError::ConfigurationError(format!("Cookie header is not valid: {}", e))
    })?;
    let origin = HeaderValue::from_str(&options.origin).map_err(|e| {
        CloudLinkError::ConfigurationError(format!("Origin '{}' is not valid: {}", options.origin, e))
    })?;

    let headers = request.headers_mut();
    headers.insert(header::COOKIE, cookie);
    headers.insert(header::ORIGIN, origin);
    Ok(request)
}

/// Make a rustls crypto provider available for `wss://` endpoints.
///
/// A provider the application installed itself is left in place.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
    });
}

/// Dial the endpoint, mapping upgrade failures onto the error taxonomy.
///
/// 401/403 responses become [`CloudLinkError::AuthenticationError`], which the
/// reconnect loop treats as terminal.
pub(crate) async fn connect(request: Request, timeouts: &CloudLinkTimeouts) -> Result<WebSocketStream> {
    install_crypto_provider();
    let connect_result = if CloudLinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        Ok(tokio_tungstenite::connect_async(request).await)
    } else {
        tokio::time::timeout(
            timeouts.connection_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
    };

    match connect_result {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(WsError::Http(response))) => {
            let status = response.status().as_u16();
            Err(match status {
                401 => CloudLinkError::AuthenticationError(
                    "Unauthorized: cloud server rejected the session cookie".to_string(),
                ),
                403 => CloudLinkError::AuthenticationError(
                    "Forbidden: cloud server denied access for this origin or user".to_string(),
                ),
                code => CloudLinkError::WebSocketError(format!("WebSocket HTTP error: {}", code)),
            })
        },
        Ok(Err(e)) => Err(CloudLinkError::WebSocketError(format!("Connection failed: {}", e))),
        Err(_) => Err(CloudLinkError::TimeoutError(format!(
            "Connection timeout ({:?})",
            timeouts.connection_timeout
        ))),
    }
}

/// Write one message as a newline-terminated text frame.
pub(crate) async fn send_message<S>(
    ws: &mut S,
    message: &ClientMessage,
    timeouts: &CloudLinkTimeouts,
    handlers: &EventHandlers,
) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let line = message.to_line()?;
    handlers.emit_send(&line);

    let send = ws.send(Message::Text(line.into()));
    let result = if CloudLinkTimeouts::is_no_timeout(timeouts.send_timeout) {
        send.await
    } else {
        match tokio::time::timeout(timeouts.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => {
                return Err(CloudLinkError::TimeoutError(format!(
                    "Send timeout ({:?})",
                    timeouts.send_timeout
                )))
            },
        }
    };
    result.map_err(|e| CloudLinkError::WebSocketError(format!("Failed to send: {}", e)))
}

/// Whether a read error means the peer went away, as opposed to a fault on
/// the socket itself.
///
/// Closures are followed by an automatic reconnect; any other stream error
/// ends the connection.
pub(crate) fn is_plain_closure(err: &WsError) -> bool {
    matches!(
        err,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

/// Parse one inbound line.
///
/// Blank lines, malformed JSON and methods other than `set` are inert.
pub(crate) fn parse_line(line: &str) -> Option<VariableUpdate> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<ServerMessage>(line) {
        Ok(message) => message.into_update(),
        Err(e) => {
            log::debug!("[cloud-link] Ignoring malformed cloud message: {}", e);
            None
        },
    }
}

/// Split a frame into lines and parse each independently.
pub(crate) fn parse_frame(text: &str) -> Vec<VariableUpdate> {
    text.split('\n').filter_map(parse_line).collect()
}
