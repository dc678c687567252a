//! WebSocket server: connection lifecycle and request dispatch.
//!
//! Every connection must identify itself first. After that, each binary
//! frame carries one [`ClientMessage::Request`]; the server answers with a
//! [`ServerMessage::Response`] carrying the same request id and pushes live
//! update events for the project channels the connection subscribed to.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::codec::{self, CodecError};
use taskboard_proto::task::UserId;
use taskboard_proto::wire::{ClientMessage, GatewayError, ServerMessage};
use tokio::sync::mpsc;

use crate::broadcast::{ConnectionId, Outbox};
use crate::config::ServerConfig;
use crate::gateway::{Caller, Gateway};
use crate::ratelimit::RateLimiter;

/// Shared server state.
pub struct ServerState {
    /// Store and broadcaster.
    pub gateway: Gateway,
    max_payload_size: usize,
    rate_limit_max: u32,
    rate_limit_window: Duration,
    next_connection: AtomicU64,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates a state with an empty store and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&ServerConfig::default())
    }

    /// Creates a state with the limits of a resolved configuration.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            gateway: Gateway::new(),
            max_payload_size: config.max_payload_size,
            rate_limit_max: config.rate_limit_max,
            rate_limit_window: config.rate_limit_window,
            next_connection: AtomicU64::new(1),
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Wait for `Identify` and register the user.
/// 2. Send `Identified` back.
/// 3. Serve requests until either side closes.
/// 4. Remove the connection from every project channel.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some((user_id, email)) = wait_for_identify(&mut ws_receiver, state.max_payload_size).await
    else {
        tracing::warn!("connection closed before identification");
        return;
    };

    state.gateway.store.register_user(user_id, &email).await;
    let connection = state.next_connection_id();

    if let Err(e) = send_server_msg(&mut ws_sender, &ServerMessage::Identified { user_id }).await {
        tracing::error!(%user_id, error = %e, "failed to send Identified ack");
        return;
    }
    tracing::info!(%user_id, connection, "client identified");

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send_server_msg(&mut ws_sender, &msg).await {
                tracing::warn!(connection, error = %e, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        let mut limiter =
            RateLimiter::new(reader_state.rate_limit_max, reader_state.rate_limit_window);
        let caller = Caller {
            user_id,
            connection,
            outbox: &tx,
        };
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&caller, &data, &reader_state, &mut limiter).await;
                }
                Message::Close(_) => {
                    tracing::info!(connection, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let left = state.gateway.broadcaster.unsubscribe_all(connection).await;
    tracing::info!(%user_id, connection, channels = left, "client disconnected");
}

/// Waits for the first binary frame, expecting `Identify`.
async fn wait_for_identify(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    max_payload_size: usize,
) -> Option<(UserId, String)> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => {
                return match codec::decode_bounded(&data, max_payload_size) {
                    Ok(ClientMessage::Identify { user_id, email }) => Some((user_id, email)),
                    Ok(other) => {
                        tracing::warn!(msg = ?other, "expected Identify, got different message");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to decode identification");
                        None
                    }
                };
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Decodes and serves one frame from an identified connection.
async fn handle_binary_message(
    caller: &Caller<'_>,
    data: &[u8],
    state: &ServerState,
    limiter: &mut RateLimiter,
) {
    let msg = match codec::decode_bounded(data, state.max_payload_size) {
        Ok(m) => m,
        Err(e @ CodecError::FrameTooLarge { .. }) => {
            tracing::warn!(connection = caller.connection, error = %e, "frame exceeds size limit");
            reply(caller.outbox, ServerMessage::Error {
                reason: e.to_string(),
            });
            return;
        }
        Err(e) => {
            tracing::warn!(connection = caller.connection, error = %e, "failed to decode message");
            return;
        }
    };

    match msg {
        ClientMessage::Request { request_id, body } => {
            let result = if limiter.check() {
                state.gateway.handle(caller, body).await
            } else {
                tracing::warn!(connection = caller.connection, request_id, "rate limited");
                Err(GatewayError::RateLimited)
            };
            if let Err(e) = &result {
                tracing::debug!(request_id, error = %e, "request failed");
            }
            reply(caller.outbox, ServerMessage::Response { request_id, result });
        }
        ClientMessage::Identify { .. } => {
            tracing::warn!(
                connection = caller.connection,
                "received duplicate Identify from identified client"
            );
        }
    }
}

fn reply(outbox: &Outbox, msg: ServerMessage) {
    if outbox.send(msg).is_err() {
        tracing::debug!("connection writer gone, dropping reply");
    }
}

/// Encodes and sends a [`ServerMessage`] over the WebSocket sink.
async fn send_server_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let bytes = codec::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the server on the given address with default state and returns
/// the bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a pre-configured [`ServerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the server in-process for testing on `127.0.0.1:0`.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
