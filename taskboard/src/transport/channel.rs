//! WebSocket client for the taskboard server.
//!
//! One socket multiplexes request/response pairs (correlated by request id)
//! and live update events (dispatched to registered handlers by kind). A
//! background reader task owns the read half; writes are serialized through
//! a shared sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use taskboard_proto::codec;
use taskboard_proto::event::{EventKind, LiveUpdateEvent};
use taskboard_proto::task::{
    Member, ProjectId, ProjectSummary, TaskDraft, TaskId, TaskPatch, TaskRecord,
};
use taskboard_proto::wire::{ClientMessage, GatewayError, RequestBody, RequestId, ResponseBody, ServerMessage};
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::TransportError;
use crate::gateway::{LiveFeed, PersistenceGateway};
use crate::observer::{Observers, SubscriptionToken};
use crate::session::Session;

/// Write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

type Reply = oneshot::Sender<Result<ResponseBody, GatewayError>>;
type PendingReplies = Arc<parking_lot::Mutex<HashMap<RequestId, Reply>>>;

/// Default timeout for connecting to the server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the `Identified` acknowledgment.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of the taskboard WebSocket.
pub struct ChannelClient {
    session: Session,
    ws_sender: Arc<Mutex<WsSender>>,
    pending: PendingReplies,
    next_request: AtomicU64,
    events: Arc<Observers<EventKind, LiveUpdateEvent>>,
    connected: Arc<AtomicBool>,
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl ChannelClient {
    /// Connects to the session's server and identifies the user.
    ///
    /// # Errors
    ///
    /// - [`TransportError::InvalidUrl`] if the URL is not `ws://` or `wss://`.
    /// - [`TransportError::Timeout`] if connecting or identifying times out.
    /// - [`TransportError::Unreachable`] if nothing listens at the address.
    /// - [`TransportError::Rejected`] if the server refuses the identity.
    pub async fn connect(session: &Session, connect_timeout: Duration) -> Result<Self, TransportError> {
        let server_url = session.server_url();
        validate_url(server_url)?;

        let (ws_stream, _response) = tokio::time::timeout(connect_timeout, connect_async(server_url))
            .await
            .map_err(|_| {
                tracing::warn!(url = server_url, "WebSocket connect timed out");
                TransportError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = server_url, err = %e, "WebSocket connect failed");
                map_ws_connect_error(server_url, e)
            })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let identify = ClientMessage::Identify {
            user_id: session.user_id(),
            email: session.email().to_string(),
        };
        let bytes = codec::encode(&identify).map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
        ws_sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| TransportError::Io(std::io::Error::other(format!("failed to send Identify: {e}"))))?;

        let ack = tokio::time::timeout(IDENTIFY_TIMEOUT, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url = server_url, "identify acknowledgment timed out");
                TransportError::Timeout
            })?;
        match ack {
            Some(Ok(Message::Binary(data))) => match codec::decode::<ServerMessage>(&data) {
                Ok(ServerMessage::Identified { user_id }) => {
                    tracing::info!(%user_id, url = server_url, "identified with server");
                }
                Ok(ServerMessage::Error { reason }) => return Err(TransportError::Rejected(reason)),
                Ok(other) => {
                    tracing::warn!(?other, "unexpected message during identification");
                    return Err(TransportError::Io(std::io::Error::other(
                        "unexpected response during identification",
                    )));
                }
                Err(e) => {
                    return Err(TransportError::Io(std::io::Error::other(format!(
                        "malformed identification response: {e}"
                    ))));
                }
            },
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::ConnectionClosed),
            Some(Ok(_)) => {
                return Err(TransportError::Io(std::io::Error::other(
                    "unexpected non-binary frame during identification",
                )));
            }
            Some(Err(e)) => {
                return Err(TransportError::Io(std::io::Error::other(format!(
                    "WebSocket error during identification: {e}"
                ))));
            }
        }

        let pending: PendingReplies = Arc::default();
        let events = Arc::new(Observers::new());
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&pending),
            Arc::clone(&events),
            Arc::clone(&connected),
        ));

        Ok(Self {
            session: session.clone(),
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            pending,
            next_request: AtomicU64::new(1),
            events,
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// The session this client identified with.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns `true` while the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// Returns the server's error, or [`GatewayError::NetworkFailure`] if
    /// the connection is or becomes closed.
    pub async fn request(&self, body: RequestBody) -> Result<ResponseBody, GatewayError> {
        if !self.is_connected() {
            return Err(closed());
        }
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let bytes = codec::encode(&ClientMessage::Request { request_id, body })
            .map_err(|e| GatewayError::NetworkFailure(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        let sent = {
            let mut sender = self.ws_sender.lock().await;
            sender.send(Message::Binary(bytes.into())).await
        };
        if let Err(e) = sent {
            tracing::warn!(request_id, err = %e, "request send failed");
            self.pending.lock().remove(&request_id);
            self.connected.store(false, Ordering::Relaxed);
            return Err(closed());
        }

        rx.await.unwrap_or_else(|_| Err(closed()))
    }

    /// Creates a project owned by the session user.
    ///
    /// # Errors
    ///
    /// Returns the server's error.
    pub async fn create_project(&self, name: &str) -> Result<ProjectId, GatewayError> {
        match self
            .request(RequestBody::CreateProject {
                name: name.to_string(),
            })
            .await?
        {
            ResponseBody::ProjectCreated { project_id } => Ok(project_id),
            other => Err(unexpected(&other)),
        }
    }

    /// Adds a registered user to a project by email.
    ///
    /// # Errors
    ///
    /// Returns the server's error.
    pub async fn invite_member(&self, project_id: ProjectId, email: &str) -> Result<Member, GatewayError> {
        match self
            .request(RequestBody::InviteMember {
                project_id,
                email: email.to_string(),
            })
            .await?
        {
            ResponseBody::MemberAdded(member) => Ok(member),
            other => Err(unexpected(&other)),
        }
    }

    /// Deletes a project and all its tasks.
    ///
    /// # Errors
    ///
    /// Returns the server's error.
    pub async fn delete_project(&self, project_id: ProjectId) -> Result<(), GatewayError> {
        match self.request(RequestBody::DeleteProject { project_id }).await? {
            ResponseBody::ProjectDeleted => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Lists the projects the session user owns or belongs to.
    ///
    /// # Errors
    ///
    /// Returns the server's error.
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, GatewayError> {
        match self.request(RequestBody::ListProjects).await? {
            ResponseBody::Projects(projects) => Ok(projects),
            other => Err(unexpected(&other)),
        }
    }

    /// Renames a project.
    ///
    /// # Errors
    ///
    /// Returns the server's error.
    pub async fn rename_project(&self, project_id: ProjectId, name: &str) -> Result<ProjectSummary, GatewayError> {
        match self
            .request(RequestBody::RenameProject {
                project_id,
                name: name.to_string(),
            })
            .await?
        {
            ResponseBody::ProjectRenamed(project) => Ok(project),
            other => Err(unexpected(&other)),
        }
    }

    /// Finds registered users by email fragment.
    ///
    /// # Errors
    ///
    /// Returns the server's error.
    pub async fn search_users(&self, query: &str) -> Result<Vec<Member>, GatewayError> {
        match self
            .request(RequestBody::SearchUsers {
                query: query.to_string(),
            })
            .await?
        {
            ResponseBody::Users(users) => Ok(users),
            other => Err(unexpected(&other)),
        }
    }

    /// Sends a close frame.
    pub async fn close(&self) {
        let mut sender = self.ws_sender.lock().await;
        if let Err(e) = sender.send(Message::Close(None)).await {
            tracing::debug!(err = %e, "close frame not sent");
        }
        self.connected.store(false, Ordering::Relaxed);
    }
}

impl PersistenceGateway for ChannelClient {
    async fn create_task(&self, draft: TaskDraft) -> Result<TaskRecord, GatewayError> {
        match self.request(RequestBody::CreateTask(draft)).await? {
            ResponseBody::Task(record) => Ok(record),
            other => Err(unexpected(&other)),
        }
    }

    async fn update_task(&self, task_id: TaskId, patch: TaskPatch) -> Result<TaskRecord, GatewayError> {
        match self.request(RequestBody::UpdateTask { task_id, patch }).await? {
            ResponseBody::Task(record) => Ok(record),
            other => Err(unexpected(&other)),
        }
    }

    async fn delete_task(&self, task_id: TaskId) -> Result<(), GatewayError> {
        match self.request(RequestBody::DeleteTask { task_id }).await? {
            ResponseBody::Deleted => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn list_tasks(&self, project_id: ProjectId) -> Result<Vec<TaskRecord>, GatewayError> {
        match self.request(RequestBody::ListTasks { project_id }).await? {
            ResponseBody::Tasks(records) => Ok(records),
            other => Err(unexpected(&other)),
        }
    }

    async fn list_members(&self, project_id: ProjectId) -> Result<Vec<Member>, GatewayError> {
        match self.request(RequestBody::ListMembers { project_id }).await? {
            ResponseBody::Members(members) => Ok(members),
            other => Err(unexpected(&other)),
        }
    }
}

impl LiveFeed for ChannelClient {
    async fn join(&self, project_id: ProjectId) -> Result<(), GatewayError> {
        match self.request(RequestBody::Subscribe { project_id }).await? {
            ResponseBody::Subscribed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn leave(&self, project_id: ProjectId) -> Result<(), GatewayError> {
        match self.request(RequestBody::Unsubscribe { project_id }).await? {
            ResponseBody::Unsubscribed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn subscribe(
        &self,
        kind: Option<EventKind>,
        handler: impl Fn(&LiveUpdateEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.events.subscribe(kind, handler)
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.events.unsubscribe(token)
    }
}

/// Reads server frames until the socket closes.
///
/// Responses complete their pending request; events go to the handlers
/// registered for their kind. Malformed frames are logged and skipped. On
/// exit every pending request fails with a network failure.
async fn reader_loop(
    mut ws_reader: WsReader,
    pending: PendingReplies,
    events: Arc<Observers<EventKind, LiveUpdateEvent>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match codec::decode::<ServerMessage>(&data) {
                Ok(ServerMessage::Response { request_id, result }) => {
                    let reply = pending.lock().remove(&request_id);
                    match reply {
                        Some(reply) => {
                            // The requester may have given up.
                            let _ = reply.send(result);
                        }
                        None => tracing::debug!(request_id, "response for unknown request"),
                    }
                }
                Ok(ServerMessage::Event(event)) => {
                    let handled = events.notify(event.kind(), &event);
                    tracing::trace!(kind = %event.kind(), project_id = %event.project_id, handled, "live update");
                }
                Ok(ServerMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "server error");
                }
                Ok(ServerMessage::Identified { .. }) => {
                    tracing::debug!("duplicate Identified ignored");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    let orphaned: Vec<Reply> = pending.lock().drain().map(|(_, reply)| reply).collect();
    for reply in orphaned {
        let _ = reply.send(Err(closed()));
    }
    tracing::info!("reader task exiting");
}

fn closed() -> GatewayError {
    GatewayError::NetworkFailure("connection closed".to_string())
}

fn unexpected(body: &ResponseBody) -> GatewayError {
    GatewayError::NetworkFailure(format!("unexpected response: {body:?}"))
}

/// Checks that `server_url` parses as a `ws://` or `wss://` URL.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] otherwise.
pub fn validate_url(server_url: &str) -> Result<url::Url, TransportError> {
    let parsed = url::Url::parse(server_url).map_err(|e| TransportError::InvalidUrl {
        url: server_url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        scheme => Err(TransportError::InvalidUrl {
            url: server_url.to_string(),
            reason: format!("expected ws or wss scheme, got {scheme}"),
        }),
    }
}

fn map_ws_connect_error(url: &str, err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(url.to_string())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Http(response) => TransportError::Io(std::io::Error::other(format!(
            "server HTTP error: status {}",
            response.status()
        ))),
        other => TransportError::Io(std::io::Error::other(format!(
            "connection error: {other}"
        ))),
    }
}
