//! WebSocket event channel for live chat analysis.
//!
//! The `/ws` endpoint upgrades an HTTP connection to a WebSocket. Once
//! connected:
//!
//! - **Rooms:** `join` subscribes the connection to a session room; chat
//!   messages from other members arrive as `peer_message` events.
//! - **Analysis:** every `message` frame is relayed to the room and analyzed
//!   in its own task. Exactly one `analysis_result` comes back per message,
//!   carrying a failed result when analysis fails.
//! - **Lifecycle:** `end` ends the session and closes its room for everyone.
//!
//! All outbound events go through one bounded queue drained by a writer
//! task. A connection that closes early only loses the deliveries; analysis
//! already in flight keeps running and still fills the cache.

use std::collections::HashMap;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use echo_core::analysis::AnalysisRequest;
use echo_core::session::{ConnectionId, RoomEvent};
use echo_observe::attrs;
use echo_types::analysis::{AnalysisKey, AnalysisKind, AnalysisResult};
use echo_types::error::{AnalysisError, SessionError};
use echo_types::event::{ClientEvent, ServerEvent};

use crate::state::AppState;

/// Outbound events buffered per connection before senders wait.
const OUTBOUND_CAPACITY: usize = 64;

/// Upgrade an HTTP request to an event-channel connection.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);
    let shutdown = state.shutdown.clone();
    let mut conn = Connection::new(state, out_tx);

    let span = tracing::info_span!(attrs::WS_CONNECTION_SPAN, { attrs::CONNECTION_ID } = conn.id);

    async move {
        tracing::debug!("Event channel connected");

        tokio::spawn(
            async move {
                while let Some(event) = out_rx.recv().await {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(error = %err, "Failed to serialize server event");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                let _ = sink.close().await;
            }
            .in_current_span(),
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => conn.handle_text(text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "Event channel receive error");
                        break;
                    }
                    // Binary frames are ignored; ping/pong is answered by axum.
                    Some(Ok(_)) => {}
                },
            }
        }

        drop(conn);
        tracing::debug!("Event channel closed");
    }
    .instrument(span)
    .await;
}

/// Per-connection state: the outbound queue and joined rooms.
///
/// Dropping it stops every room forwarder, which prunes empty rooms.
struct Connection {
    id: ConnectionId,
    state: AppState,
    out: mpsc::Sender<ServerEvent>,
    joined: HashMap<String, CancellationToken>,
}

impl Connection {
    fn new(state: AppState, out: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: state.rooms.connection_id(),
            state,
            out,
            joined: HashMap::new(),
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring malformed event-channel frame");
                self.send(ServerEvent::Error {
                    message: format!("Invalid event: {err}"),
                })
                .await;
                return;
            }
        };

        match event {
            ClientEvent::Join { session_id } => self.join(session_id.trim()).await,
            ClientEvent::Message {
                session_id,
                text,
                message_id,
            } => self.message(session_id.trim(), text, message_id),
            ClientEvent::Leave { session_id } => self.leave(session_id.trim()).await,
            ClientEvent::End { session_id } => self.end(session_id.trim()).await,
            ClientEvent::Ping => self.send(ServerEvent::Pong).await,
        }
    }

    async fn send(&self, event: ServerEvent) {
        if self.out.send(event).await.is_err() {
            tracing::debug!("Outbound queue closed");
        }
    }

    fn is_joined(&self, session_id: &str) -> bool {
        self.joined
            .get(session_id)
            .is_some_and(|stop| !stop.is_cancelled())
    }

    async fn join(&mut self, session_id: &str) {
        if session_id.is_empty() {
            self.send(required_session_error()).await;
            return;
        }

        let session_known = match self.state.sessions.get_session(session_id).await {
            Ok(session) => session.is_some(),
            Err(err) => {
                tracing::warn!({ attrs::SESSION_ID } = session_id, error = %err, "Session lookup failed");
                false
            }
        };

        if !self.is_joined(session_id) {
            let stop = CancellationToken::new();
            let rx = self.state.rooms.subscribe(session_id);
            tokio::spawn(
                forward_room(
                    self.state.clone(),
                    session_id.to_string(),
                    rx,
                    self.id,
                    self.out.clone(),
                    stop.clone(),
                )
                .in_current_span(),
            );
            self.joined.insert(session_id.to_string(), stop);
            tracing::debug!({ attrs::SESSION_ID } = session_id, "Joined session room");
        }

        self.send(ServerEvent::Joined {
            session_id: session_id.to_string(),
            session_known,
        })
        .await;
    }

    /// Relay to the room, then analyze in a task of its own.
    fn message(&mut self, session_id: &str, text: String, message_id: Option<String>) {
        let message_id = message_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        if !session_id.is_empty() {
            self.state.rooms.publish(
                session_id,
                Some(self.id),
                ServerEvent::PeerMessage {
                    session_id: session_id.to_string(),
                    message_id: message_id.clone(),
                    text: text.clone(),
                },
            );
        }

        let span = tracing::info_span!(
            "ws.analysis",
            { attrs::SESSION_ID } = session_id,
            { attrs::MESSAGE_ID } = %message_id,
            { attrs::ANALYSIS_KIND } = %AnalysisKind::Quick,
            { attrs::ANALYSIS_ORIGIN } = tracing::field::Empty,
        );

        tokio::spawn(
            analyze_message(
                self.state.clone(),
                self.out.clone(),
                session_id.to_string(),
                message_id,
                text,
            )
            .instrument(span),
        );
    }

    async fn leave(&mut self, session_id: &str) {
        if let Some(stop) = self.joined.remove(session_id) {
            stop.cancel();
            tracing::debug!({ attrs::SESSION_ID } = session_id, "Left session room");
        }
        self.send(ServerEvent::Left {
            session_id: session_id.to_string(),
        })
        .await;
    }

    async fn end(&mut self, session_id: &str) {
        match self.state.sessions.end_session(session_id).await {
            Ok(session) => {
                // Members, this connection included, hear it through the room.
                let joined = self.is_joined(&session.id);
                self.state.rooms.close(&session.id);
                if !joined {
                    self.send(ServerEvent::SessionEnded {
                        session_id: session.id,
                    })
                    .await;
                }
            }
            Err(err) => {
                self.send(ServerEvent::Error {
                    message: session_failure(&err),
                })
                .await;
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for (_, stop) in self.joined.drain() {
            stop.cancel();
        }
    }
}

/// Copy room events to one connection's queue, skipping its own relays.
async fn forward_room(
    state: AppState,
    session_id: String,
    mut rx: broadcast::Receiver<RoomEvent>,
    me: ConnectionId,
    out: mpsc::Sender<ServerEvent>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            received = rx.recv() => match received {
                Ok(RoomEvent { from, .. }) if from == Some(me) => {}
                Ok(RoomEvent { event, .. }) => {
                    if out.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, { attrs::SESSION_ID } = %session_id, "Room subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    stop.cancel();
    drop(rx);
    state.rooms.prune(&session_id);
}

/// Analyze one chat message and queue exactly one `analysis_result`.
async fn analyze_message(
    state: AppState,
    out: mpsc::Sender<ServerEvent>,
    session_id: String,
    message_id: String,
    text: String,
) {
    let kind = AnalysisKind::Quick;
    let request = AnalysisRequest {
        session_id: Some(session_id.clone()).filter(|id| !id.is_empty()),
        text: text.clone(),
        kind,
    };

    let event = match state.analysis.analyze(request).await {
        Ok(resolved) => {
            tracing::Span::current().record(
                attrs::ANALYSIS_ORIGIN,
                tracing::field::debug(resolved.origin),
            );
            ServerEvent::AnalysisResult {
                session_id,
                message_id,
                cached: resolved.cached(),
                result: resolved.result,
            }
        }
        Err(err) => {
            match &err {
                AnalysisError::Validation(_) => tracing::debug!(error = %err, "Rejected message"),
                _ => tracing::warn!(error = %err, "Message analysis failed"),
            }
            let scope = Some(session_id.as_str()).filter(|id| !id.is_empty());
            let key = AnalysisKey::derive(scope, &text, kind);
            ServerEvent::AnalysisResult {
                session_id,
                message_id,
                cached: false,
                result: AnalysisResult::failed(key, kind, analysis_failure(&err)),
            }
        }
    };

    if out.send(event).await.is_err() {
        tracing::debug!("Connection closed before the analysis result was delivered");
    }
}

/// Client-facing reason for a failed analysis. Details stay in the logs.
fn analysis_failure(err: &AnalysisError) -> String {
    match err {
        AnalysisError::Validation(msg) => msg.clone(),
        AnalysisError::Provider(_) => "analysis provider unavailable".to_string(),
        AnalysisError::Internal(_) => "internal error".to_string(),
    }
}

fn session_failure(err: &SessionError) -> String {
    match err {
        SessionError::NotFound => "Session not found".to_string(),
        SessionError::Validation(msg) => msg.clone(),
        SessionError::Ended(id) => format!("Session '{id}' has ended"),
        SessionError::Store(_) => {
            tracing::error!(error = %err, "Session store error");
            "internal error".to_string()
        }
    }
}

fn required_session_error() -> ServerEvent {
    ServerEvent::Error {
        message: "sessionId is required".to_string(),
    }
}
