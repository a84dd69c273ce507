// ============================
// meeting-relay-lib/src/ws_router.rs
// ============================
//! HTTP router and signaling socket handling.
use crate::connection::ConnectionHandle;
use crate::handlers::meeting;
use crate::hub::{meeting_id_from_uri, Session};
use crate::metrics::{WS_ACTIVE, WS_CONNECTION};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::Uri,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use meeting_relay_common::MeetingId;
use metrics::{counter, gauge};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the application router: REST boundary plus the signaling socket
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.settings.websocket_path, get(ws_handler))
        .route("/meeting/start", post(meeting::start_meeting))
        .route("/meeting/join", get(meeting::join_meeting))
        .route("/echo", get(meeting::echo))
        .route("/health", get(meeting::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Upgrade to a signaling socket bound to the meeting named by `?id=`
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    uri: Uri,
) -> impl IntoResponse {
    let meeting_id = meeting_id_from_uri(&uri);
    ws.on_upgrade(move |socket| handle_socket(socket, state, meeting_id))
}

/// Drive one signaling socket until the peer goes away or the relay closes it
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, meeting_id: Option<MeetingId>) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut outbound) =
        ConnectionHandle::channel(state.settings.outbound_queue_capacity);
    let session = Session::new(meeting_id, connection.clone());

    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);
    tracing::debug!(
        connection = %connection.id(),
        meeting = ?session.meeting_id(),
        "signaling connection opened"
    );

    // Writer: flush queued frames, then say goodbye once the handle is closed
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.next_frame().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Reader: frames are dispatched one at a time, in arrival order
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => state.hub.dispatch(&session, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                // binary frames carry nothing we understand; pings are answered by axum
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    tracing::debug!(connection = %connection.id(), "socket error: {}", e);
                    break;
                },
            },
            () = connection.closed() => break,
        }
    }

    // Eviction is left to the sweeper, which sees the handle as closed
    connection.close();
    if let Err(e) = send_task.await {
        tracing::warn!(connection = %connection.id(), "writer task failed: {}", e);
    }

    gauge!(WS_ACTIVE).decrement(1.0);
    tracing::debug!(connection = %connection.id(), "signaling connection closed");
}
