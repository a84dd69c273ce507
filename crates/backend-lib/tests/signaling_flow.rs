//! Integration tests for the signaling socket, against a live server.

use futures_util::{SinkExt, StreamExt};
use meeting_relay_common::{Envelope, MessageType};
use meeting_relay_lib::{config::Settings, ws_router::create_router, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the router on an ephemeral port
async fn setup_server() -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(Settings::default()));
    let app = create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr, meeting_id: &str) -> Client {
    let url = format!("ws://{addr}/websocket/meeting?id={meeting_id}");
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

async fn send_json(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next text frame, decoded; `None` once the server closes the socket
async fn next_envelope(ws: &mut Client) -> Option<Envelope> {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame");
        match message {
            Some(Ok(Message::Text(text))) => return Some(Envelope::decode(text.as_str())),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Assert nothing arrives within a short window
async fn assert_silent(ws: &mut Client) {
    let waited = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(waited.is_err(), "unexpected frame: {waited:?}");
}

async fn join(ws: &mut Client, user_id: &str, name: &str) {
    send_json(
        ws,
        json!({"type": "join-meeting", "data": {"userId": user_id, "name": name}}),
    )
    .await;
    let reply = next_envelope(ws).await.unwrap();
    assert_eq!(reply, Envelope::for_user(MessageType::JoinedMeeting, user_id));
}

#[tokio::test]
async fn test_unknown_meeting_gets_not_found() {
    let (addr, _state) = setup_server().await;
    let mut ws = connect(addr, "not-a-meeting").await;

    send_json(&mut ws, json!({"type": "join-meeting", "data": {"userId": "u1"}})).await;
    assert_eq!(
        next_envelope(&mut ws).await,
        Some(Envelope::new(MessageType::NotFound))
    );
}

#[tokio::test]
async fn test_complete_signaling_flow() {
    let (addr, state) = setup_server().await;
    let meeting_id = state.registry.create_meeting("Alice", "u1");

    let mut alice = connect(addr, &meeting_id).await;
    join(&mut alice, "u1", "Alice").await;

    let mut bob = connect(addr, &meeting_id).await;
    join(&mut bob, "u2", "Bob").await;

    let joined = next_envelope(&mut alice).await.unwrap();
    assert_eq!(joined.kind, MessageType::UserJoined);
    let data = joined.data.unwrap();
    assert_eq!(data["userId"], "u2");
    assert_eq!(data["name"], "Bob");

    // garbage is ignored and the connection keeps working
    alice.send(Message::text("{{{".to_string())).await.unwrap();
    send_json(&mut alice, json!({"type": "heartbeat"})).await;

    send_json(
        &mut alice,
        json!({"type": "offer-sdp", "data": {"userId": "u1", "otherUserId": "u2", "sdp": "X"}}),
    )
    .await;
    let offer = next_envelope(&mut bob).await.unwrap();
    assert_eq!(
        serde_json::to_value(&offer).unwrap(),
        json!({"type": "offer-sdp", "data": {"userId": "u1", "sdp": "X"}})
    );

    send_json(
        &mut bob,
        json!({"type": "answer-sdp", "data": {"userId": "u2", "otherUserId": "u1", "sdp": "Y"}}),
    )
    .await;
    let answer = next_envelope(&mut alice).await.unwrap();
    assert_eq!(answer.kind, MessageType::AnswerSdp);

    // a target that never joined produces nothing at all
    send_json(
        &mut alice,
        json!({"type": "icecandidate", "data": {"userId": "u1", "otherUserId": "ghost", "candidate": {}}}),
    )
    .await;
    assert_silent(&mut alice).await;
    assert_silent(&mut bob).await;

    send_json(&mut alice, json!({"type": "end-meeting", "data": {"userId": "u1"}})).await;
    assert_eq!(
        next_envelope(&mut bob).await,
        Some(Envelope::for_user(MessageType::MeetingEnded, "u1"))
    );
    // the relay then closes both sockets
    assert_eq!(next_envelope(&mut bob).await, None);
    assert_eq!(next_envelope(&mut alice).await, None);
    assert!(!state.registry.exists(&meeting_id));
}

#[tokio::test]
async fn test_closed_socket_is_evicted_by_sweep() {
    let (addr, state) = setup_server().await;
    let meeting_id = state.registry.create_meeting("Alice", "u1");

    let mut alice = connect(addr, &meeting_id).await;
    join(&mut alice, "u1", "Alice").await;
    let mut bob = connect(addr, &meeting_id).await;
    join(&mut bob, "u2", "Bob").await;
    next_envelope(&mut alice).await.unwrap();

    bob.close(None).await.unwrap();

    // wait for the server side to notice the close
    for _ in 0..100 {
        let bob_open = state
            .registry
            .find_participant(&meeting_id, "u2")
            .is_some_and(|p| p.connection.is_open());
        if !bob_open {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let evicted = state.sweeper().sweep().evicted_participants;
    assert_eq!(evicted, 1);
    assert_eq!(
        next_envelope(&mut alice).await,
        Some(Envelope::for_user(MessageType::UserLeft, "u2"))
    );
    assert!(state.registry.find_participant(&meeting_id, "u2").is_none());
}
