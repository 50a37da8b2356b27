pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::{ClientMessage, RoomEvent, ServerMessage};
use crate::state::AppState;
use crate::types::{RoomId, UserId};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
    pub name: Option<String>,
}

/// Who this connection speaks for. The identity provider is external; the
/// server only needs a stable user id and a display name.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub display_name: String,
}

impl UserIdentity {
    /// Resolve the connection's identity from the query parameters. A
    /// connection without an id gets a fresh guest identity with a
    /// generated friendly name.
    fn from_query(params: &WsQuery) -> Self {
        let user_id = params
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        let display_name = params
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| petname::petname(2, "-"))
            .unwrap_or_else(|| "guest".to_string());

        Self {
            user_id,
            display_name,
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user = UserIdentity::from_query(&params);
    tracing::info!(user_id = %user.user_id, "WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

/// Handle one client connection. The loop multiplexes incoming client
/// messages with the current room's event stream; the subscription follows
/// the RoomJoined/RoomLeft replies. Disconnecting does NOT leave the room:
/// membership survives a dropped connection and abandoned rooms are the
/// reaper's job.
async fn handle_socket(socket: WebSocket, user: UserIdentity, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        user_id: user.user_id.clone(),
        display_name: user.display_name.clone(),
        server_now: chrono::Utc::now(),
    };
    if let Ok(msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            tracing::error!("Failed to send welcome message");
            return;
        }
    }

    // A reconnecting player resumes their room's event stream
    let mut current_room: Option<RoomId> = state.active_room(&user.user_id).await;
    let mut room_rx: Option<broadcast::Receiver<RoomEvent>> = match &current_room {
        Some(room_id) => state.events.subscribe(room_id).await,
        None => None,
    };

    loop {
        tokio::select! {
            // Room events for the current subscription
            event = async {
                match &mut room_rx {
                    Some(rx) => Some(rx.recv().await),
                    None => {
                        // Not in a room: wait forever
                        std::future::pending::<Option<Result<RoomEvent, broadcast::error::RecvError>>>().await
                    }
                }
            } => {
                match event {
                    Some(Ok(event)) => {
                        let msg = ServerMessage::Event { event };
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    // Lagged consumers just re-fetch; events carry no state
                    Some(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                        tracing::debug!(skipped, "event stream lagged");
                    }
                    // Channel gone: the room was deleted or reaped
                    Some(Err(broadcast::error::RecvError::Closed)) => {
                        room_rx = None;
                        if let Some(room_id) = current_room.take() {
                            let msg = ServerMessage::RoomLeft { room_id };
                            if let Ok(json) = serde_json::to_string(&msg) {
                                let _ = sender.send(Message::Text(json.into())).await;
                            }
                        }
                    }
                    None => {}
                }
            }

            // Client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let response =
                                    handlers::handle_message(client_msg, &user, &state).await;

                                // Track the subscription alongside the reply
                                match &response {
                                    Some(ServerMessage::RoomJoined { room }) => {
                                        current_room = Some(room.room.id.clone());
                                        room_rx = state.events.subscribe(&room.room.id).await;
                                    }
                                    Some(ServerMessage::RoomLeft { .. }) => {
                                        current_room = None;
                                        room_rx = None;
                                    }
                                    _ => {}
                                }

                                if let Some(response) = response {
                                    if let Ok(json) = serde_json::to_string(&response) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(user_id = %user.user_id, "WebSocket connection closed");
}
