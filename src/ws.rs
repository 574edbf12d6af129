//! Live feed: WebSocket fan-out of leaderboard updates.
//!
//! Clients subscribe to (score_type, period) channels; the server filters
//! the shared broadcast stream per connection so a subscriber only sees the
//! boards it asked for.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.feed.subscribe();
    let mut subscriptions: HashSet<(crate::types::ScoreType, crate::types::Period)> =
        HashSet::new();

    let welcome = ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if send_json(&mut sender, &welcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { score_type, period }) => {
                                subscriptions.insert((score_type, period));
                                let ack = ServerMessage::Subscribed { score_type, period };
                                if send_json(&mut sender, &ack).await.is_err() {
                                    break;
                                }
                                // Immediately serve the current board so the
                                // client doesn't wait for the next delta
                                let board = state
                                    .get_leaderboard(score_type, period, 100, chrono::Utc::now())
                                    .await;
                                let snapshot = ServerMessage::LeaderboardUpdate {
                                    score_type,
                                    period,
                                    leaderboard: board,
                                    updated_user_id: None,
                                };
                                if send_json(&mut sender, &snapshot).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Unsubscribe { score_type, period }) => {
                                subscriptions.remove(&(score_type, period));
                            }
                            Err(e) => {
                                tracing::debug!("unparseable client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                let _ = send_json(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("websocket error: {}", e);
                        break;
                    }
                }
            }
            update = feed.recv() => {
                match update {
                    Ok(msg) => {
                        let wanted = match &msg {
                            ServerMessage::LeaderboardUpdate { score_type, period, .. } => {
                                subscriptions.contains(&(*score_type, *period))
                            }
                            _ => false,
                        };
                        if wanted && send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "live feed client lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("live feed connection closed");
}

async fn send_json(
    sender: &mut (impl SinkExt<Message> + Unpin),
    msg: &ServerMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}
