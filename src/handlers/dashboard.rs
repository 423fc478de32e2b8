use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::time::{interval, Duration};

use crate::handlers::AppState;

/// Live stats feed for the dashboard cards: one snapshot per second.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let mut interval = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let stats = match state.stats.get_stats().await {
                    Ok(stats) => stats,
                    Err(e) => {
                        tracing::warn!("Stats snapshot failed: {}", e);
                        continue;
                    }
                };

                if let Ok(msg) = serde_json::to_string(&stats) {
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
            }

            Some(Ok(msg)) = receiver.next() => {
                match msg {
                    Message::Close(_) => break,
                    Message::Ping(data) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}
