//! Websocket push of the stack update queue

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::time::interval;
use tracing::{debug, warn};

use crate::feed::{group_by_status, FEED_TICK};
use crate::state::AppState;

pub async fn stacks_update_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| push_updates(socket, state))
}

/// Send the grouped queue once per tick until the client goes away
async fn push_updates(mut socket: WebSocket, state: AppState) {
    let mut ticker = interval(FEED_TICK);
    debug!("Status feed client connected");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = group_by_status(state.updater.snapshot());
                let payload = match serde_json::to_string_pretty(&snapshot) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode status feed: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Status feed client disconnected");
}
