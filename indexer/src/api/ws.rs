//! Per-table event stream. The socket's writer half is owned by a dedicated
//! task fed from an unbounded channel, so a slow broadcast never blocks the
//! reader loop.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::AppState;

pub async fn stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(table_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, table_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, raw_table_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // The id arrives as a path segment; an unparseable one gets an error
    // frame and a clean close instead of a dropped connection.
    let table_id: u64 = match raw_table_id.parse() {
        Ok(table_id) => table_id,
        Err(_) => {
            let payload = serde_json::json!({
                "type": "error",
                "error": format!("invalid table id: {raw_table_id}"),
            });
            let _ = sender.send(Message::Text(payload.to_string())).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let subscriber_id = state.broadcaster.subscribe(table_id, tx.clone());

    let ack = serde_json::json!({
        "type": "connected",
        "tableId": table_id,
    });
    let _ = tx.send(ack.to_string());

    let write_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) if text == "ping" => {
                let _ = tx.send("pong".to_string());
            }
            Message::Text(_) | Message::Binary(_) => {
                // Stream is one-way; anything else inbound is ignored.
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.broadcaster.unsubscribe_all(subscriber_id);
    write_task.abort();
    debug!(table_id, subscriber = subscriber_id, "stream subscriber disconnected");
}
