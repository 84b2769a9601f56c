//! `/ws` status stream

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use sx_core::api::PushMessage;

use crate::state::OrchestratorState;

pub(super) async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<OrchestratorState>>,
) -> Response {
    ws.on_upgrade(move |socket| push_client(socket, state))
}

/// Stream snapshots to one client until either side goes away.
async fn push_client(socket: WebSocket, state: Arc<OrchestratorState>) {
    let mut subscription = state.push.register();
    let id = subscription.id();
    let (mut sink, mut incoming) = socket.split();
    tracing::info!("Push client {} connected", id);

    loop {
        tokio::select! {
            snapshot = subscription.recv() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                let text = match serde_json::to_string(&PushMessage::Status(snapshot.as_ref().clone())) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to encode status: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Pings are answered by the server; other frames are ignored.
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    tracing::info!("Push client {} disconnected", id);
}
