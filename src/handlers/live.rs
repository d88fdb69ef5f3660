use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::AppState;

// ─── GET /ws ─────────────────────────────────────────────────────
/// Live feed. The socket gets one `hello` frame, then one `point` frame per
/// broadcast event. Anything the client sends is ignored apart from close.

pub async fn live_feed(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| serve_observer(socket, state))
}

async fn serve_observer(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.pipeline.subscribe();
    let id = subscription.id();
    info!(observer = id, "live observer connected");

    loop {
        tokio::select! {
            outbound = subscription.recv() => {
                // None: the hub dropped us after a failed delivery
                let Some(message) = outbound else { break };
                let json = match serde_json::to_string(&*message) {
                    Ok(json) => json,
                    Err(e) => {
                        debug!(observer = id, error = %e, "skipping unencodable message");
                        continue;
                    }
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.pipeline.unsubscribe(id);
    info!(observer = id, "live observer disconnected");
}
