use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use migii_core::config::MAX_PAYLOAD_BYTES;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::ws::hub::ChannelSocket;

/// Axum handler: upgrades `GET /` to the realtime WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_PAYLOAD_BYTES)
        .on_upgrade(move |socket| run_connection(socket, state))
}

/// Per-connection loop. Outbound change messages go through a bounded
/// writer channel; inbound text is ignored.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Arc<str>>(state.config.realtime.client_buffer.max(1));
    let registration = state
        .hub
        .register(conn_id.clone(), Arc::new(ChannelSocket::new(tx)));
    info!(conn_id = %conn_id, clients = state.hub.len(), "realtime client connected");

    let writer = async {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.to_string().into())).await.is_err() {
                debug!(conn_id = %conn_id, "write failed");
                break;
            }
        }
    };

    let reader = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if text.len() > MAX_PAYLOAD_BYTES {
                        warn!(conn_id = %conn_id, size = text.len(), "payload too large");
                        break;
                    }
                    debug!(conn_id = %conn_id, "inbound text ignored");
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    drop(registration);
    info!(conn_id = %conn_id, clients = state.hub.len(), "realtime client disconnected");
}
