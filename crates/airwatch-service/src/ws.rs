//! WebSocket handler for real-time device updates.
//!
//! Each connection owns one device subscription. Every snapshot is sent as
//! `{"type":"devices","devices":[...]}`; a store failure is sent as
//! `{"type":"unavailable","error":"..."}` and ends the stream.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use airwatch_core::SyncEvent;
use airwatch_types::SensorDevice;

use crate::state::AppState;

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

/// Message pushed to WebSocket clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Devices { devices: Vec<SensorDevice> },
    Unavailable { error: String },
}

impl From<SyncEvent> for WsMessage {
    fn from(event: SyncEvent) -> Self {
        match event {
            SyncEvent::Devices(devices) => WsMessage::Devices { devices },
            SyncEvent::Unavailable(e) => WsMessage::Unavailable {
                error: e.to_string(),
            },
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // The first event is the current collection, seeded if empty
    let mut subscription = state.sync.subscribe();

    info!("WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            let terminal = matches!(event, SyncEvent::Unavailable(_));
            let json = match serde_json::to_string(&WsMessage::from(event)) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            if terminal {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
        subscription.unsubscribe().await;
    });

    // Drain client messages until close
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) => debug!("Received ping"),
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    // Aborting the send task drops the subscription, which cancels it
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}
