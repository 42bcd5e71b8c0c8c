use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::core::gateway::SharedGateway;

// Handle a WebSocket connection
pub async fn handle_ws_client(ws: WebSocket, gateway: SharedGateway) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn a task to forward messages from our channel to the WebSocket
    tokio::task::spawn(async move {
        let mut rx = rx;
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_tx.send(message).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let connection_id = match gateway.connect(tx) {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to register connection: {}", e);
            return;
        }
    };
    if let Ok(count) = gateway.connection_count() {
        info!("Current connections: {}", count);
    }

    let mut reason = String::from("transport closed");

    // Handle incoming messages
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if msg.is_close() {
                    if let Some((code, text)) = msg.close_frame() {
                        reason = format!("close frame {} {}", code, text);
                    }
                    break;
                }
                if !msg.is_text() {
                    debug!("Ignoring non-text frame from {}", connection_id);
                    continue;
                }
                match msg.to_str() {
                    Ok(text) => gateway.handle_text(&connection_id, text),
                    Err(_) => warn!("Unreadable text frame from {}", connection_id),
                }
            }
            Err(e) => {
                warn!("WebSocket error for {}: {}", connection_id, e);
                reason = format!("transport error: {}", e);
                break;
            }
        }
    }

    // Client disconnected
    if let Err(e) = gateway.disconnect(&connection_id, &reason) {
        error!("Failed to process disconnect of {}: {}", connection_id, e);
    }
}
