//! WebSocket endpoint for peripherals plus a small status API.

use super::engine::{self, EngineHandle};
use super::protocol::PeripheralMessage;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ServerState {
    pub engine: EngineHandle,
}

pub fn create_router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .with_state(ServerState { engine })
}

/// GET /ws - peripheral WebSocket upgrade
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    info!("Peripheral upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state.engine))
}

/// GET /api/status - server flag and connected peripherals
async fn status_handler(State(state): State<ServerState>) -> Response {
    match state.engine.clients().await {
        Ok(clients) => Json(json!({
            "running": true,
            "clients": clients,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Status query failed");
            Json(json!({"running": false, "clients": []})).into_response()
        }
    }
}

/// One task per connection: decode inbound frames into engine commands and
/// drain the engine's outbound channel into the socket.
async fn handle_socket(mut socket: WebSocket, engine: EngineHandle) {
    let connection_id = Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(engine::OUTBOUND_BUFFER);

    if engine.connect(connection_id.clone(), outbound_tx).await.is_err() {
        return;
    }
    info!(connection = %connection_id, "Peripheral connection established");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&engine, &connection_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(connection = %connection_id, "Peripheral closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames are ignored
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else { break };
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            warn!(connection = %connection_id, "Failed to send to peripheral");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode outbound message"),
                }
            }
        }
    }

    let _ = engine.disconnect(connection_id).await;
}

/// Decode one frame. Malformed or unknown messages are logged and dropped;
/// the connection stays up.
async fn handle_message(engine: &EngineHandle, connection_id: &str, text: &str) {
    let message: PeripheralMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Dropping unreadable peripheral message");
            return;
        }
    };

    let result = match message {
        PeripheralMessage::RegisterWidgets {
            peripheral_id,
            peripheral_name,
            widgets,
        } => {
            engine
                .register(
                    connection_id.to_string(),
                    peripheral_id,
                    peripheral_name,
                    widgets,
                )
                .await
        }
        PeripheralMessage::WidgetUpdate { widget_id, changes } => {
            engine
                .widget_update(connection_id.to_string(), widget_id, changes)
                .await
        }
        PeripheralMessage::UnregisterWidgets { peripheral_id } => {
            engine
                .unregister(connection_id.to_string(), peripheral_id)
                .await
        }
        PeripheralMessage::Heartbeat => {
            debug!(connection = %connection_id, "Heartbeat");
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!(connection = %connection_id, error = %e, "Engine rejected peripheral message");
    }
}

/// Bind and serve until the process exits.
pub async fn run_server(bind_address: &str, port: u16, engine: EngineHandle) -> anyhow::Result<()> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Remote widget server listening");
    axum::serve(listener, create_router(engine)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::persistence::MemoryPlacementStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn status_endpoint_reports_running() {
        let engine = engine::spawn(Arc::new(MemoryPlacementStore::new()));
        let router = create_router(engine);

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/status")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status["running"], true);
        assert!(status["clients"].as_array().unwrap().is_empty());
    }
}
