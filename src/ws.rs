use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::protocol::{ClientFrame, ServerFrame};
use crate::relay::RelayState;
use crate::types::PeerId;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler. The topic token is checked before the upgrade;
/// a missing or invalid one is a terminal 401, clients are expected not to
/// retry.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<RelayState>>,
) -> Response {
    let Some(token) = params.token.as_deref() else {
        tracing::warn!("WebSocket connection without token rejected");
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    };

    let client_id = match state.issuer.validate(token) {
        Ok(client_id) => client_id,
        Err(e) => {
            tracing::warn!("WebSocket token rejected: {}", e);
            return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
        }
    };

    tracing::info!("WebSocket connected as {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, client_id: PeerId, state: Arc<RelayState>) {
    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerFrame::Welcome {
        protocol: "1.0".to_string(),
        peer_id: client_id.clone(),
        topic: state.topic.clone(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };

    if let Ok(msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            tracing::error!("Failed to send welcome frame");
            return;
        }
    }

    let mut broadcast_rx = state.broadcast.subscribe();

    loop {
        tokio::select! {
            broadcast_frame = broadcast_rx.recv() => {
                match broadcast_frame {
                    Ok(frame) => {
                        if let Ok(json) = serde_json::to_string(&frame) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("client {} lagged, dropped {} frames", client_id, missed);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => {
                                state.apply_client_frame(&client_id, frame).await;
                            }
                            Err(e) => {
                                // Foreign payloads are dropped, not fatal
                                tracing::warn!("Failed to parse client frame: {}", e);
                                let error = ServerFrame::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid frame format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed by {}", client_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Transport-detected disconnect counts as a leave
    state.disconnect(&client_id).await;
    tracing::info!("WebSocket connection closed for {}", client_id);
}
