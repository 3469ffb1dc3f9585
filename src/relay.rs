//! Shared state for the relay binary: one topic, fan-out to every attached
//! client, presence bookkeeping. The relay never interprets game events, it
//! only moves them; all game semantics stay in the peers.

use crate::auth::{IssuedToken, TokenIssuer};
use crate::protocol::{ClientFrame, PresenceAction, PresenceEvent, ServerFrame};
use crate::types::{PeerId, PlayerInput, GAME_TOPIC};
use axum::{extract::State, Json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

pub struct RelayState {
    pub topic: String,
    pub issuer: TokenIssuer,
    /// Current presence set: peers that have entered and not yet left
    pub members: RwLock<HashMap<PeerId, PlayerInput>>,
    /// Fan-out channel for sending frames to every connected client
    pub broadcast: broadcast::Sender<ServerFrame>,
}

impl RelayState {
    pub fn new(issuer: TokenIssuer) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            topic: GAME_TOPIC.to_string(),
            issuer,
            members: RwLock::new(HashMap::new()),
            broadcast: tx,
        }
    }

    pub fn broadcast_frame(&self, frame: ServerFrame) {
        // Ignore send errors (no receivers connected is fine)
        let _ = self.broadcast.send(frame);
    }

    /// Apply one frame from a connected client. Publishes are echoed to every
    /// subscriber including the sender; presence changes update the member
    /// set and notify everyone.
    pub async fn apply_client_frame(&self, peer_id: &str, frame: ClientFrame) {
        match frame {
            ClientFrame::Publish { event } => {
                self.broadcast_frame(ServerFrame::Event { event });
            }
            ClientFrame::Enter { input } => {
                self.members
                    .write()
                    .await
                    .insert(peer_id.to_string(), input.clone());
                self.broadcast_presence(PresenceAction::Enter, peer_id, input);
            }
            ClientFrame::Update { input } => {
                self.members
                    .write()
                    .await
                    .insert(peer_id.to_string(), input.clone());
                self.broadcast_presence(PresenceAction::Update, peer_id, input);
            }
            ClientFrame::Leave => {
                if self.members.write().await.remove(peer_id).is_some() {
                    self.broadcast_presence(PresenceAction::Leave, peer_id, PlayerInput::default());
                }
            }
        }
    }

    /// Socket went away: emit the implicit leave unless the client already
    /// said goodbye explicitly.
    pub async fn disconnect(&self, peer_id: &str) {
        if self.members.write().await.remove(peer_id).is_some() {
            tracing::info!("peer {} disconnected, emitting implicit leave", peer_id);
            self.broadcast_presence(PresenceAction::Leave, peer_id, PlayerInput::default());
        }
    }

    fn broadcast_presence(&self, action: PresenceAction, peer_id: &str, input: PlayerInput) {
        self.broadcast_frame(ServerFrame::Presence {
            event: PresenceEvent {
                action,
                peer_id: peer_id.to_string(),
                input,
            },
        });
    }
}

/// `GET /token`: issue a fresh scoped credential for the game topic.
pub async fn token_handler(State(state): State<Arc<RelayState>>) -> Json<IssuedToken> {
    let issued = state.issuer.issue();
    tracing::debug!("issued token for {}", issued.client_id);
    Json(issued)
}
