//! The pub/sub seam between the engine and whatever delivers its messages.
//!
//! The game assumes very little of the transport: fire-and-forget broadcast
//! events on one named topic, eventually delivered roughly in send order to
//! currently-attached peers, with the sender's own publishes echoed back; plus
//! enter/update/leave presence notifications. `LocalHub` satisfies that
//! in-process for tests and demos; the relay binary offers the same semantics
//! over WebSocket.

use crate::protocol::{GameEvent, PresenceAction, PresenceEvent};
use crate::types::{PeerId, PlayerInput};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is detached")]
    Detached,

    #[error("transport rejected the message: {0}")]
    Rejected(String),
}

/// Everything a subscriber can receive from the topic.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Event(GameEvent),
    Presence(PresenceEvent),
}

/// One peer's attachment to the shared topic.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The peer id this attachment publishes under
    fn client_id(&self) -> &str;

    /// Subscribe to everything on the topic, own publishes included
    fn subscribe(&self) -> broadcast::Receiver<ChannelMessage>;

    async fn publish(&self, event: GameEvent) -> Result<(), TransportError>;

    async fn presence_enter(&self, input: PlayerInput) -> Result<(), TransportError>;

    async fn presence_update(&self, input: PlayerInput) -> Result<(), TransportError>;

    async fn presence_leave(&self) -> Result<(), TransportError>;
}

/// In-process pub/sub hub: one topic, every attached channel sees every
/// message (sender echo included), presence tracked per peer id.
#[derive(Debug, Clone)]
pub struct LocalHub {
    topic: String,
    tx: broadcast::Sender<ChannelMessage>,
    members: Arc<RwLock<HashMap<PeerId, PlayerInput>>>,
}

impl LocalHub {
    pub fn new(topic: impl Into<String>) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            topic: topic.into(),
            tx,
            members: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Attach one peer to the hub.
    pub fn attach(&self, client_id: impl Into<PeerId>) -> LocalChannel {
        LocalChannel {
            client_id: client_id.into(),
            hub: self.clone(),
        }
    }

    /// Snapshot of the current presence set.
    pub async fn members(&self) -> HashMap<PeerId, PlayerInput> {
        self.members.read().await.clone()
    }

    fn broadcast(&self, message: ChannelMessage) {
        // No receivers attached is fine
        let _ = self.tx.send(message);
    }
}

/// A `Transport` handle produced by [`LocalHub::attach`].
pub struct LocalChannel {
    client_id: PeerId,
    hub: LocalHub,
}

#[async_trait]
impl Transport for LocalChannel {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.hub.tx.subscribe()
    }

    async fn publish(&self, event: GameEvent) -> Result<(), TransportError> {
        self.hub.broadcast(ChannelMessage::Event(event));
        Ok(())
    }

    async fn presence_enter(&self, input: PlayerInput) -> Result<(), TransportError> {
        self.hub
            .members
            .write()
            .await
            .insert(self.client_id.clone(), input.clone());
        self.hub.broadcast(ChannelMessage::Presence(PresenceEvent {
            action: PresenceAction::Enter,
            peer_id: self.client_id.clone(),
            input,
        }));
        Ok(())
    }

    async fn presence_update(&self, input: PlayerInput) -> Result<(), TransportError> {
        self.hub
            .members
            .write()
            .await
            .insert(self.client_id.clone(), input.clone());
        self.hub.broadcast(ChannelMessage::Presence(PresenceEvent {
            action: PresenceAction::Update,
            peer_id: self.client_id.clone(),
            input,
        }));
        Ok(())
    }

    async fn presence_leave(&self) -> Result<(), TransportError> {
        let removed = self.hub.members.write().await.remove(&self.client_id);
        if removed.is_some() {
            self.hub.broadcast(ChannelMessage::Presence(PresenceEvent {
                action: PresenceAction::Leave,
                peer_id: self.client_id.clone(),
                input: PlayerInput::default(),
            }));
        }
        Ok(())
    }
}
