use crate::types::{PeerId, PlayerInput, CARD_COUNT};
use serde::{Deserialize, Serialize};

fn default_page() -> usize {
    1
}

/// Broadcast events carried on the game topic.
///
/// Every peer applies these to its own replica, including the sender when the
/// transport echoes a publish back. Handlers must therefore be idempotent.
/// Missing payload fields deserialize to empty/false so a short or foreign
/// payload degrades instead of faulting the state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "kebab-case")]
pub enum GameEvent {
    /// Full card state, not a delta: last write wins across peers
    CardFlip {
        #[serde(default)]
        flipped: [bool; CARD_COUNT],
    },
    AnswerReveal {
        #[serde(default)]
        show_answer: bool,
    },
    ShowOthers {
        #[serde(default)]
        show_others: bool,
    },
    PageChange {
        #[serde(default = "default_page")]
        current_page: usize,
    },
    /// Announcement on attach; also the reply other peers send back so the
    /// newcomer learns who was already in the room
    PlayerJoin {
        #[serde(default)]
        peer_id: PeerId,
        #[serde(default)]
        input: PlayerInput,
    },
    /// Best-effort goodbye published before the transport detaches
    PlayerLeave {
        #[serde(default)]
        peer_id: PeerId,
    },
    /// Legacy input path; presence updates are the primary one
    PlayerInput {
        #[serde(default)]
        peer_id: PeerId,
        #[serde(default)]
        input: PlayerInput,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    Enter,
    Update,
    Leave,
}

/// Presence notification: a peer attached, changed its input blob, or left
/// (explicitly or by transport-detected disconnect).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceEvent {
    pub action: PresenceAction,
    pub peer_id: PeerId,
    #[serde(default)]
    pub input: PlayerInput,
}

/// Frames a client sends to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientFrame {
    Publish {
        event: GameEvent,
    },
    Enter {
        #[serde(default)]
        input: PlayerInput,
    },
    Update {
        #[serde(default)]
        input: PlayerInput,
    },
    Leave,
}

/// Frames the relay sends to every attached client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        protocol: String,
        peer_id: PeerId,
        topic: String,
        server_now: String,
    },
    Event {
        event: GameEvent,
    },
    Presence {
        event: PresenceEvent,
    },
    Error {
        code: String,
        msg: String,
    },
}
