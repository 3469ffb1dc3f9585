use rand::Rng;
use serde::{Deserialize, Serialize};

/// Opaque ID for a connected game session (not a human; one per tab)
pub type PeerId = String;

/// Every question carries one image per card slot
pub const CARD_COUNT: usize = 4;

/// The single pub/sub topic all peers share
pub const GAME_TOPIC: &str = "quizzos-game";

/// Safe character set for peer id suffixes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

/// Generate a fresh peer id for this session.
///
/// Ids are unique per connection, not per human, and are not stable across
/// reconnects.
pub fn generate_peer_id() -> PeerId {
    let mut rng = rand::rng();
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect();
    format!("Player-{}", suffix)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionImage {
    pub src: String,
    pub alt: String,
}

/// One quiz page: the ground truth players guess against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub title: String,
    pub description: String,
    pub target_number: i64,
    #[serde(default)]
    pub images: Vec<QuestionImage>,
}

/// A player's three answer fields.
///
/// `number` stays a raw string: whatever was typed, numeric or not. Scoring
/// deals with unparsable values, the data model does not.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerInput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub long_text: String,
    #[serde(default)]
    pub number: String,
}

impl PlayerInput {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.long_text.is_empty() && self.number.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.long_text.clear();
        self.number.clear();
    }
}

/// One leaderboard row. Derived data: recomputed entirely on every reveal,
/// never updated incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEntry {
    pub peer_id: PeerId,
    pub title_score: f64,
    pub description_score: f64,
    pub number_score: f64,
    pub total_score: f64,
}

/// Replace every alphanumeric character with `*`, keeping whitespace and
/// punctuation so the shape of the hidden text stays visible.
pub fn mask_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { '*' } else { c })
        .collect()
}
