//! Who else is in the room, and what they have typed so far.

use crate::types::{PeerId, PlayerInput};
use rand::Rng;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// At most one join reply per debounce window, so a burst of joins in a big
/// room does not turn into a reply storm
pub const REPLY_DEBOUNCE: Duration = Duration::from_secs(1);

/// Replies are jittered up to this long to spread out the thundering herd
/// when many peers observe the same join
pub const REPLY_MAX_DELAY: Duration = Duration::from_millis(1000);

/// Mirror of every *other* known peer's latest input, keyed by peer id.
///
/// The local peer's own id is never a key: its input is tracked separately by
/// the session. A `BTreeMap` keeps iteration deterministic, which the stable
/// leaderboard sort relies on for reproducible tie ordering.
#[derive(Debug, Clone)]
pub struct PresenceDirectory {
    local_id: PeerId,
    members: BTreeMap<PeerId, PlayerInput>,
}

impl PresenceDirectory {
    pub fn new(local_id: impl Into<PeerId>) -> Self {
        Self {
            local_id: local_id.into(),
            members: BTreeMap::new(),
        }
    }

    fn is_foreign(&self, peer_id: &str) -> bool {
        !peer_id.is_empty() && peer_id != self.local_id
    }

    /// Record a newly joined peer. Returns true when the peer was previously
    /// unknown (the signal a join reply may be owed for).
    pub fn on_join(&mut self, peer_id: &str, input: PlayerInput) -> bool {
        if !self.is_foreign(peer_id) {
            return false;
        }
        self.members.insert(peer_id.to_string(), input).is_none()
    }

    /// Upsert a peer's input snapshot.
    pub fn on_update(&mut self, peer_id: &str, input: PlayerInput) {
        if !self.is_foreign(peer_id) {
            return;
        }
        self.members.insert(peer_id.to_string(), input);
    }

    pub fn on_leave(&mut self, peer_id: &str) {
        self.members.remove(peer_id);
    }

    /// Blank every entry's input while keeping the peers themselves, so their
    /// cards clear on a page change without waiting for a fresh join.
    pub fn reset_all(&mut self) {
        for input in self.members.values_mut() {
            input.clear();
        }
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.members.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &str) -> Option<&PlayerInput> {
        self.members.get(peer_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &PlayerInput)> {
        self.members.iter()
    }
}

/// Decides whether an observed join gets a reply, and with how much jitter.
///
/// Kept separate from the timer machinery: the decision is a pure function of
/// the clock value passed in, so tests can drive it with simulated time. The
/// caller schedules the actual deferred publish and cancels it on shutdown.
#[derive(Debug, Default)]
pub struct JoinReplyPolicy {
    last_scheduled: Option<Instant>,
}

impl JoinReplyPolicy {
    /// Returns the jittered delay to reply after, or None while the debounce
    /// window from the previous reply is still open.
    pub fn schedule(&mut self, now: Instant) -> Option<Duration> {
        if let Some(last) = self.last_scheduled {
            if now.duration_since(last) < REPLY_DEBOUNCE {
                return None;
            }
        }
        self.last_scheduled = Some(now);
        let jitter = rand::rng().random_range(0..REPLY_MAX_DELAY.as_millis() as u64);
        Some(Duration::from_millis(jitter))
    }
}
