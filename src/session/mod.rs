//! The local replica of the shared game, and the transitions that keep every
//! replica converging.
//!
//! There is no authoritative copy anywhere: each peer mutates its own replica
//! through the closed set of handlers below and nowhere else, so a replica is
//! reproducible from its event log. Local actions mutate state and return the
//! outbound messages they imply; applying a received event performs the
//! identical mutation without re-emitting. Shared fields are replaced
//! wholesale (last write wins), which keeps every handler safe to re-apply to
//! state that already reflects the change; the transport echoes publishes
//! back to the sender.

pub mod presence;
pub mod runner;

use crate::protocol::{GameEvent, PresenceAction, PresenceEvent};
use crate::questions::Catalog;
use crate::scoring::aggregate;
use crate::types::{PeerId, PlayerInput, Question, ScoreEntry, CARD_COUNT};
use presence::{JoinReplyPolicy, PresenceDirectory};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The shared game state, one eventually-consistent copy per peer.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    /// 1-based index into the question catalog
    pub current_page: usize,
    pub flipped_cards: [bool; CARD_COUNT],
    /// Sticky per page: once the answer has been shown it stays "revealed"
    /// even after the overlay closes, until the page changes
    pub answer_revealed: bool,
    /// Whether the answer overlay is up right now
    pub answer_visible: bool,
    pub reveal_others: bool,
    pub leaderboard: Vec<ScoreEntry>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            current_page: 1,
            flipped_cards: [false; CARD_COUNT],
            answer_revealed: false,
            answer_visible: false,
            reveal_others: false,
            leaderboard: Vec::new(),
        }
    }
}

/// A message the session wants sent. The session itself never touches the
/// transport; the runner (or a test harness) performs these.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Publish(GameEvent),
    /// Publish after a jittered delay, as a cancellable deferred task
    PublishDelayed(GameEvent, Duration),
    PresenceEnter(PlayerInput),
    PresenceUpdate(PlayerInput),
    PresenceLeave,
}

/// One peer's replica plus its own editable input.
pub struct GameSession {
    peer_id: PeerId,
    catalog: Arc<Catalog>,
    pub state: GameState,
    pub input: PlayerInput,
    pub others: PresenceDirectory,
    reply_policy: JoinReplyPolicy,
}

impl GameSession {
    pub fn new(peer_id: impl Into<PeerId>, catalog: Arc<Catalog>) -> Self {
        let peer_id = peer_id.into();
        Self {
            others: PresenceDirectory::new(peer_id.clone()),
            peer_id,
            catalog,
            state: GameState::default(),
            input: PlayerInput::default(),
            reply_policy: JoinReplyPolicy::default(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn question_count(&self) -> usize {
        self.catalog.len()
    }

    /// The question on the current page. The page index is clamped on every
    /// write and the catalog is never empty, so this always resolves.
    pub fn current_question(&self) -> &Question {
        self.catalog
            .page(self.state.current_page)
            .unwrap_or(&self.catalog.questions()[0])
    }

    /// Announcement published right after attaching: presence enter plus a
    /// join event carrying the (empty) starting input.
    pub fn announce(&self) -> Vec<Outbound> {
        vec![
            Outbound::PresenceEnter(self.input.clone()),
            Outbound::Publish(GameEvent::PlayerJoin {
                peer_id: self.peer_id.clone(),
                input: self.input.clone(),
            }),
        ]
    }

    /// Best-effort goodbye on teardown; delivery is not guaranteed and peers
    /// also treat a presence leave as the same signal.
    pub fn farewell(&self) -> Vec<Outbound> {
        vec![
            Outbound::Publish(GameEvent::PlayerLeave {
                peer_id: self.peer_id.clone(),
            }),
            Outbound::PresenceLeave,
        ]
    }

    // ---- local actions -------------------------------------------------

    /// Toggle one card. Broadcasts the full card array, not a delta.
    pub fn flip_card(&mut self, index: usize) -> Vec<Outbound> {
        if index >= CARD_COUNT {
            return Vec::new();
        }
        self.state.flipped_cards[index] = !self.state.flipped_cards[index];
        vec![Outbound::Publish(GameEvent::CardFlip {
            flipped: self.state.flipped_cards,
        })]
    }

    /// The "display" action: every card face-up at once.
    pub fn display_all(&mut self) -> Vec<Outbound> {
        self.state.flipped_cards = [true; CARD_COUNT];
        vec![Outbound::Publish(GameEvent::CardFlip {
            flipped: self.state.flipped_cards,
        })]
    }

    /// Toggle the answer overlay. Opening it computes the leaderboard from
    /// the directory plus local input, and latches `answer_revealed`.
    pub fn toggle_answer(&mut self) -> Vec<Outbound> {
        let show = !self.state.answer_visible;
        if show {
            let leaderboard = aggregate(
                &self.peer_id,
                &self.input,
                self.others.iter(),
                self.current_question(),
            );
            self.state.leaderboard = leaderboard;
            self.state.answer_revealed = true;
        }
        self.state.answer_visible = show;
        vec![Outbound::Publish(GameEvent::AnswerReveal {
            show_answer: show,
        })]
    }

    /// One-way until the next page change.
    pub fn reveal_others(&mut self) -> Vec<Outbound> {
        self.state.reveal_others = true;
        vec![Outbound::Publish(GameEvent::ShowOthers { show_others: true })]
    }

    pub fn next_page(&mut self) -> Vec<Outbound> {
        self.go_to_page(self.state.current_page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> Vec<Outbound> {
        self.go_to_page(self.state.current_page.saturating_sub(1))
    }

    fn go_to_page(&mut self, page: usize) -> Vec<Outbound> {
        let clamped = page.clamp(1, self.catalog.len());
        if clamped == self.state.current_page {
            return Vec::new();
        }
        self.reset_for_page(clamped);
        vec![
            Outbound::Publish(GameEvent::PageChange {
                current_page: clamped,
            }),
            // Push the now-empty snapshot so peers' mirrors clear too
            Outbound::PresenceUpdate(self.input.clone()),
        ]
    }

    /// Everything per-page goes back to defaults: cards, both answer flags,
    /// "reveal others", leaderboard, local input, and every directory entry.
    fn reset_for_page(&mut self, page: usize) {
        self.state = GameState {
            current_page: page,
            ..GameState::default()
        };
        self.input.clear();
        self.others.reset_all();
    }

    pub fn set_text(&mut self, value: impl Into<String>) -> Vec<Outbound> {
        self.input.text = value.into();
        vec![Outbound::PresenceUpdate(self.input.clone())]
    }

    pub fn set_long_text(&mut self, value: impl Into<String>) -> Vec<Outbound> {
        self.input.long_text = value.into();
        vec![Outbound::PresenceUpdate(self.input.clone())]
    }

    pub fn set_number(&mut self, value: impl Into<String>) -> Vec<Outbound> {
        self.input.number = value.into();
        vec![Outbound::PresenceUpdate(self.input.clone())]
    }

    // ---- received events -----------------------------------------------

    /// Apply a broadcast event to this replica. Never re-broadcasts the same
    /// event; the only outbound it can produce is the deferred join reply.
    pub fn apply_event(&mut self, event: &GameEvent, now: Instant) -> Vec<Outbound> {
        match event {
            GameEvent::CardFlip { flipped } => {
                self.state.flipped_cards = *flipped;
                Vec::new()
            }
            GameEvent::AnswerReveal { show_answer } => {
                if *show_answer && !self.state.answer_visible {
                    // Each replica derives the leaderboard from its own
                    // directory; directories converge, so leaderboards do too
                    let leaderboard = aggregate(
                        &self.peer_id,
                        &self.input,
                        self.others.iter(),
                        self.current_question(),
                    );
                    self.state.leaderboard = leaderboard;
                    self.state.answer_revealed = true;
                }
                self.state.answer_visible = *show_answer;
                Vec::new()
            }
            GameEvent::ShowOthers { show_others } => {
                self.state.reveal_others = *show_others;
                Vec::new()
            }
            GameEvent::PageChange { current_page } => {
                let clamped = (*current_page).clamp(1, self.catalog.len());
                self.reset_for_page(clamped);
                Vec::new()
            }
            GameEvent::PlayerJoin { peer_id, input } => {
                if peer_id == &self.peer_id {
                    return Vec::new();
                }
                let newly_seen = self.others.on_join(peer_id, input.clone());
                if newly_seen {
                    if let Some(delay) = self.reply_policy.schedule(now) {
                        return vec![Outbound::PublishDelayed(
                            GameEvent::PlayerJoin {
                                peer_id: self.peer_id.clone(),
                                input: self.input.clone(),
                            },
                            delay,
                        )];
                    }
                }
                Vec::new()
            }
            GameEvent::PlayerLeave { peer_id } => {
                self.others.on_leave(peer_id);
                Vec::new()
            }
            GameEvent::PlayerInput { peer_id, input } => {
                self.others.on_update(peer_id, input.clone());
                Vec::new()
            }
        }
    }

    /// Apply a presence notification. Enters do not get a join reply; the
    /// join-reply protocol rides on `player-join` events only.
    pub fn apply_presence(&mut self, event: &PresenceEvent) {
        match event.action {
            PresenceAction::Enter => {
                self.others.on_join(&event.peer_id, event.input.clone());
            }
            PresenceAction::Update => {
                self.others.on_update(&event.peer_id, event.input.clone());
            }
            PresenceAction::Leave => {
                self.others.on_leave(&event.peer_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QuestionImage;

    fn catalog() -> Arc<Catalog> {
        let image = QuestionImage {
            src: "/images/x.jpg".to_string(),
            alt: "x".to_string(),
        };
        Arc::new(
            Catalog::new(vec![
                Question {
                    title: "Cats".to_string(),
                    description: "Small furry pets".to_string(),
                    target_number: 10,
                    images: vec![image.clone(); CARD_COUNT],
                },
                Question {
                    title: "Dogs".to_string(),
                    description: "Loyal furry friends".to_string(),
                    target_number: 7,
                    images: vec![image; CARD_COUNT],
                },
            ])
            .unwrap(),
        )
    }

    fn session(id: &str) -> GameSession {
        GameSession::new(id, catalog())
    }

    fn now() -> Instant {
        Instant::now()
    }

    #[test]
    fn test_initial_state() {
        let session = session("Player-LOCAL1");
        assert_eq!(session.state, GameState::default());
        assert_eq!(session.state.current_page, 1);
        assert_eq!(session.current_question().title, "Cats");
        assert!(session.others.is_empty());
    }

    #[test]
    fn test_flip_card_toggles_and_publishes_full_array() {
        let mut session = session("Player-LOCAL1");

        let out = session.flip_card(2);
        assert_eq!(session.state.flipped_cards, [false, false, true, false]);
        assert_eq!(
            out,
            vec![Outbound::Publish(GameEvent::CardFlip {
                flipped: [false, false, true, false]
            })]
        );

        session.flip_card(2);
        assert_eq!(session.state.flipped_cards, [false; CARD_COUNT]);

        // Out-of-range index is a no-op
        assert!(session.flip_card(CARD_COUNT).is_empty());
    }

    #[test]
    fn test_display_all() {
        let mut session = session("Player-LOCAL1");
        session.flip_card(0);
        let out = session.display_all();
        assert_eq!(session.state.flipped_cards, [true; CARD_COUNT]);
        assert_eq!(
            out,
            vec![Outbound::Publish(GameEvent::CardFlip {
                flipped: [true; CARD_COUNT]
            })]
        );
    }

    #[test]
    fn test_toggle_answer_builds_leaderboard_and_latches() {
        let mut session = session("Player-LOCAL1");
        session.set_text("Cats");
        session.set_number("10");
        session
            .others
            .on_join("Player-AAAAA2", PlayerInput::default());

        let out = session.toggle_answer();
        assert_eq!(
            out,
            vec![Outbound::Publish(GameEvent::AnswerReveal { show_answer: true })]
        );
        assert!(session.state.answer_visible);
        assert!(session.state.answer_revealed);
        assert_eq!(session.state.leaderboard.len(), 2);
        assert_eq!(session.state.leaderboard[0].peer_id, "Player-LOCAL1");

        // Closing the overlay keeps the reveal latched and the leaderboard
        let out = session.toggle_answer();
        assert_eq!(
            out,
            vec![Outbound::Publish(GameEvent::AnswerReveal {
                show_answer: false
            })]
        );
        assert!(!session.state.answer_visible);
        assert!(session.state.answer_revealed);
        assert_eq!(session.state.leaderboard.len(), 2);
    }

    #[test]
    fn test_answer_revealed_monotonic_within_page() {
        let mut session = session("Player-LOCAL1");
        for _ in 0..3 {
            session.toggle_answer();
        }
        // Overlay is up on odd toggles; the latch never drops
        assert!(session.state.answer_visible);
        assert!(session.state.answer_revealed);
        session.toggle_answer();
        assert!(!session.state.answer_visible);
        assert!(session.state.answer_revealed);
    }

    #[test]
    fn test_reveal_others_is_one_way() {
        let mut session = session("Player-LOCAL1");
        let out = session.reveal_others();
        assert!(session.state.reveal_others);
        assert_eq!(
            out,
            vec![Outbound::Publish(GameEvent::ShowOthers { show_others: true })]
        );
    }

    #[test]
    fn test_page_change_resets_everything() {
        let mut session = session("Player-LOCAL1");
        session.set_text("guess");
        session.flip_card(1);
        session.toggle_answer();
        session.reveal_others();
        session.others.on_join(
            "Player-AAAAA2",
            PlayerInput {
                text: "their guess".to_string(),
                ..PlayerInput::default()
            },
        );

        let out = session.next_page();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            Outbound::Publish(GameEvent::PageChange { current_page: 2 })
        );
        assert_eq!(out[1], Outbound::PresenceUpdate(PlayerInput::default()));

        assert_eq!(session.state.current_page, 2);
        assert_eq!(session.current_question().title, "Dogs");
        assert_eq!(session.state.flipped_cards, [false; CARD_COUNT]);
        assert!(!session.state.answer_visible);
        assert!(!session.state.answer_revealed);
        assert!(!session.state.reveal_others);
        assert!(session.state.leaderboard.is_empty());
        assert!(session.input.is_empty());
        // Peer entries survive with blanked input
        assert_eq!(session.others.len(), 1);
        assert!(session.others.get("Player-AAAAA2").unwrap().is_empty());
    }

    #[test]
    fn test_page_clamped_to_catalog() {
        let mut session = session("Player-LOCAL1");

        // Already on page 1: going back is a no-op, nothing published
        assert!(session.previous_page().is_empty());

        session.next_page();
        assert_eq!(session.state.current_page, 2);

        // Already on the last page
        assert!(session.next_page().is_empty());
        assert_eq!(session.state.current_page, 2);
    }

    #[test]
    fn test_edit_input_pushes_presence_snapshot() {
        let mut session = session("Player-LOCAL1");
        session.set_text("Ca");
        let out = session.set_number("9");
        assert_eq!(
            out,
            vec![Outbound::PresenceUpdate(PlayerInput {
                text: "Ca".to_string(),
                long_text: String::new(),
                number: "9".to_string(),
            })]
        );
    }

    #[test]
    fn test_apply_card_flip_is_idempotent() {
        let mut session = session("Player-LOCAL1");
        let event = GameEvent::CardFlip {
            flipped: [true, false, true, false],
        };
        assert!(session.apply_event(&event, now()).is_empty());
        assert_eq!(session.state.flipped_cards, [true, false, true, false]);
        // The sender's own echo re-applies the same array: no change
        assert!(session.apply_event(&event, now()).is_empty());
        assert_eq!(session.state.flipped_cards, [true, false, true, false]);
    }

    #[test]
    fn test_apply_answer_reveal_builds_local_leaderboard() {
        let mut session = session("Player-LOCAL1");
        session.set_text("Cats");
        session.others.on_join(
            "Player-AAAAA2",
            PlayerInput {
                number: "10".to_string(),
                ..PlayerInput::default()
            },
        );

        session.apply_event(&GameEvent::AnswerReveal { show_answer: true }, now());
        assert!(session.state.answer_visible);
        assert!(session.state.answer_revealed);
        assert_eq!(session.state.leaderboard.len(), 2);

        // Hiding remotely keeps the latch
        session.apply_event(&GameEvent::AnswerReveal { show_answer: false }, now());
        assert!(!session.state.answer_visible);
        assert!(session.state.answer_revealed);
    }

    #[test]
    fn test_apply_page_change_clamps_bogus_values() {
        let mut session = session("Player-LOCAL1");
        session.apply_event(&GameEvent::PageChange { current_page: 99 }, now());
        assert_eq!(session.state.current_page, 2);
        session.apply_event(&GameEvent::PageChange { current_page: 0 }, now());
        assert_eq!(session.state.current_page, 1);
    }

    #[test]
    fn test_own_join_echo_is_ignored() {
        let mut session = session("Player-LOCAL1");
        let echo = GameEvent::PlayerJoin {
            peer_id: "Player-LOCAL1".to_string(),
            input: PlayerInput::default(),
        };
        assert!(session.apply_event(&echo, now()).is_empty());
        assert!(session.others.is_empty());
    }

    #[test]
    fn test_unknown_peer_join_gets_delayed_reply() {
        let mut session = session("Player-LOCAL1");
        session.set_text("halfway through a guess");

        let join = GameEvent::PlayerJoin {
            peer_id: "Player-AAAAA2".to_string(),
            input: PlayerInput::default(),
        };
        let out = session.apply_event(&join, now());

        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::PublishDelayed(GameEvent::PlayerJoin { peer_id, input }, delay) => {
                assert_eq!(peer_id, "Player-LOCAL1");
                assert_eq!(input.text, "halfway through a guess");
                assert!(*delay < presence::REPLY_MAX_DELAY);
            }
            other => panic!("expected a delayed join reply, got {other:?}"),
        }
        assert!(session.others.contains("Player-AAAAA2"));
    }

    #[test]
    fn test_known_peer_join_gets_no_reply() {
        let mut session = session("Player-LOCAL1");
        let join = GameEvent::PlayerJoin {
            peer_id: "Player-AAAAA2".to_string(),
            input: PlayerInput::default(),
        };
        assert_eq!(session.apply_event(&join, now()).len(), 1);
        // Same peer announcing again: already known, no reply storm
        assert!(session.apply_event(&join, now()).is_empty());
    }

    #[test]
    fn test_join_replies_debounced_across_peers() {
        let mut session = session("Player-LOCAL1");
        let t = now();

        let first = GameEvent::PlayerJoin {
            peer_id: "Player-AAAAA2".to_string(),
            input: PlayerInput::default(),
        };
        let second = GameEvent::PlayerJoin {
            peer_id: "Player-BBBBB3".to_string(),
            input: PlayerInput::default(),
        };

        assert_eq!(session.apply_event(&first, t).len(), 1);
        // A second unknown peer inside the debounce window: directory grows,
        // but no extra reply
        assert!(session.apply_event(&second, t).is_empty());
        assert_eq!(session.others.len(), 2);
    }

    #[test]
    fn test_apply_player_leave_and_input() {
        let mut session = session("Player-LOCAL1");
        let join = GameEvent::PlayerJoin {
            peer_id: "Player-AAAAA2".to_string(),
            input: PlayerInput::default(),
        };
        session.apply_event(&join, now());

        session.apply_event(
            &GameEvent::PlayerInput {
                peer_id: "Player-AAAAA2".to_string(),
                input: PlayerInput {
                    text: "typed".to_string(),
                    ..PlayerInput::default()
                },
            },
            now(),
        );
        assert_eq!(session.others.get("Player-AAAAA2").unwrap().text, "typed");

        session.apply_event(
            &GameEvent::PlayerLeave {
                peer_id: "Player-AAAAA2".to_string(),
            },
            now(),
        );
        assert!(session.others.is_empty());
    }

    #[test]
    fn test_presence_events_update_directory() {
        let mut session = session("Player-LOCAL1");

        session.apply_presence(&PresenceEvent {
            action: PresenceAction::Enter,
            peer_id: "Player-AAAAA2".to_string(),
            input: PlayerInput::default(),
        });
        assert!(session.others.contains("Player-AAAAA2"));

        session.apply_presence(&PresenceEvent {
            action: PresenceAction::Update,
            peer_id: "Player-AAAAA2".to_string(),
            input: PlayerInput {
                number: "42".to_string(),
                ..PlayerInput::default()
            },
        });
        assert_eq!(session.others.get("Player-AAAAA2").unwrap().number, "42");

        // Own presence echoes never land in the directory
        session.apply_presence(&PresenceEvent {
            action: PresenceAction::Update,
            peer_id: "Player-LOCAL1".to_string(),
            input: PlayerInput::default(),
        });
        assert!(!session.others.contains("Player-LOCAL1"));

        session.apply_presence(&PresenceEvent {
            action: PresenceAction::Leave,
            peer_id: "Player-AAAAA2".to_string(),
            input: PlayerInput::default(),
        });
        assert!(session.others.is_empty());
    }

    #[test]
    fn test_announce_and_farewell() {
        let session = session("Player-LOCAL1");

        let announce = session.announce();
        assert_eq!(announce.len(), 2);
        assert!(matches!(announce[0], Outbound::PresenceEnter(_)));
        assert!(matches!(
            announce[1],
            Outbound::Publish(GameEvent::PlayerJoin { .. })
        ));

        let farewell = session.farewell();
        assert_eq!(
            farewell,
            vec![
                Outbound::Publish(GameEvent::PlayerLeave {
                    peer_id: "Player-LOCAL1".to_string()
                }),
                Outbound::PresenceLeave,
            ]
        );
    }

    #[test]
    fn test_replica_replay_reproducibility() {
        // Two replicas fed the same event log end up identical
        let events = vec![
            GameEvent::PlayerJoin {
                peer_id: "Player-AAAAA2".to_string(),
                input: PlayerInput::default(),
            },
            GameEvent::CardFlip {
                flipped: [true, true, false, false],
            },
            GameEvent::PlayerInput {
                peer_id: "Player-AAAAA2".to_string(),
                input: PlayerInput {
                    text: "Cats".to_string(),
                    ..PlayerInput::default()
                },
            },
            GameEvent::AnswerReveal { show_answer: true },
            GameEvent::PageChange { current_page: 2 },
        ];

        let mut a = session("Player-OBSRV1");
        let mut b = session("Player-OBSRV1");
        for event in &events {
            a.apply_event(event, now());
            b.apply_event(event, now());
        }

        assert_eq!(a.state, b.state);
        assert_eq!(a.state.current_page, 2);
        assert!(a.state.leaderboard.is_empty());
    }
}
