//! Async driver for one peer: a single task owns the replica, so every state
//! transition happens on one logical thread with no locking in the engine.

use super::{GameSession, Outbound};
use crate::transport::{ChannelMessage, Transport};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

/// Local user actions, queued into the runner's event loop.
#[derive(Debug, Clone)]
pub enum Action {
    FlipCard(usize),
    DisplayAll,
    ToggleAnswer,
    RevealOthers,
    NextPage,
    PreviousPage,
    SetText(String),
    SetLongText(String),
    SetNumber(String),
}

/// Handle to a running peer. Dropping the handle (or calling `shutdown`)
/// makes the peer say goodbye and detach.
pub struct PeerHandle {
    actions: mpsc::Sender<Action>,
    task: JoinHandle<GameSession>,
}

impl PeerHandle {
    /// Queue a local action; fire-and-forget like the transport itself.
    pub async fn act(&self, action: Action) {
        if self.actions.send(action).await.is_err() {
            tracing::warn!("peer task is gone; action dropped");
        }
    }

    /// Stop the peer, publish the best-effort goodbye, and hand back the
    /// final session for inspection.
    pub async fn shutdown(self) -> Result<GameSession, JoinError> {
        drop(self.actions);
        self.task.await
    }
}

/// Spawn the event loop for `session` on `transport`.
///
/// The loop announces the peer, then interleaves queued local actions with
/// incoming channel traffic until shut down. Publishes never block state
/// mutation; delayed join replies run as abortable side tasks that are
/// cancelled on teardown.
pub fn spawn<T: Transport + 'static>(session: GameSession, transport: Arc<T>) -> PeerHandle {
    let (actions, rx) = mpsc::channel(64);
    let task = tokio::spawn(run(session, transport, rx));
    PeerHandle { actions, task }
}

async fn run<T: Transport + 'static>(
    mut session: GameSession,
    transport: Arc<T>,
    mut actions: mpsc::Receiver<Action>,
) -> GameSession {
    let mut incoming = transport.subscribe();
    let mut deferred: Vec<JoinHandle<()>> = Vec::new();

    dispatch(&transport, &mut deferred, session.announce()).await;

    loop {
        tokio::select! {
            maybe_action = actions.recv() => {
                let Some(action) = maybe_action else { break };
                let outbound = apply_action(&mut session, action);
                dispatch(&transport, &mut deferred, outbound).await;
            }
            message = incoming.recv() => {
                match message {
                    Ok(ChannelMessage::Event(event)) => {
                        let outbound = session.apply_event(&event, Instant::now());
                        dispatch(&transport, &mut deferred, outbound).await;
                    }
                    Ok(ChannelMessage::Presence(event)) => {
                        session.apply_presence(&event);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("channel lagged, dropped {} messages", missed);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        tracing::info!("channel closed, stopping peer");
                        break;
                    }
                }
            }
        }
        deferred.retain(|task| !task.is_finished());
    }

    // A reply owed to the room is moot once we leave it
    for task in &deferred {
        task.abort();
    }
    dispatch(&transport, &mut Vec::new(), session.farewell()).await;

    session
}

fn apply_action(session: &mut GameSession, action: Action) -> Vec<Outbound> {
    match action {
        Action::FlipCard(index) => session.flip_card(index),
        Action::DisplayAll => session.display_all(),
        Action::ToggleAnswer => session.toggle_answer(),
        Action::RevealOthers => session.reveal_others(),
        Action::NextPage => session.next_page(),
        Action::PreviousPage => session.previous_page(),
        Action::SetText(value) => session.set_text(value),
        Action::SetLongText(value) => session.set_long_text(value),
        Action::SetNumber(value) => session.set_number(value),
    }
}

/// Perform the session's outbound messages. All sends are best-effort: a
/// failed publish is logged and forgotten, never retried.
async fn dispatch<T: Transport + 'static>(
    transport: &Arc<T>,
    deferred: &mut Vec<JoinHandle<()>>,
    outbound: Vec<Outbound>,
) {
    for message in outbound {
        let result = match message {
            Outbound::Publish(event) => transport.publish(event).await,
            Outbound::PublishDelayed(event, delay) => {
                let transport = Arc::clone(transport);
                deferred.push(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = transport.publish(event).await {
                        tracing::warn!("deferred publish failed: {}", e);
                    }
                }));
                Ok(())
            }
            Outbound::PresenceEnter(input) => transport.presence_enter(input).await,
            Outbound::PresenceUpdate(input) => transport.presence_update(input).await,
            Outbound::PresenceLeave => transport.presence_leave().await,
        };
        if let Err(e) = result {
            tracing::warn!("transport send failed: {}", e);
        }
    }
}
