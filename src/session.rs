//! Exclusive-access wrapper around one match's [`GameState`].
//!
//! Every mutation goes through [`Session::apply`], which runs overdue
//! deadlines, applies the operation and renders the outgoing messages from a
//! snapshot, all under the same lock. The lock is released before the caller
//! delivers anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::common::GameError;
use crate::game::{now_millis, GameId, GameState, GameStatus, PlayerId, SessionEvent};
use crate::protocol::Message;

/// Result of a [`Session::apply`] call, produced under the session lock.
#[derive(Debug)]
pub struct Applied {
    pub result: Result<(), GameError>,
    pub events: Vec<SessionEvent>,
    /// Messages to deliver, in order.
    pub outbound: Vec<(PlayerId, Message)>,
    pub status: GameStatus,
    /// Players still seated afterwards.
    pub players: Vec<PlayerId>,
}

/// Why [`Session::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Deadline,
    Changed,
    Closed,
}

pub struct Session {
    id: GameId,
    code: String,
    state: Mutex<GameState>,
    wake: Notify,
    closed: AtomicBool,
}

impl Session {
    pub fn new(state: GameState) -> Self {
        Self {
            id: state.id(),
            code: state.code().to_string(),
            state: Mutex::new(state),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Run `op` atomically after applying any deadline that already passed.
    pub async fn apply<F>(&self, op: F) -> Applied
    where
        F: FnOnce(&mut GameState, u64) -> Result<Vec<SessionEvent>, GameError>,
    {
        let mut state = self.state.lock().await;
        let now = now_millis();
        let mut events = state.tick(now);
        let result = op(&mut *state, now).map(|extra| events.extend(extra));
        let outbound = render(&state, &events);
        let applied = Applied {
            result,
            outbound,
            status: state.status(),
            players: state.players(),
            events,
        };
        drop(state);
        if !applied.events.is_empty() {
            self.wake.notify_one();
        }
        applied
    }

    /// Read-only access under the session lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        let state = self.state.lock().await;
        f(&*state)
    }

    pub async fn status(&self) -> GameStatus {
        self.inspect(|s| s.status()).await
    }

    /// Snapshot as seen by `viewer`.
    pub async fn snapshot(&self, viewer: PlayerId) -> crate::game::GameSnapshot {
        self.inspect(|s| s.snapshot_for(Some(viewer))).await
    }

    /// Sleep until the next deadline, a state change, or closure.
    pub async fn wait(&self) -> Wake {
        if self.is_closed() {
            return Wake::Closed;
        }
        let deadline = self.inspect(|s| s.next_deadline()).await;
        let woke = match deadline {
            Some(at) => {
                let delay = Duration::from_millis(at.saturating_sub(now_millis()));
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Wake::Deadline,
                    _ = self.wake.notified() => Wake::Changed,
                }
            }
            None => {
                self.wake.notified().await;
                Wake::Changed
            }
        };
        if self.is_closed() {
            Wake::Closed
        } else {
            woke
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Turn events into per-player messages. Status changes collapse into one
/// trailing `GameStateUpdate`.
fn render(state: &GameState, events: &[SessionEvent]) -> Vec<(PlayerId, Message)> {
    let players = state.players();
    let mut out = Vec::new();
    let mut needs_update = false;
    for event in events {
        match event {
            SessionEvent::BuildStarted => {
                for &p in &players {
                    let game_state = state.snapshot_for(Some(p));
                    out.push((p, Message::GameStarting { game_state }));
                }
            }
            SessionEvent::PlacementAccepted { .. } => {}
            SessionEvent::MoveMade { player, record } => {
                for &p in &players {
                    out.push((
                        p,
                        Message::MoveMade {
                            game_state: state.snapshot_for(Some(p)),
                            player: *player,
                            record: record.clone(),
                        },
                    ));
                }
            }
            SessionEvent::BattleStarted { .. }
            | SessionEvent::TurnSkipped { .. }
            | SessionEvent::TurnTimedOut { .. }
            | SessionEvent::PlayerLeft { .. }
            | SessionEvent::GameOver { .. } => needs_update = true,
        }
    }
    if needs_update {
        for &p in &players {
            let game_state = state.snapshot_for(Some(p));
            out.push((p, Message::GameStateUpdate { game_state }));
        }
    }
    out
}
