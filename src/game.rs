//! Authoritative state of one match and its lifecycle state machine.
//!
//! [`GameState`] is plain synchronous data: every operation takes the current
//! wall-clock time in milliseconds and returns the [`SessionEvent`]s it
//! produced, leaving I/O and locking to the session layer. Clients only ever
//! see [`GameSnapshot`]s rendered from it.

use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bitboard::BitBoard;
use crate::board::{self, Board};
use crate::common::{GameError, MoveError};
use crate::config::{energy_cost, GameOptions};
use crate::moves::{self, Move, MoveRecord};
use crate::ship::{Ship, ShipDef};

/// Identity assigned to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// Unique id of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game-{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lifecycle of a match.
///
/// ```text
/// LobbyWaiting → BuildGameBoard → InGame → GameOver
/// ```
///
/// The only edge that skips a state is `BuildGameBoard → GameOver`, taken
/// when a player leaves before the battle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    LobbyWaiting,
    BuildGameBoard,
    InGame,
    GameOver,
}

impl GameStatus {
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        use GameStatus::*;
        matches!(
            (self, next),
            (LobbyWaiting, BuildGameBoard)
                | (BuildGameBoard, InGame)
                | (BuildGameBoard, GameOver)
                | (InGame, GameOver)
        )
    }

    pub fn is_finished(self) -> bool {
        self == GameStatus::GameOver
    }
}

/// Identity and display name of a seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub id: PlayerId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub shots: u32,
    pub hits: u32,
    pub ships_sunk: u32,
    pub items_used: u32,
    pub timeouts: u32,
}

/// Something that happened to a match, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Second player arrived; fleets may now be placed.
    BuildStarted,
    PlacementAccepted { player: PlayerId },
    /// Fleets are locked in and the first turn has begun.
    BattleStarted { first: PlayerId },
    MoveMade { player: PlayerId, record: MoveRecord },
    /// A player had no untouched cell left and lost their turn.
    TurnSkipped { player: PlayerId },
    TurnTimedOut { player: PlayerId },
    PlayerLeft { player: PlayerId },
    GameOver { winner: Option<PlayerId> },
}

#[derive(Debug, Clone)]
struct Seat {
    slot: PlayerSlot,
    fleet: Option<Board>,
    moves: Vec<MoveRecord>,
    targeted: BitBoard,
    energy: u32,
    banked_bonus_secs: u32,
    stats: PlayerStats,
}

impl Seat {
    fn new(slot: PlayerSlot, size: u8) -> Self {
        Seat {
            slot,
            fleet: None,
            moves: Vec::new(),
            targeted: BitBoard::new(size),
            energy: 0,
            banked_bonus_secs: 0,
            stats: PlayerStats::default(),
        }
    }
}

/// One match's live, mutable state.
#[derive(Debug)]
pub struct GameState {
    id: GameId,
    code: String,
    options: GameOptions,
    catalog: Vec<ShipDef>,
    status: GameStatus,
    seats: [Option<Seat>; 2],
    created_at: u64,
    build_started_at: Option<u64>,
    build_deadline: Option<u64>,
    turn_started_at: Option<u64>,
    turn_deadline: Option<u64>,
    turn: Option<usize>,
    winner: Option<PlayerId>,
    rng: SmallRng,
}

impl GameState {
    pub fn new(
        id: GameId,
        code: String,
        options: GameOptions,
        catalog: Vec<ShipDef>,
        rng: SmallRng,
        now: u64,
    ) -> Self {
        Self {
            id,
            code,
            options,
            catalog,
            status: GameStatus::LobbyWaiting,
            seats: [None, None],
            created_at: now,
            build_started_at: None,
            build_deadline: None,
            turn_started_at: None,
            turn_deadline: None,
            turn: None,
            winner: None,
            rng,
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    pub fn board_size(&self) -> u8 {
        self.options.board_size
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn build_deadline(&self) -> Option<u64> {
        self.build_deadline
    }

    pub fn turn_deadline(&self) -> Option<u64> {
        self.turn_deadline
    }

    /// Player whose turn it is.
    pub fn current_turn(&self) -> Option<PlayerId> {
        self.turn.and_then(|i| self.player_at(i))
    }

    /// Currently seated players.
    pub fn players(&self) -> Vec<PlayerId> {
        self.seats.iter().flatten().map(|s| s.slot.id).collect()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.seat_of(player).is_some()
    }

    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        let idx = self.seat_of(player)?;
        self.player_at(1 - idx)
    }

    /// The fleet a player submitted or was assigned.
    pub fn fleet_of(&self, player: PlayerId) -> Option<&[Ship]> {
        let idx = self.seat_of(player)?;
        self.seats[idx].as_ref()?.fleet.as_ref().map(|b| b.ships())
    }

    pub fn energy_of(&self, player: PlayerId) -> Option<u32> {
        self.seat(player).map(|s| s.energy)
    }

    pub fn stats_of(&self, player: PlayerId) -> Option<PlayerStats> {
        self.seat(player).map(|s| s.stats)
    }

    pub fn moves_of(&self, player: PlayerId) -> Option<&[MoveRecord]> {
        self.seat(player).map(|s| s.moves.as_slice())
    }

    /// The next wall-clock deadline this match is waiting on.
    pub fn next_deadline(&self) -> Option<u64> {
        match self.status {
            GameStatus::BuildGameBoard => self.build_deadline,
            GameStatus::InGame => self.turn_deadline,
            _ => None,
        }
    }

    fn seat_of(&self, player: PlayerId) -> Option<usize> {
        self.seats
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.slot.id == player))
    }

    fn seat(&self, player: PlayerId) -> Option<&Seat> {
        self.seat_of(player).and_then(|i| self.seats[i].as_ref())
    }

    fn player_at(&self, idx: usize) -> Option<PlayerId> {
        self.seats.get(idx)?.as_ref().map(|s| s.slot.id)
    }

    fn advance(&mut self, next: GameStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.status,
            next
        );
        if !self.status.can_transition_to(next) {
            tracing::error!(game_id = %self.id, from = ?self.status, to = ?next, "refusing illegal transition");
            return;
        }
        tracing::info!(game_id = %self.id, from = ?self.status, to = ?next, "game status changed");
        self.status = next;
    }

    /// Seat a player. The second arrival starts the build phase.
    pub fn add_player(&mut self, slot: PlayerSlot, now: u64) -> Result<Vec<SessionEvent>, GameError> {
        if self.status != GameStatus::LobbyWaiting {
            return Err(GameError::GameAlreadyStarted);
        }
        if self.contains(slot.id) {
            return Err(GameError::AlreadyInGame);
        }
        let idx = self
            .seats
            .iter()
            .position(Option::is_none)
            .ok_or(GameError::GameAlreadyStarted)?;
        self.seats[idx] = Some(Seat::new(slot, self.options.board_size));

        let mut events = Vec::new();
        if self.seats.iter().all(Option::is_some) {
            self.advance(GameStatus::BuildGameBoard);
            self.build_started_at = Some(now);
            self.build_deadline = Some(now.saturating_add(secs_to_millis(self.options.build_time_secs)));
            events.push(SessionEvent::BuildStarted);
        }
        Ok(events)
    }

    /// Accept a player's fleet during the build phase.
    pub fn submit_placement(
        &mut self,
        player: PlayerId,
        ships: Vec<Ship>,
        now: u64,
    ) -> Result<Vec<SessionEvent>, GameError> {
        if self.status != GameStatus::BuildGameBoard {
            return Err(GameError::NoGameInProgress);
        }
        let idx = self.seat_of(player).ok_or(GameError::InvalidPlayer)?;
        if self.seats[idx].as_ref().is_some_and(|s| s.fleet.is_some()) {
            return Err(GameError::FleetAlreadySubmitted);
        }
        let size = self.options.board_size;
        let fleet: Vec<Ship> = ships.iter().map(Ship::pristine).collect();
        board::validate_matches_catalog(&fleet, &self.catalog)?;
        let placed = Board::from_fleet(&fleet, size)?;

        let seat = self.seats[idx].as_mut().ok_or(GameError::InvalidPlayer)?;
        seat.fleet = Some(placed);

        let mut events = vec![SessionEvent::PlacementAccepted { player }];
        let all_submitted = self
            .seats
            .iter()
            .all(|s| s.as_ref().is_some_and(|s| s.fleet.is_some()));
        if all_submitted {
            self.start_battle(now, &mut events);
        }
        Ok(events)
    }

    /// Apply a move for the player whose turn it is.
    pub fn submit_move(&mut self, player: PlayerId, mv: Move, now: u64) -> Result<Vec<SessionEvent>, GameError> {
        if self.status != GameStatus::InGame {
            return Err(GameError::NoGameInProgress);
        }
        let idx = self.seat_of(player).ok_or(GameError::InvalidPlayer)?;
        if self.turn != Some(idx) {
            return Err(GameError::NotYourTurn);
        }
        let size = self.options.board_size;
        let hit_energy = self.options.hit_energy;
        let hit_bonus = self.options.move_hit_time_bonus_secs;

        let [first, second] = &mut self.seats;
        let (me, opponent) = match idx {
            0 => (first.as_mut(), second.as_mut()),
            _ => (second.as_mut(), first.as_mut()),
        };
        let (me, opponent) = me.zip(opponent).ok_or(GameError::NoGameInProgress)?;
        let target = opponent.fleet.as_mut().ok_or(GameError::NoGameInProgress)?;

        moves::validate(&mv, size, &me.moves, &me.targeted)?;
        let cost = energy_cost(&mv);
        if cost > me.energy {
            return Err(MoveError::NotEnoughEnergy {
                required: cost,
                available: me.energy,
            }
            .into());
        }

        let record = moves::resolve(&mv, target, &me.targeted);
        me.targeted |= mv.affected_cells(size);
        let gained = hit_energy.saturating_mul(record.hits.len() as u32);
        me.energy = me.energy.saturating_sub(cost).saturating_add(gained);
        if mv.is_item() {
            me.stats.items_used += 1;
        } else {
            me.stats.shots += 1;
        }
        me.stats.hits += record.hits.len() as u32;
        me.stats.ships_sunk += record.sunk.len() as u32;
        if record.is_hit() {
            me.banked_bonus_secs = me.banked_bonus_secs.saturating_add(hit_bonus);
        }
        me.moves.push(record.clone());
        let fleet_destroyed = target.all_sunk();

        tracing::debug!(game_id = %self.id, %player, ?mv, hits = record.hits.len(), "move resolved");
        let mut events = vec![SessionEvent::MoveMade { player, record }];
        if fleet_destroyed {
            self.finish(Some(player), &mut events);
        } else {
            self.pass_turn(idx, now, &mut events);
        }
        Ok(events)
    }

    /// Remove a player. Mid-match this ends the game in favour of the other
    /// player; in the lobby it simply frees the seat.
    pub fn leave(&mut self, player: PlayerId, _now: u64) -> Result<Vec<SessionEvent>, GameError> {
        let idx = self.seat_of(player).ok_or(GameError::InvalidPlayer)?;
        if self.status == GameStatus::GameOver {
            return Err(GameError::NoGameInProgress);
        }
        self.seats[idx] = None;
        let mut events = vec![SessionEvent::PlayerLeft { player }];
        if self.status != GameStatus::LobbyWaiting {
            let winner = self.player_at(1 - idx);
            self.finish(winner, &mut events);
        }
        Ok(events)
    }

    /// Apply any deadline that has passed by `now`.
    pub fn tick(&mut self, now: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match self.status {
            GameStatus::BuildGameBoard if self.build_deadline.is_some_and(|d| now >= d) => {
                self.start_battle(now, &mut events);
            }
            GameStatus::InGame if self.turn_deadline.is_some_and(|d| now >= d) => {
                if let Some(idx) = self.turn {
                    let turn_energy = self.options.turn_energy;
                    if let Some(seat) = self.seats[idx].as_mut() {
                        seat.energy = seat.energy.saturating_sub(turn_energy);
                        seat.stats.timeouts += 1;
                        tracing::info!(game_id = %self.id, player = %seat.slot.id, "turn timed out");
                        events.push(SessionEvent::TurnTimedOut { player: seat.slot.id });
                    }
                    self.pass_turn(idx, now, &mut events);
                }
            }
            _ => {}
        }
        events
    }

    /// Returns `true` while either player still has an untouched cell.
    pub fn is_any_move_still_possible(&self) -> bool {
        (0..2).any(|i| self.can_move(i))
    }

    fn can_move(&self, idx: usize) -> bool {
        self.seats[idx]
            .as_ref()
            .is_some_and(|s| moves::is_any_move_still_possible(&s.targeted))
    }

    fn start_battle(&mut self, now: u64, events: &mut Vec<SessionEvent>) {
        let size = self.options.board_size;
        for idx in 0..2 {
            let missing = self.seats[idx].as_ref().is_some_and(|s| s.fleet.is_none());
            if !missing {
                continue;
            }
            let placed = board::randomize(&mut self.rng, size, &self.catalog)
                .and_then(|fleet| Board::from_fleet(&fleet, size));
            match placed {
                Ok(placed) => {
                    if let Some(seat) = self.seats[idx].as_mut() {
                        tracing::info!(game_id = %self.id, player = %seat.slot.id, "assigned random fleet");
                        seat.fleet = Some(placed);
                    }
                }
                Err(e) => {
                    tracing::error!(game_id = %self.id, error = %e, "fleet randomisation failed; ending game");
                    self.finish(None, events);
                    return;
                }
            }
        }

        self.advance(GameStatus::InGame);
        self.build_deadline = None;
        let starting_energy = self.options.starting_energy;
        for seat in self.seats.iter_mut().flatten() {
            seat.energy = starting_energy;
        }
        let first = self.rng.random_range(0..2usize);
        self.begin_turn(first, now);
        if let Some(first) = self.player_at(first) {
            events.push(SessionEvent::BattleStarted { first });
        }
    }

    fn begin_turn(&mut self, idx: usize, now: u64) {
        let turn_energy = self.options.turn_energy;
        let move_time = self.options.move_time_secs;
        let mut bonus = 0;
        if let Some(seat) = self.seats[idx].as_mut() {
            seat.energy = seat.energy.saturating_add(turn_energy);
            bonus = core::mem::take(&mut seat.banked_bonus_secs);
        }
        self.turn = Some(idx);
        self.turn_started_at = Some(now);
        self.turn_deadline = Some(now.saturating_add(secs_to_millis(move_time.saturating_add(bonus))));
    }

    fn pass_turn(&mut self, from: usize, now: u64, events: &mut Vec<SessionEvent>) {
        let next = 1 - from;
        if self.can_move(next) {
            self.begin_turn(next, now);
        } else if self.can_move(from) {
            if let Some(player) = self.player_at(next) {
                events.push(SessionEvent::TurnSkipped { player });
            }
            self.begin_turn(from, now);
        } else {
            let hits = |i: usize| self.seats[i].as_ref().map_or(0, |s| s.stats.hits);
            let winner = match hits(from).cmp(&hits(next)) {
                core::cmp::Ordering::Greater => self.player_at(from),
                core::cmp::Ordering::Less => self.player_at(next),
                core::cmp::Ordering::Equal => None,
            };
            self.finish(winner, events);
        }
    }

    fn finish(&mut self, winner: Option<PlayerId>, events: &mut Vec<SessionEvent>) {
        self.advance(GameStatus::GameOver);
        self.winner = winner;
        self.turn = None;
        self.turn_started_at = None;
        self.turn_deadline = None;
        self.build_deadline = None;
        tracing::info!(game_id = %self.id, winner = ?winner, "game over");
        events.push(SessionEvent::GameOver { winner });
    }

    /// Render the state as seen by `viewer`. Opponent ships are hidden until
    /// sunk or until the game is over.
    pub fn snapshot_for(&self, viewer: Option<PlayerId>) -> GameSnapshot {
        let reveal_all = self.status.is_finished();
        let players = core::array::from_fn(|i| {
            self.seats[i].as_ref().map(|seat| {
                let own = viewer == Some(seat.slot.id);
                let fleet = seat
                    .fleet
                    .as_ref()
                    .map(|b| {
                        b.ships()
                            .iter()
                            .filter(|s| own || reveal_all || s.sunk)
                            .copied()
                            .collect()
                    })
                    .unwrap_or_default();
                PlayerView {
                    id: seat.slot.id,
                    name: seat.slot.name.clone(),
                    fleet_submitted: seat.fleet.is_some(),
                    fleet,
                    energy: seat.energy,
                    moves: seat.moves.clone(),
                    stats: seat.stats,
                }
            })
        });
        GameSnapshot {
            id: self.id,
            code: self.code.clone(),
            board_size: self.options.board_size,
            options: self.options,
            status: self.status,
            players,
            available_ships: self.catalog.clone(),
            created_at: self.created_at,
            build_started_at: self.build_started_at,
            build_deadline: self.build_deadline,
            turn_started_at: self.turn_started_at,
            turn_deadline: self.turn_deadline,
            current_turn: self.current_turn(),
            winner: self.winner,
        }
    }
}

fn secs_to_millis(secs: u32) -> u64 {
    secs as u64 * 1000
}

/// One player's side of a [`GameSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub fleet_submitted: bool,
    pub fleet: Vec<Ship>,
    pub energy: u32,
    pub moves: Vec<MoveRecord>,
    pub stats: PlayerStats,
}

/// Immutable copy of a match taken under the session lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: GameId,
    pub code: String,
    pub board_size: u8,
    pub options: GameOptions,
    pub status: GameStatus,
    pub players: [Option<PlayerView>; 2],
    pub available_ships: Vec<ShipDef>,
    pub created_at: u64,
    pub build_started_at: Option<u64>,
    pub build_deadline: Option<u64>,
    pub turn_started_at: Option<u64>,
    pub turn_deadline: Option<u64>,
    pub current_turn: Option<PlayerId>,
    pub winner: Option<PlayerId>,
}

impl GameSnapshot {
    /// View of a specific player, if seated.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().flatten().find(|p| p.id == id)
    }
}
