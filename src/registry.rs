//! Server-wide bookkeeping: connected players, the matchmaking queue, join
//! codes and live sessions.
//!
//! The lobby lock may be held while a session lock is taken, never the other
//! way round. Messages are pushed onto per-player outboxes; the connection
//! workers perform the actual network writes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex};

use crate::config::{GameOptions, OptionsError, ServerConfig, SHIPS};
use crate::game::{now_millis, GameId, GameState, GameStatus, PlayerId, PlayerSlot, SessionEvent};
use crate::common::GameError;
use crate::protocol::{ErrorType, Message};
use crate::session::{Applied, Session, Wake};

/// Outbox feeding one connection worker.
pub type PlayerSender = mpsc::UnboundedSender<Message>;

struct PlayerEntry {
    name: String,
    outbox: PlayerSender,
    in_queue: bool,
    /// Match the player is currently seated in.
    session: Option<GameId>,
    /// Most recent finished match, for late state requests.
    last_session: Option<GameId>,
}

struct Lobby {
    players: HashMap<PlayerId, PlayerEntry>,
    queue: VecDeque<PlayerId>,
    sessions: HashMap<GameId, Arc<Session>>,
    codes: HashMap<String, GameId>,
    rng: SmallRng,
    closed: bool,
}

/// Queue `msg` for `player`, logging if their worker is already gone.
fn push(player: PlayerId, outbox: &PlayerSender, msg: Message) {
    if outbox.send(msg).is_err() {
        tracing::debug!(%player, "outbox closed, dropping message");
    }
}

impl Lobby {
    fn send(&self, to: PlayerId, msg: Message) {
        if let Some(entry) = self.players.get(&to) {
            push(to, &entry.outbox, msg);
        }
    }

    fn deliver(&self, outbound: Vec<(PlayerId, Message)>) {
        for (to, msg) in outbound {
            self.send(to, msg);
        }
    }

    fn broadcast_queue(&self) {
        let queue_size = self.queue.len() as u32;
        for (&id, entry) in &self.players {
            let update = Message::QueueUpdate {
                queue_size,
                in_queue: entry.in_queue,
            };
            push(id, &entry.outbox, update);
        }
    }

    fn entry(&self, player: PlayerId) -> Result<&PlayerEntry, ErrorType> {
        self.players.get(&player).ok_or(ErrorType::InvalidPlayer)
    }

    /// Fails when the player is queued or seated.
    fn ensure_idle(&self, player: PlayerId) -> Result<(), ErrorType> {
        let entry = self.entry(player)?;
        if entry.in_queue {
            return Err(ErrorType::AlreadyInQueue);
        }
        if entry.session.is_some() {
            return Err(ErrorType::AlreadyInGame);
        }
        Ok(())
    }

    fn slot(&self, player: PlayerId) -> Result<PlayerSlot, ErrorType> {
        let entry = self.entry(player)?;
        Ok(PlayerSlot {
            id: player,
            name: entry.name.clone(),
        })
    }

    fn bind(&mut self, player: PlayerId, game: GameId) {
        if let Some(entry) = self.players.get_mut(&player) {
            entry.session = Some(game);
        }
    }

    fn active_session(&self, player: PlayerId) -> Option<Arc<Session>> {
        let game = self.players.get(&player)?.session?;
        self.sessions.get(&game).cloned()
    }

    /// A six-digit code not currently in use.
    fn unique_code(&mut self) -> String {
        loop {
            let code = format!("{:06}", self.rng.random_range(100_000..=999_999u32));
            if !self.codes.contains_key(&code) {
                return code;
            }
        }
    }
}

pub struct Registry {
    config: ServerConfig,
    lobby: Mutex<Lobby>,
    next_player: AtomicU64,
    next_game: AtomicU64,
}

impl Registry {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        Arc::new(Self {
            config,
            lobby: Mutex::new(Lobby {
                players: HashMap::new(),
                queue: VecDeque::new(),
                sessions: HashMap::new(),
                codes: HashMap::new(),
                rng,
                closed: false,
            }),
            next_player: AtomicU64::new(1),
            next_game: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Admit a new connection and greet it with `Register`. Returns `None`
    /// once the server is shutting down.
    pub async fn register(&self, outbox: PlayerSender) -> Option<PlayerId> {
        let mut lobby = self.lobby.lock().await;
        if lobby.closed {
            if outbox.send(Message::error(ErrorType::ServerClosed)).is_err() {
                tracing::debug!("connection gone before it could be refused");
            }
            return None;
        }
        let id = PlayerId(self.next_player.fetch_add(1, Ordering::Relaxed));
        let username = format!("Sailor-{}", id.0);
        let greeting = Message::Register {
            username: username.clone(),
            id,
            queue_length: lobby.queue.len() as u32,
        };
        push(id, &outbox, greeting);
        lobby.players.insert(
            id,
            PlayerEntry {
                name: username.clone(),
                outbox,
                in_queue: false,
                session: None,
                last_session: None,
            },
        );
        tracing::info!(player = %id, %username, "player registered");
        Some(id)
    }

    /// Dispatch one client message. Rule violations are answered with an
    /// `ErrorMessage`; only protocol misuse is returned as an error, which
    /// ends the connection.
    pub async fn handle_message(self: &Arc<Self>, player: PlayerId, msg: Message) -> anyhow::Result<()> {
        if !msg.is_client_message() {
            anyhow::bail!("unexpected server message from {}: {:?}", player, msg);
        }
        let outcome = match msg {
            Message::JoinQueue => self.join_queue(player).await,
            Message::LeaveQueue => self.leave_queue(player).await,
            Message::CreateGame { options } => self.create_game(player, options).await,
            Message::JoinGameWithCode { code } => self.join_with_code(player, &code).await,
            Message::PlayerUpdateShipPlacement { ships } => {
                self.with_session(player, move |state, now| state.submit_placement(player, ships, now))
                    .await
            }
            Message::PlayerMove { mv } => {
                self.with_session(player, move |state, now| state.submit_move(player, mv, now))
                    .await
            }
            hover @ Message::PlayerHover { .. } => self.relay_hover(player, hover).await,
            Message::LeaveGame => {
                self.with_session(player, move |state, now| state.leave(player, now))
                    .await
            }
            Message::RequestGameState => self.request_state(player).await,
            // Server-only kinds were refused above.
            _ => Ok(()),
        };
        if let Err(error_type) = outcome {
            tracing::debug!(%player, ?error_type, "request rejected");
            self.lobby.lock().await.send(player, Message::error(error_type));
        }
        Ok(())
    }

    async fn join_queue(self: &Arc<Self>, player: PlayerId) -> Result<(), ErrorType> {
        let mut lobby = self.lobby.lock().await;
        lobby.ensure_idle(player)?;
        if let Some(entry) = lobby.players.get_mut(&player) {
            entry.in_queue = true;
        }
        lobby.queue.push_back(player);
        tracing::info!(%player, queue = lobby.queue.len(), "joined queue");

        while lobby.queue.len() >= 2 {
            let (Some(a), Some(b)) = (lobby.queue.pop_front(), lobby.queue.pop_front()) else {
                break;
            };
            for p in [a, b] {
                if let Some(entry) = lobby.players.get_mut(&p) {
                    entry.in_queue = false;
                }
            }
            self.start_match(&mut lobby, [a, b]).await;
        }
        lobby.broadcast_queue();
        Ok(())
    }

    async fn leave_queue(&self, player: PlayerId) -> Result<(), ErrorType> {
        let mut lobby = self.lobby.lock().await;
        let entry = lobby.players.get_mut(&player).ok_or(ErrorType::InvalidPlayer)?;
        if !entry.in_queue {
            return Err(ErrorType::NotInQueue);
        }
        entry.in_queue = false;
        lobby.queue.retain(|&p| p != player);
        tracing::info!(%player, queue = lobby.queue.len(), "left queue");
        lobby.broadcast_queue();
        Ok(())
    }

    /// Pair two queued players into a fresh match with the default options.
    async fn start_match(self: &Arc<Self>, lobby: &mut Lobby, pair: [PlayerId; 2]) {
        let session = self.open_session(lobby, self.config.default_options);
        let mut outbound = Vec::new();
        for player in pair {
            let Ok(slot) = lobby.slot(player) else {
                continue;
            };
            let applied = session.apply(|state, now| state.add_player(slot, now)).await;
            match applied.result {
                Ok(()) => lobby.bind(player, session.id()),
                Err(e) => tracing::warn!(%player, error = %e, "could not seat queued player"),
            }
            outbound.extend(applied.outbound);
        }
        tracing::info!(game_id = %session.id(), a = %pair[0], b = %pair[1], "queue match created");
        lobby.deliver(outbound);
    }

    async fn create_game(self: &Arc<Self>, player: PlayerId, options: GameOptions) -> Result<(), ErrorType> {
        let mut lobby = self.lobby.lock().await;
        lobby.ensure_idle(player)?;
        options.validate(&self.config.board_sizes).map_err(|e| {
            tracing::debug!(%player, error = %e, "game options refused");
            match e {
                OptionsError::BoardSize { .. } => ErrorType::InvalidGameSize,
                OptionsError::NotPositive(_) | OptionsError::TooLarge { .. } => {
                    ErrorType::InvalidGameOptions
                }
            }
        })?;
        let slot = lobby.slot(player)?;
        let session = self.open_session(&mut lobby, options);
        let applied = session.apply(|state, now| state.add_player(slot, now)).await;
        applied.result.map_err(|e| e.error_type())?;
        lobby.bind(player, session.id());
        let game_state = session.snapshot(player).await;
        tracing::info!(%player, game_id = %session.id(), code = session.code(), "game created");
        lobby.send(player, Message::GameCreated { game_state });
        Ok(())
    }

    async fn join_with_code(&self, player: PlayerId, code: &str) -> Result<(), ErrorType> {
        let mut lobby = self.lobby.lock().await;
        lobby.ensure_idle(player)?;
        let game = *lobby.codes.get(code).ok_or(ErrorType::InvalidSessionCode)?;
        let session = lobby
            .sessions
            .get(&game)
            .cloned()
            .ok_or(ErrorType::InvalidSessionCode)?;
        let slot = lobby.slot(player)?;
        let applied = session.apply(|state, now| state.add_player(slot, now)).await;
        applied.result.map_err(|e| e.error_type())?;
        lobby.bind(player, game);
        tracing::info!(%player, game_id = %game, "joined game by code");
        lobby.deliver(applied.outbound);
        Ok(())
    }

    /// Register a new session and start its deadline task.
    fn open_session(self: &Arc<Self>, lobby: &mut Lobby, options: GameOptions) -> Arc<Session> {
        let id = GameId(self.next_game.fetch_add(1, Ordering::Relaxed));
        let code = lobby.unique_code();
        let rng = SmallRng::from_rng(&mut lobby.rng);
        let state = GameState::new(id, code.clone(), options, SHIPS.to_vec(), rng, now_millis());
        let session = Arc::new(Session::new(state));
        lobby.sessions.insert(id, Arc::clone(&session));
        lobby.codes.insert(code, id);
        tokio::spawn(Arc::clone(self).drive(Arc::clone(&session)));
        session
    }

    /// Run `op` against the player's current match and deliver the result.
    async fn with_session<F>(&self, player: PlayerId, op: F) -> Result<(), ErrorType>
    where
        F: FnOnce(&mut GameState, u64) -> Result<Vec<SessionEvent>, GameError> + Send,
    {
        let session = {
            let lobby = self.lobby.lock().await;
            lobby.entry(player)?;
            lobby.active_session(player)
        }
        .ok_or(ErrorType::NoGameInProgress)?;
        let applied = session.apply(op).await;
        let result = applied.result.clone();
        self.settle(&session, applied).await;
        result.map_err(|e| {
            tracing::debug!(%player, game_id = %session.id(), error = %e, "game rejected request");
            e.error_type()
        })
    }

    /// Deliver a session's output and release players who are no longer
    /// seated or whose match just ended.
    async fn settle(&self, session: &Session, applied: Applied) {
        let game = session.id();
        let mut lobby = self.lobby.lock().await;
        lobby.deliver(applied.outbound);
        for (id, entry) in lobby.players.iter_mut() {
            if entry.session != Some(game) {
                continue;
            }
            if applied.status.is_finished() || !applied.players.contains(id) {
                entry.session = None;
                entry.last_session = Some(game);
            }
        }
        if applied.status == GameStatus::LobbyWaiting && applied.players.is_empty() {
            tracing::info!(game_id = %game, "lobby abandoned by its creator");
            Self::discard(&mut lobby, game);
        }
    }

    async fn relay_hover(&self, player: PlayerId, hover: Message) -> Result<(), ErrorType> {
        let Message::PlayerHover { user_id, .. } = &hover else {
            return Ok(());
        };
        if *user_id != player {
            return Err(ErrorType::InvalidPlayer);
        }
        let lobby = self.lobby.lock().await;
        let Some(session) = lobby.active_session(player) else {
            return Ok(());
        };
        let target = session
            .inspect(|s| (s.status() == GameStatus::InGame).then(|| s.opponent_of(player)).flatten())
            .await;
        if let Some(opponent) = target {
            lobby.send(opponent, hover);
        }
        Ok(())
    }

    async fn request_state(&self, player: PlayerId) -> Result<(), ErrorType> {
        let lobby = self.lobby.lock().await;
        let entry = lobby.entry(player)?;
        let game = entry
            .session
            .or(entry.last_session)
            .ok_or(ErrorType::NoGameInProgress)?;
        let session = lobby.sessions.get(&game).ok_or(ErrorType::NoGameInProgress)?;
        let game_state = session.snapshot(player).await;
        lobby.send(player, Message::GameStateUpdate { game_state });
        Ok(())
    }

    /// Forget a connection. A seated player leaves their match.
    pub async fn disconnect(&self, player: PlayerId) {
        let session = {
            let mut lobby = self.lobby.lock().await;
            let Some(entry) = lobby.players.remove(&player) else {
                return;
            };
            if entry.in_queue {
                lobby.queue.retain(|&p| p != player);
                lobby.broadcast_queue();
            }
            entry.session.and_then(|game| lobby.sessions.get(&game).cloned())
        };
        tracing::info!(%player, "player disconnected");
        if let Some(session) = session {
            let applied = session.apply(|state, now| state.leave(player, now)).await;
            self.settle(&session, applied).await;
        }
    }

    /// Deadline task for one session. Exits once the session is reaped or
    /// closed.
    async fn drive(self: Arc<Self>, session: Arc<Session>) {
        loop {
            match session.wait().await {
                Wake::Closed => return,
                Wake::Changed => {}
                Wake::Deadline => {
                    let applied = session.apply(|_, _| Ok(Vec::new())).await;
                    self.settle(&session, applied).await;
                }
            }
            if session.status().await.is_finished() {
                break;
            }
        }
        tokio::time::sleep(self.config.retention).await;
        self.reap(session.id()).await;
    }

    /// Drop a finished session and its join code.
    pub async fn reap(&self, game: GameId) {
        let mut lobby = self.lobby.lock().await;
        if Self::discard(&mut lobby, game) {
            tracing::info!(game_id = %game, "session reaped");
        }
    }

    fn discard(lobby: &mut Lobby, game: GameId) -> bool {
        let Some(session) = lobby.sessions.remove(&game) else {
            return false;
        };
        lobby.codes.retain(|_, id| *id != game);
        for entry in lobby.players.values_mut() {
            if entry.last_session == Some(game) {
                entry.last_session = None;
            }
            if entry.session == Some(game) {
                entry.session = None;
            }
        }
        session.close();
        true
    }

    /// Tell every client the server is closing and drop their outboxes so
    /// connection workers drain and exit.
    pub async fn shutdown(&self) {
        let mut lobby = self.lobby.lock().await;
        lobby.closed = true;
        for (&id, entry) in &lobby.players {
            push(id, &entry.outbox, Message::error(ErrorType::ServerClosed));
        }
        lobby.players.clear();
        lobby.queue.clear();
        lobby.codes.clear();
        for (_, session) in lobby.sessions.drain() {
            session.close();
        }
        tracing::info!("registry shut down");
    }

    pub async fn queue_len(&self) -> usize {
        self.lobby.lock().await.queue.len()
    }

    pub async fn session_count(&self) -> usize {
        self.lobby.lock().await.sessions.len()
    }

    pub async fn player_count(&self) -> usize {
        self.lobby.lock().await.players.len()
    }

    /// Match the player is currently seated in.
    pub async fn session_of(&self, player: PlayerId) -> Option<GameId> {
        self.lobby.lock().await.players.get(&player)?.session
    }
}
