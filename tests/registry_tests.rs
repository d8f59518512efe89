use std::sync::Arc;
use std::time::Duration;

use battleship_server::{
    ErrorType, GameOptions, GameSnapshot, GameStatus, Message, Move, PlayerId, Registry, Rotation,
    ServerConfig, Ship, MAX_OPTION_ENERGY, MAX_OPTION_SECS, SHIPS,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Client {
    id: PlayerId,
    rx: UnboundedReceiver<Message>,
}

impl Client {
    /// Everything delivered so far.
    fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Wait for the first message matching `pred`, skipping others.
    async fn expect<F>(&mut self, mut pred: F) -> Message
    where
        F: FnMut(&Message) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let msg = self.rx.recv().await.expect("outbox closed");
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("timed out waiting for message")
    }

    fn last_error(&mut self) -> Option<ErrorType> {
        self.drain().into_iter().rev().find_map(|m| match m {
            Message::ErrorMessage { error_type } => Some(error_type),
            _ => None,
        })
    }
}

fn config() -> ServerConfig {
    ServerConfig {
        seed: Some(7),
        retention: Duration::from_millis(200),
        ..ServerConfig::default()
    }
}

async fn connect(registry: &Arc<Registry>) -> Client {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = registry.register(tx).await.expect("registry open");
    Client { id, rx }
}

async fn send(registry: &Arc<Registry>, client: &Client, msg: Message) {
    registry.handle_message(client.id, msg).await.unwrap();
}

fn snapshot_of(msg: &Message) -> Option<&GameSnapshot> {
    match msg {
        Message::GameCreated { game_state }
        | Message::GameStarting { game_state }
        | Message::GameStateUpdate { game_state }
        | Message::MoveMade { game_state, .. } => Some(game_state),
        _ => None,
    }
}

fn row_fleet() -> Vec<Ship> {
    vec![
        Ship::new(SHIPS[0], 0, 0, Rotation::East),
        Ship::new(SHIPS[1], 0, 2, Rotation::East),
        Ship::new(SHIPS[2], 0, 4, Rotation::East),
        Ship::new(SHIPS[3], 0, 6, Rotation::East),
        Ship::new(SHIPS[4], 0, 9, Rotation::East),
    ]
}

/// Pair two clients through the queue.
async fn paired(registry: &Arc<Registry>) -> (Client, Client) {
    let mut a = connect(registry).await;
    let mut b = connect(registry).await;
    send(registry, &a, Message::JoinQueue).await;
    send(registry, &b, Message::JoinQueue).await;
    a.drain();
    b.drain();
    (a, b)
}

/// Pair two clients and place both fleets. Returns (first, second).
async fn in_battle(registry: &Arc<Registry>) -> (Client, Client) {
    let (mut a, mut b) = paired(registry).await;
    send(registry, &a, Message::PlayerUpdateShipPlacement { ships: row_fleet() }).await;
    send(registry, &b, Message::PlayerUpdateShipPlacement { ships: row_fleet() }).await;
    let update = b
        .expect(|m| snapshot_of(m).is_some_and(|s| s.status == GameStatus::InGame))
        .await;
    let first = snapshot_of(&update).and_then(|s| s.current_turn).unwrap();
    a.drain();
    b.drain();
    if first == a.id {
        (a, b)
    } else {
        (b, a)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_register_greets_player() {
    let registry = Registry::new(config());
    let mut client = connect(&registry).await;
    let greeting = client.drain();
    assert_eq!(
        greeting,
        vec![Message::Register {
            username: format!("Sailor-{}", client.id.0),
            id: client.id,
            queue_length: 0,
        }]
    );
    assert_eq!(registry.player_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_queue_pairs_first_two_players() {
    let registry = Registry::new(config());
    let mut a = connect(&registry).await;
    let mut b = connect(&registry).await;
    a.drain();
    b.drain();

    send(&registry, &a, Message::JoinQueue).await;
    assert_eq!(
        a.drain(),
        vec![Message::QueueUpdate {
            queue_size: 1,
            in_queue: true
        }]
    );
    assert_eq!(
        b.drain(),
        vec![Message::QueueUpdate {
            queue_size: 1,
            in_queue: false
        }]
    );
    assert_eq!(registry.queue_len().await, 1);

    send(&registry, &b, Message::JoinQueue).await;
    for client in [&mut a, &mut b] {
        let messages = client.drain();
        let Message::GameStarting { game_state } = &messages[0] else {
            panic!("expected GameStarting, got {:?}", messages);
        };
        assert_eq!(game_state.status, GameStatus::BuildGameBoard);
        let deadline = game_state.build_deadline.unwrap();
        assert_eq!(deadline - game_state.build_started_at.unwrap(), 60_000);
        assert_eq!(
            messages.last(),
            Some(&Message::QueueUpdate {
                queue_size: 0,
                in_queue: false
            })
        );
    }
    assert_eq!(registry.queue_len().await, 0);
    let game = registry.session_of(a.id).await.unwrap();
    assert_eq!(registry.session_of(b.id).await, Some(game));

    send(&registry, &a, Message::JoinQueue).await;
    assert_eq!(a.last_error(), Some(ErrorType::AlreadyInGame));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_queue_errors() {
    let registry = Registry::new(config());
    let mut a = connect(&registry).await;
    a.drain();

    send(&registry, &a, Message::LeaveQueue).await;
    assert_eq!(a.last_error(), Some(ErrorType::NotInQueue));

    send(&registry, &a, Message::JoinQueue).await;
    send(&registry, &a, Message::JoinQueue).await;
    assert_eq!(a.last_error(), Some(ErrorType::AlreadyInQueue));

    send(&registry, &a, Message::CreateGame { options: GameOptions::default() }).await;
    assert_eq!(a.last_error(), Some(ErrorType::AlreadyInQueue));

    send(&registry, &a, Message::LeaveQueue).await;
    assert_eq!(
        a.drain(),
        vec![Message::QueueUpdate {
            queue_size: 0,
            in_queue: false
        }]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_and_join_with_code() {
    let registry = Registry::new(config());
    let mut host = connect(&registry).await;
    let mut guest = connect(&registry).await;
    let mut late = connect(&registry).await;
    host.drain();
    guest.drain();
    late.drain();

    send(&registry, &host, Message::CreateGame { options: GameOptions::default() }).await;
    let created = host.drain();
    let Message::GameCreated { game_state } = &created[0] else {
        panic!("expected GameCreated, got {:?}", created);
    };
    assert_eq!(game_state.status, GameStatus::LobbyWaiting);
    assert_eq!(game_state.code.len(), 6);
    assert!(game_state.code.chars().all(|c| c.is_ascii_digit()));
    let code = game_state.code.clone();

    send(&registry, &late, Message::JoinGameWithCode { code: "000000".into() }).await;
    assert_eq!(late.last_error(), Some(ErrorType::InvalidSessionCode));

    send(&registry, &guest, Message::JoinGameWithCode { code: code.clone() }).await;
    for client in [&mut host, &mut guest] {
        let messages = client.drain();
        assert!(matches!(
            &messages[..],
            [Message::GameStarting { game_state }] if game_state.status == GameStatus::BuildGameBoard
        ));
    }

    send(&registry, &late, Message::JoinGameWithCode { code }).await;
    assert_eq!(late.last_error(), Some(ErrorType::GameAlreadyStarted));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_game_rejects_bad_options() {
    let registry = Registry::new(config());
    let mut host = connect(&registry).await;
    host.drain();

    for size in [4u8, 21, 0] {
        let options = GameOptions {
            board_size: size,
            ..GameOptions::default()
        };
        send(&registry, &host, Message::CreateGame { options }).await;
        assert_eq!(host.last_error(), Some(ErrorType::InvalidGameSize));
    }

    let refused = [
        GameOptions {
            move_time_secs: 0,
            ..GameOptions::default()
        },
        GameOptions {
            starting_energy: u32::MAX,
            ..GameOptions::default()
        },
        GameOptions {
            hit_energy: MAX_OPTION_ENERGY + 1,
            ..GameOptions::default()
        },
        GameOptions {
            move_time_secs: MAX_OPTION_SECS + 1,
            ..GameOptions::default()
        },
        GameOptions {
            move_hit_time_bonus_secs: u32::MAX,
            ..GameOptions::default()
        },
    ];
    for options in refused {
        send(&registry, &host, Message::CreateGame { options }).await;
        assert_eq!(host.last_error(), Some(ErrorType::InvalidGameOptions));
    }
    assert_eq!(registry.session_count().await, 0);

    // The limits themselves are accepted.
    let options = GameOptions {
        build_time_secs: MAX_OPTION_SECS,
        starting_energy: MAX_OPTION_ENERGY,
        ..GameOptions::default()
    };
    send(&registry, &host, Message::CreateGame { options }).await;
    host.expect(|m| matches!(m, Message::GameCreated { .. })).await;
    assert_eq!(registry.session_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_placement_and_moves() {
    let registry = Registry::new(config());
    let (mut a, mut b) = paired(&registry).await;

    let mut bad = row_fleet();
    bad[0].x = 8;
    send(&registry, &a, Message::PlayerUpdateShipPlacement { ships: bad }).await;
    assert_eq!(a.last_error(), Some(ErrorType::InvalidPlacement));

    send(&registry, &a, Message::PlayerMove { mv: Move::Shot { x: 0, y: 0 } }).await;
    assert_eq!(a.last_error(), Some(ErrorType::NoGameInProgress));

    send(&registry, &a, Message::PlayerUpdateShipPlacement { ships: row_fleet() }).await;
    // Accepted silently until both fleets are in.
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());

    send(&registry, &b, Message::PlayerUpdateShipPlacement { ships: row_fleet() }).await;
    let update = a
        .expect(|m| matches!(m, Message::GameStateUpdate { .. }))
        .await;
    let snapshot = snapshot_of(&update).unwrap();
    assert_eq!(snapshot.status, GameStatus::InGame);
    let first = snapshot.current_turn.unwrap();
    let (mut first, mut second) = if first == a.id { (a, b) } else { (b, a) };
    first.drain();
    second.drain();

    send(&registry, &second, Message::PlayerMove { mv: Move::Shot { x: 0, y: 0 } }).await;
    assert_eq!(second.last_error(), Some(ErrorType::NotYourTurn));

    send(&registry, &first, Message::PlayerMove { mv: Move::Shot { x: 0, y: 9 } }).await;
    let (first_id, second_id) = (first.id, second.id);
    for client in [&mut first, &mut second] {
        let messages = client.drain();
        let Message::MoveMade { player, record, game_state } = &messages[0] else {
            panic!("expected MoveMade, got {:?}", messages);
        };
        assert_eq!(*player, first_id);
        assert_eq!(record.hits, vec![(0, 9)]);
        assert_eq!(game_state.current_turn, Some(second_id));
        // Unsunk ships stay hidden from the opponent.
        let opponent = if client.id == first_id { second_id } else { first_id };
        assert!(game_state.player(opponent).unwrap().fleet.is_empty());
    }

    send(&registry, &second, Message::PlayerMove { mv: Move::Radar { x: 20, y: 0 } }).await;
    assert_eq!(second.last_error(), Some(ErrorType::InvalidMove));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_leave_mid_match_and_late_state_request() {
    let registry = Registry::new(config());
    let (mut first, mut second) = in_battle(&registry).await;

    send(&registry, &first, Message::LeaveGame).await;
    let update = second
        .expect(|m| matches!(m, Message::GameStateUpdate { .. }))
        .await;
    let snapshot = snapshot_of(&update).unwrap();
    assert_eq!(snapshot.status, GameStatus::GameOver);
    assert_eq!(snapshot.winner, Some(second.id));
    assert_eq!(registry.session_of(first.id).await, None);
    assert_eq!(registry.session_of(second.id).await, None);

    // Finished sessions still answer until reaped.
    send(&registry, &second, Message::RequestGameState).await;
    let late = second.drain();
    assert!(matches!(
        &late[..],
        [Message::GameStateUpdate { game_state }] if game_state.status == GameStatus::GameOver
    ));

    send(&registry, &first, Message::LeaveGame).await;
    assert_eq!(first.last_error(), Some(ErrorType::NoGameInProgress));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(registry.session_count().await, 0);
    send(&registry, &second, Message::RequestGameState).await;
    assert_eq!(second.last_error(), Some(ErrorType::NoGameInProgress));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_creator_leaving_lobby_discards_session() {
    let registry = Registry::new(config());
    let mut host = connect(&registry).await;
    send(&registry, &host, Message::CreateGame { options: GameOptions::default() }).await;
    let created = host.expect(|m| matches!(m, Message::GameCreated { .. })).await;
    let code = snapshot_of(&created).unwrap().code.clone();
    assert_eq!(registry.session_count().await, 1);

    send(&registry, &host, Message::LeaveGame).await;
    assert_eq!(registry.session_count().await, 0);
    assert_eq!(registry.session_of(host.id).await, None);

    let mut guest = connect(&registry).await;
    send(&registry, &guest, Message::JoinGameWithCode { code }).await;
    assert_eq!(guest.last_error(), Some(ErrorType::InvalidSessionCode));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_leaves_queue_and_match() {
    let registry = Registry::new(config());
    let mut waiting = connect(&registry).await;
    let mut observer = connect(&registry).await;
    send(&registry, &waiting, Message::JoinQueue).await;
    observer.drain();

    registry.disconnect(waiting.id).await;
    assert_eq!(registry.queue_len().await, 0);
    assert_eq!(
        observer.drain(),
        vec![Message::QueueUpdate {
            queue_size: 0,
            in_queue: false
        }]
    );
    waiting.drain();

    let (first, mut second) = in_battle(&registry).await;
    registry.disconnect(first.id).await;
    let update = second
        .expect(|m| matches!(m, Message::GameStateUpdate { .. }))
        .await;
    assert_eq!(snapshot_of(&update).unwrap().winner, Some(second.id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_hover_relayed_to_opponent_only_in_battle() {
    let registry = Registry::new(config());
    let (mut a, mut b) = paired(&registry).await;
    let hover = |id: PlayerId| Message::PlayerHover {
        user_id: id,
        x: 2,
        y: 3,
        affected_fields: vec![(2, 3)],
    };

    send(&registry, &a, hover(a.id)).await;
    assert!(b.drain().is_empty());
    assert!(a.drain().is_empty());

    send(&registry, &a, Message::PlayerUpdateShipPlacement { ships: row_fleet() }).await;
    send(&registry, &b, Message::PlayerUpdateShipPlacement { ships: row_fleet() }).await;
    a.drain();
    b.drain();

    send(&registry, &a, hover(a.id)).await;
    assert_eq!(b.drain(), vec![hover(a.id)]);

    send(&registry, &a, hover(b.id)).await;
    assert_eq!(a.last_error(), Some(ErrorType::InvalidPlayer));
    assert!(b.drain().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_message_from_client_is_protocol_error() {
    let registry = Registry::new(config());
    let client = connect(&registry).await;
    let result = registry
        .handle_message(
            client.id,
            Message::QueueUpdate {
                queue_size: 0,
                in_queue: false,
            },
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deadlines_fire_without_client_activity() {
    let registry = Registry::new(config());
    let mut host = connect(&registry).await;
    let mut guest = connect(&registry).await;
    let options = GameOptions {
        build_time_secs: 1,
        move_time_secs: 1,
        ..GameOptions::default()
    };
    send(&registry, &host, Message::CreateGame { options }).await;
    let created = host.expect(|m| matches!(m, Message::GameCreated { .. })).await;
    let code = snapshot_of(&created).unwrap().code.clone();
    send(&registry, &guest, Message::JoinGameWithCode { code }).await;

    // Nobody places a fleet; both get random ones when the build timer fires.
    let started = guest
        .expect(|m| snapshot_of(m).is_some_and(|s| s.status == GameStatus::InGame))
        .await;
    let snapshot = snapshot_of(&started).unwrap();
    assert_eq!(snapshot.player(guest.id).unwrap().fleet.len(), 5);
    let first = snapshot.current_turn.unwrap();

    // Nobody moves either; the turn passes when the move timer fires.
    let timed_out = guest
        .expect(|m| {
            snapshot_of(m).is_some_and(|s| s.current_turn.is_some_and(|p| p != first))
        })
        .await;
    let snapshot = snapshot_of(&timed_out).unwrap();
    assert_eq!(snapshot.player(first).unwrap().stats.timeouts, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_notifies_everyone() {
    let registry = Registry::new(config());
    let mut a = connect(&registry).await;
    let (mut b, mut c) = in_battle(&registry).await;
    a.drain();

    registry.shutdown().await;
    for client in [&mut a, &mut b, &mut c] {
        assert_eq!(
            client.rx.recv().await,
            Some(Message::error(ErrorType::ServerClosed))
        );
        assert_eq!(client.rx.recv().await, None);
    }
    assert_eq!(registry.session_count().await, 0);

    let (tx, _rx) = mpsc::unbounded_channel();
    assert!(registry.register(tx).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dead_outbox_does_not_stall_broadcasts() {
    let registry = Registry::new(config());
    let mut alive = connect(&registry).await;
    let gone = connect(&registry).await;
    alive.drain();
    drop(gone.rx);

    send(&registry, &alive, Message::JoinQueue).await;
    assert_eq!(
        alive.drain(),
        vec![Message::QueueUpdate {
            queue_size: 1,
            in_queue: true
        }]
    );
    assert_eq!(registry.player_count().await, 2);

    registry.shutdown().await;
    assert_eq!(
        alive.rx.recv().await,
        Some(Message::error(ErrorType::ServerClosed))
    );
    assert_eq!(alive.rx.recv().await, None);

    // A refused late connection whose receiver is already gone is fine too.
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    assert!(registry.register(tx).await.is_none());
}
