use battleship_server::moves::{self, is_any_move_still_possible, Move, Orientation};
use battleship_server::{energy_cost, BitBoard, Board, MoveError, Rotation, Ship, SHIPS};

/// Carrier on row 0, battleship on row 2, cruiser on row 4, submarine at
/// (0, 6)-(1, 7) and destroyer on row 9.
fn board() -> Board {
    let fleet = vec![
        Ship::new(SHIPS[0], 0, 0, Rotation::East),
        Ship::new(SHIPS[1], 0, 2, Rotation::East),
        Ship::new(SHIPS[2], 0, 4, Rotation::East),
        Ship::new(SHIPS[3], 0, 6, Rotation::East),
        Ship::new(SHIPS[4], 0, 9, Rotation::East),
    ];
    Board::from_fleet(&fleet, 10).unwrap()
}

#[test]
fn test_shot_hit_and_miss() {
    let mut board = board();
    let empty = BitBoard::new(10);

    let hit = moves::resolve(&Move::Shot { x: 2, y: 0 }, &mut board, &empty);
    assert_eq!(hit.hits, vec![(2, 0)]);
    assert_eq!(hit.affected, vec![(2, 0)]);
    assert!(hit.sunk.is_empty());
    assert_eq!(hit.radar, None);

    let miss = moves::resolve(&Move::Shot { x: 9, y: 0 }, &mut board, &empty);
    assert!(!miss.is_hit());
}

#[test]
fn test_out_of_bounds_rejected() {
    let empty = BitBoard::new(10);
    for mv in [
        Move::Shot { x: 10, y: 0 },
        Move::Radar { x: 0, y: 10 },
        Move::SeaBomb { x: 10, y: 10 },
        Move::AirStrike {
            index: 10,
            orientation: Orientation::Vertical,
        },
    ] {
        assert_eq!(moves::validate(&mv, 10, &[], &empty), Err(MoveError::OutOfBounds));
    }
}

#[test]
fn test_repeat_shot_rejected() {
    let mut targeted = BitBoard::new(10);
    targeted.set(3, 3).unwrap();
    assert_eq!(
        moves::validate(&Move::Shot { x: 3, y: 3 }, 10, &[], &targeted),
        Err(MoveError::AlreadyTargeted { x: 3, y: 3 })
    );
    // Items may overlap cells that were already hit.
    assert!(moves::validate(&Move::SeaBomb { x: 2, y: 2 }, 10, &[], &targeted).is_ok());
}

#[test]
fn test_radar_counts_nearby_ship_cells() {
    let mut board = board();
    let empty = BitBoard::new(10);
    // 3x3 around (1, 1): (0..=2, 0..=2) covers carrier x 0..=2 and battleship x 0..=2.
    let record = moves::resolve(&Move::Radar { x: 1, y: 1 }, &mut board, &empty);
    assert_eq!(record.radar, Some(6));
    assert!(record.affected.is_empty());
    assert!(record.hits.is_empty());
    assert!(board.ships().iter().all(|s| s.hits == 0));

    // Corner radar is clipped to the board.
    let record = moves::resolve(&Move::Radar { x: 9, y: 9 }, &mut board, &empty);
    assert_eq!(record.radar, Some(0));

    // A repeated radar at the same point is refused.
    let prior = [record];
    assert_eq!(
        moves::validate(&Move::Radar { x: 9, y: 9 }, 10, &prior, &empty),
        Err(MoveError::RadarAlreadyUsed { x: 9, y: 9 })
    );
}

#[test]
fn test_sea_bomb_hits_block() {
    let mut board = board();
    let empty = BitBoard::new(10);
    let record = moves::resolve(&Move::SeaBomb { x: 0, y: 6 }, &mut board, &empty);
    assert_eq!(record.affected, vec![(0, 6), (1, 6), (0, 7), (1, 7)]);
    assert_eq!(record.hits.len(), 4);
    assert_eq!(record.sunk, vec![3]);
}

#[test]
fn test_repeat_sea_bomb_rejected() {
    let mut board = board();
    let empty = BitBoard::new(10);
    let bomb = Move::SeaBomb { x: 4, y: 4 };
    let record = moves::resolve(&bomb, &mut board, &empty);
    let targeted = bomb.affected_cells(10);
    let prior = [record];

    assert_eq!(
        moves::validate(&bomb, 10, &prior, &targeted),
        Err(MoveError::SeaBombAlreadyUsed { x: 4, y: 4 })
    );
    // A neighbouring anchor overlapping the same block is still allowed.
    assert!(moves::validate(&Move::SeaBomb { x: 3, y: 3 }, 10, &prior, &targeted).is_ok());
}

#[test]
fn test_sea_bomb_at_edge_is_clipped() {
    let mut board = board();
    let empty = BitBoard::new(10);
    let bomb = Move::SeaBomb { x: 9, y: 9 };
    assert!(moves::validate(&bomb, 10, &[], &empty).is_ok());
    let record = moves::resolve(&bomb, &mut board, &empty);
    assert_eq!(record.affected, vec![(9, 9)]);
}

#[test]
fn test_air_strike_row_and_column() {
    let mut board = board();
    let empty = BitBoard::new(10);

    let row = Move::AirStrike {
        index: 9,
        orientation: Orientation::Horizontal,
    };
    let record = moves::resolve(&row, &mut board, &empty);
    assert_eq!(record.affected.len(), 10);
    assert!(record.affected.iter().all(|&(_, y)| y == 9));
    assert_eq!(record.hits, vec![(0, 9), (1, 9)]);
    assert_eq!(record.sunk, vec![4]);

    let column = Move::AirStrike {
        index: 0,
        orientation: Orientation::Vertical,
    };
    assert_eq!(column.affected_cells(10).count_ones(), 10);
    assert!(column.affected_cells(10).iter_set_bits().all(|(x, _)| x == 0));

    assert_eq!(
        moves::validate(&row, 10, &[record], &empty),
        Err(MoveError::AirStrikeAlreadyUsed)
    );
}

#[test]
fn test_already_targeted_cells_not_resolved_again() {
    let mut board = board();
    let mut targeted = BitBoard::new(10);
    let first = moves::resolve(&Move::Shot { x: 0, y: 9 }, &mut board, &targeted);
    assert_eq!(first.hits.len(), 1);
    targeted.set(0, 9).unwrap();

    // The strike covers (0, 9) again, but only the fresh cell counts.
    let strike = Move::AirStrike {
        index: 9,
        orientation: Orientation::Horizontal,
    };
    let record = moves::resolve(&strike, &mut board, &targeted);
    assert_eq!(record.hits, vec![(1, 9)]);
    assert_eq!(record.sunk, vec![4]);
    assert_eq!(board.ships()[4].hits, 2);
}

#[test]
fn test_energy_costs() {
    assert_eq!(energy_cost(&Move::Shot { x: 0, y: 0 }), 0);
    assert_eq!(energy_cost(&Move::Radar { x: 0, y: 0 }), 2);
    assert_eq!(energy_cost(&Move::SeaBomb { x: 0, y: 0 }), 3);
    assert_eq!(
        energy_cost(&Move::AirStrike {
            index: 0,
            orientation: Orientation::Horizontal
        }),
        5
    );
}

#[test]
fn test_any_move_possible_until_board_exhausted() {
    let mut targeted = BitBoard::new(5);
    assert!(is_any_move_still_possible(&targeted));
    targeted.fill();
    assert!(!is_any_move_still_possible(&targeted));
    targeted.clear(4, 4).unwrap();
    assert!(is_any_move_still_possible(&targeted));
}
