//! Attacks: plain shots and items, their affected cells, validation against
//! a player's earlier moves, and resolution against the opposing fleet.

use serde::{Deserialize, Serialize};

use crate::bitboard::BitBoard;
use crate::board::Board;
use crate::common::{Cell, MoveError};

/// Line an air-strike flies along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Strikes the whole row `index`.
    Horizontal,
    /// Strikes the whole column `index`.
    Vertical,
}

/// A single attack submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Move {
    Shot { x: u8, y: u8 },
    /// Reports ship cells in the 3×3 square around the point; hits nothing.
    Radar { x: u8, y: u8 },
    /// 2×2 block extending right and down from the anchor.
    SeaBomb { x: u8, y: u8 },
    AirStrike { index: u8, orientation: Orientation },
}

impl Move {
    /// Whether this move is an item rather than a plain shot.
    pub fn is_item(&self) -> bool {
        !matches!(self, Move::Shot { .. })
    }

    /// Cells this move attacks on a `size`×`size` board, clipped to the board.
    pub fn affected_cells(&self, size: u8) -> BitBoard {
        match *self {
            Move::Shot { x, y } => BitBoard::from_cells_clipped(size, [(x as i32, y as i32)]),
            Move::Radar { .. } => BitBoard::new(size),
            Move::SeaBomb { x, y } => {
                let (x, y) = (x as i32, y as i32);
                BitBoard::from_cells_clipped(size, [(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)])
            }
            Move::AirStrike { index, orientation } => {
                let line = index as i32;
                let cells = (0..size as i32).map(move |i| match orientation {
                    Orientation::Horizontal => (i, line),
                    Orientation::Vertical => (line, i),
                });
                BitBoard::from_cells_clipped(size, cells)
            }
        }
    }

    /// The 3×3 radar window, clipped. Empty for non-radar moves.
    pub fn radar_area(&self, size: u8) -> BitBoard {
        match *self {
            Move::Radar { x, y } => {
                let (x, y) = (x as i32, y as i32);
                let cells = (-1..=1).flat_map(move |dy| (-1..=1).map(move |dx| (x + dx, y + dy)));
                BitBoard::from_cells_clipped(size, cells)
            }
            _ => BitBoard::new(size),
        }
    }

    fn in_bounds(&self, size: u8) -> bool {
        match *self {
            Move::Shot { x, y } | Move::Radar { x, y } | Move::SeaBomb { x, y } => x < size && y < size,
            Move::AirStrike { index, .. } => index < size,
        }
    }
}

/// A resolved move as kept in a player's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub mv: Move,
    pub affected: Vec<Cell>,
    pub hits: Vec<Cell>,
    /// Ships sunk by this move.
    pub sunk: Vec<u8>,
    /// Ship cells seen by a radar.
    pub radar: Option<u8>,
}

impl MoveRecord {
    pub fn is_hit(&self) -> bool {
        !self.hits.is_empty()
    }
}

/// Check `mv` against the board bounds and the player's earlier moves.
///
/// `targeted` is the union of the cells the player already attacked.
pub fn validate(mv: &Move, size: u8, prior: &[MoveRecord], targeted: &BitBoard) -> Result<(), MoveError> {
    if !mv.in_bounds(size) {
        return Err(MoveError::OutOfBounds);
    }
    match *mv {
        Move::Shot { x, y } => {
            if targeted.contains(x as i32, y as i32) {
                return Err(MoveError::AlreadyTargeted { x, y });
            }
        }
        Move::Radar { x, y } => {
            if prior.iter().any(|r| r.mv == *mv) {
                return Err(MoveError::RadarAlreadyUsed { x, y });
            }
        }
        Move::SeaBomb { x, y } => {
            if prior.iter().any(|r| r.mv == *mv) {
                return Err(MoveError::SeaBombAlreadyUsed { x, y });
            }
        }
        Move::AirStrike { .. } => {
            if prior.iter().any(|r| r.mv == *mv) {
                return Err(MoveError::AirStrikeAlreadyUsed);
            }
        }
    }
    Ok(())
}

/// Resolve a validated move against the opponent's fleet.
///
/// Only cells outside `targeted` are resolved, so striking the same cell
/// twice never counts twice. The caller merges the affected cells into
/// `targeted` afterwards.
pub fn resolve(mv: &Move, opponent: &mut Board, targeted: &BitBoard) -> MoveRecord {
    let size = opponent.size();
    let affected = mv.affected_cells(size);
    let fresh = affected & !*targeted;
    let mut hits = Vec::new();
    let mut sunk = Vec::new();
    for (x, y) in fresh.iter_set_bits() {
        if let Some((ship_id, sunk_now)) = opponent.strike(x, y) {
            hits.push((x, y));
            if sunk_now {
                sunk.push(ship_id);
            }
        }
    }
    let radar = match mv {
        Move::Radar { .. } => Some(opponent.ship_cells_in(&mv.radar_area(size)) as u8),
        _ => None,
    };
    MoveRecord {
        mv: *mv,
        affected: affected.iter_set_bits().collect(),
        hits,
        sunk,
        radar,
    }
}

/// Returns `true` while at least one cell of the board is still untouched.
pub fn is_any_move_still_possible(targeted: &BitBoard) -> bool {
    !targeted.is_full()
}
