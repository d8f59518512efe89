//! Fleet placement: validation against the board and the catalog, random
//! layouts, and hit lookup on a placed fleet.

use rand::Rng;

use crate::bitboard::BitBoard;
use crate::common::BoardError;
use crate::ship::{Rotation, Ship, ShipDef};

/// Random placement attempts allowed per ship before a layout is abandoned.
pub const ATTEMPTS_PER_SHIP: usize = 1000;

/// Fresh layouts tried by [`randomize`] before giving up.
pub const LAYOUT_RESTARTS: usize = 64;

/// A player's fleet placed on an N×N board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: u8,
    ships: Vec<Ship>,
    ship_map: BitBoard,
}

impl Board {
    /// Create an empty board (no ships placed).
    pub fn new(size: u8) -> Self {
        Board {
            size,
            ships: Vec::new(),
            ship_map: BitBoard::new(size),
        }
    }

    /// Build a board from a complete fleet, rejecting out-of-bounds and
    /// overlapping ships. Adjacent ships are fine.
    pub fn from_fleet(fleet: &[Ship], size: u8) -> Result<Self, BoardError> {
        let mut board = Board::new(size);
        for ship in fleet {
            board.place(*ship)?;
        }
        Ok(board)
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    /// Board occupancy mask of all ships.
    pub fn ship_map(&self) -> BitBoard {
        self.ship_map
    }

    /// Returns `true` when every ship is sunk.
    pub fn all_sunk(&self) -> bool {
        self.ships.iter().all(|s| s.sunk)
    }

    /// Place a single ship, checking bounds and overlap.
    pub fn place(&mut self, ship: Ship) -> Result<(), BoardError> {
        let mask = ship.footprint(self.size)?;
        if self.ship_map.intersects(&mask) {
            let other_id = self
                .ships
                .iter()
                .find(|s| s.cells().any(|(x, y)| mask.contains(x, y)))
                .map_or(ship.id, |s| s.id);
            return Err(BoardError::Overlap {
                ship_id: ship.id,
                other_id,
            });
        }
        self.ship_map |= mask;
        self.ships.push(ship);
        Ok(())
    }

    /// Returns a random non-overlapping placement for `def`.
    pub fn random_placement<R: Rng>(&self, rng: &mut R, def: ShipDef) -> Result<Ship, BoardError> {
        for _ in 0..ATTEMPTS_PER_SHIP {
            let rotation = Rotation::ALL[rng.random_range(0..Rotation::ALL.len())];
            let x = rng.random_range(0..self.size);
            let y = rng.random_range(0..self.size);
            let ship = Ship::new(def, x, y, rotation);
            if let Ok(mask) = ship.footprint(self.size) {
                if !self.ship_map.intersects(&mask) {
                    return Ok(ship);
                }
            }
        }
        Err(BoardError::UnableToPlaceShip { ship_id: def.id })
    }

    /// Count ship cells inside `area`.
    pub fn ship_cells_in(&self, area: &BitBoard) -> usize {
        (self.ship_map & *area).count_ones()
    }

    /// Fire at `(x, y)`. Returns `None` on a miss, otherwise the hit ship's id
    /// and whether this hit sank it.
    pub fn strike(&mut self, x: u8, y: u8) -> Option<(u8, bool)> {
        let (x, y) = (x as i32, y as i32);
        if !self.ship_map.contains(x, y) {
            return None;
        }
        let ship = self.ships.iter_mut().find(|s| s.occupies(x, y))?;
        let sunk_now = ship.register_hit();
        Some((ship.id, sunk_now))
    }

    /// Consume the board, returning its ships.
    pub fn into_ships(self) -> Vec<Ship> {
        self.ships
    }
}

/// Check that every ship lies on a `size`×`size` board and no two ships
/// share a cell. Returns the fleet's occupancy on success.
pub fn validate(fleet: &[Ship], size: u8) -> Result<BitBoard, BoardError> {
    Board::from_fleet(fleet, size).map(|b| b.ship_map())
}

/// Check that `fleet` places exactly the ships in `available`: same ids and
/// shapes, each once.
pub fn validate_matches_catalog(fleet: &[Ship], available: &[ShipDef]) -> Result<(), BoardError> {
    let mut seen = vec![false; available.len()];
    for ship in fleet {
        let idx = available
            .iter()
            .position(|def| def.id == ship.id)
            .ok_or(BoardError::UnknownShip { ship_id: ship.id })?;
        if seen[idx] {
            return Err(BoardError::DuplicateShip { ship_id: ship.id });
        }
        if available[idx] != ship.def() {
            return Err(BoardError::ShapeMismatch { ship_id: ship.id });
        }
        seen[idx] = true;
    }
    if let Some(idx) = seen.iter().position(|s| !s) {
        return Err(BoardError::MissingShip {
            ship_id: available[idx].id,
        });
    }
    Ok(())
}

/// Generate a random valid fleet for `available` on a `size`×`size` board.
///
/// Fails with `UnableToPlaceShip` only when the board is too small for the
/// catalog, which validated configurations never produce.
pub fn randomize<R: Rng>(rng: &mut R, size: u8, available: &[ShipDef]) -> Result<Vec<Ship>, BoardError> {
    let mut last_err = None;
    for _ in 0..LAYOUT_RESTARTS {
        let mut board = Board::new(size);
        let mut failed = false;
        for def in available {
            match board.random_placement(rng, *def) {
                Ok(ship) => board.place(ship)?,
                Err(e) => {
                    last_err = Some(e);
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            return Ok(board.into_ships());
        }
    }
    Err(last_err.unwrap_or(BoardError::UnableToPlaceShip { ship_id: 0 }))
}
