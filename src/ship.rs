//! Ship definitions and footprint geometry.

use serde::{Deserialize, Serialize};

use crate::bitboard::BitBoard;
use crate::common::BoardError;

/// Four-way rotation of a ship around its anchor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    East,
    South,
    West,
    North,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::East,
        Rotation::South,
        Rotation::West,
        Rotation::North,
    ];

    /// Unit step along the ship's length.
    pub fn along(self) -> (i32, i32) {
        match self {
            Rotation::East => (1, 0),
            Rotation::South => (0, 1),
            Rotation::West => (-1, 0),
            Rotation::North => (0, -1),
        }
    }

    /// Unit step across the ship's width: `along` turned 90° clockwise.
    pub fn across(self) -> (i32, i32) {
        let (dx, dy) = self.along();
        (-dy, dx)
    }
}

/// Catalog entry describing a ship a player must place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShipDef {
    pub id: u8,
    pub length: u8,
    pub width: u8,
}

impl ShipDef {
    /// Create a new ship definition.
    pub const fn new(id: u8, length: u8, width: u8) -> Self {
        Self { id, length, width }
    }

    /// Number of cells the ship covers.
    pub fn cell_count(&self) -> u8 {
        self.length * self.width
    }
}

/// A ship placed on a board. Occupied cells are always derived from the
/// anchor, rotation and dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    pub id: u8,
    pub x: u8,
    pub y: u8,
    pub rotation: Rotation,
    pub length: u8,
    pub width: u8,
    pub hits: u8,
    pub sunk: bool,
}

impl Ship {
    /// Place a ship described by `def` at `(x, y)` with `rotation`.
    pub fn new(def: ShipDef, x: u8, y: u8, rotation: Rotation) -> Self {
        Ship {
            id: def.id,
            x,
            y,
            rotation,
            length: def.length,
            width: def.width,
            hits: 0,
            sunk: false,
        }
    }

    /// The catalog shape this ship claims to be.
    pub fn def(&self) -> ShipDef {
        ShipDef::new(self.id, self.length, self.width)
    }

    /// Number of cells the ship covers.
    pub fn cell_count(&self) -> u8 {
        self.def().cell_count()
    }

    /// Occupied cells, possibly off-board.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> {
        let (ax, ay) = self.rotation.along();
        let (cx, cy) = self.rotation.across();
        let (x0, y0) = (self.x as i32, self.y as i32);
        let width = self.width as i32;
        (0..self.length as i32).flat_map(move |i| {
            (0..width).map(move |j| (x0 + i * ax + j * cx, y0 + i * ay + j * cy))
        })
    }

    /// Returns `true` if the ship covers `(x, y)`.
    pub fn occupies(&self, x: i32, y: i32) -> bool {
        self.cells().any(|c| c == (x, y))
    }

    /// Occupancy mask on a `size`×`size` board.
    pub fn footprint(&self, size: u8) -> Result<BitBoard, BoardError> {
        BitBoard::from_cells(size, self.cells())
            .map_err(|_| BoardError::OutOfBounds { ship_id: self.id })
    }

    /// Record a hit on this ship. Returns `true` if the hit sank it.
    ///
    /// A ship sinks once its hit count reaches its length, whatever its width.
    pub fn register_hit(&mut self) -> bool {
        if self.sunk {
            return false;
        }
        self.hits = self.hits.saturating_add(1);
        if self.hits >= self.length {
            self.sunk = true;
            return true;
        }
        false
    }

    /// Copy of the ship with combat state cleared.
    pub fn pristine(&self) -> Self {
        Ship {
            hits: 0,
            sunk: false,
            ..*self
        }
    }
}
