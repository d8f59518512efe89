use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::moves::Move;
use crate::ship::ShipDef;

pub const DEFAULT_BOARD_SIZE: u8 = 10;
pub const MIN_BOARD_SIZE: u8 = 5;
pub const MAX_BOARD_SIZE: u8 = crate::bitboard::MAX_BOARD_SIZE;
pub const NUM_SHIPS: usize = 5;
pub const SHIPS: [ShipDef; NUM_SHIPS] = [
    ShipDef::new(0, 5, 1),
    ShipDef::new(1, 4, 1),
    ShipDef::new(2, 3, 1),
    ShipDef::new(3, 2, 2),
    ShipDef::new(4, 2, 1),
];
const SHIP_NAMES: [&str; NUM_SHIPS] = ["Carrier", "Battleship", "Cruiser", "Submarine", "Destroyer"];

pub const RADAR_COST: u32 = 2;
pub const SEA_BOMB_COST: u32 = 3;
pub const AIR_STRIKE_COST: u32 = 5;

/// Upper bound for every time option, in seconds.
pub const MAX_OPTION_SECS: u32 = 3600;
/// Upper bound for every energy option.
pub const MAX_OPTION_ENERGY: u32 = 1000;

/// Display name of a catalog ship, or `None` if the id is unknown.
pub fn ship_name(id: u8) -> Option<&'static str> {
    SHIP_NAMES.get(id as usize).copied()
}

/// Energy an attack costs.
pub fn energy_cost(mv: &Move) -> u32 {
    match mv {
        Move::Shot { .. } => 0,
        Move::Radar { .. } => RADAR_COST,
        Move::SeaBomb { .. } => SEA_BOMB_COST,
        Move::AirStrike { .. } => AIR_STRIKE_COST,
    }
}

/// Per-match options chosen by the player creating a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOptions {
    pub board_size: u8,
    pub build_time_secs: u32,
    pub move_time_secs: u32,
    pub move_hit_time_bonus_secs: u32,
    pub starting_energy: u32,
    pub turn_energy: u32,
    pub hit_energy: u32,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            build_time_secs: 60,
            move_time_secs: 30,
            move_hit_time_bonus_secs: 5,
            starting_energy: 3,
            turn_energy: 1,
            hit_energy: 1,
        }
    }
}

/// Why a set of [`GameOptions`] was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("board size {size} outside {min}..={max}")]
    BoardSize { size: u8, min: u8, max: u8 },
    #[error("option `{0}` must be positive")]
    NotPositive(&'static str),
    #[error("option `{name}` exceeds {max}")]
    TooLarge { name: &'static str, max: u32 },
}

impl GameOptions {
    /// Check the board size against `sizes` and every other option against
    /// `1..=MAX_OPTION_SECS` or `1..=MAX_OPTION_ENERGY`.
    pub fn validate(&self, sizes: &RangeInclusive<u8>) -> Result<(), OptionsError> {
        if !sizes.contains(&self.board_size) {
            return Err(OptionsError::BoardSize {
                size: self.board_size,
                min: *sizes.start(),
                max: *sizes.end(),
            });
        }
        let fields = [
            ("build_time_secs", self.build_time_secs, MAX_OPTION_SECS),
            ("move_time_secs", self.move_time_secs, MAX_OPTION_SECS),
            ("move_hit_time_bonus_secs", self.move_hit_time_bonus_secs, MAX_OPTION_SECS),
            ("starting_energy", self.starting_energy, MAX_OPTION_ENERGY),
            ("turn_energy", self.turn_energy, MAX_OPTION_ENERGY),
            ("hit_energy", self.hit_energy, MAX_OPTION_ENERGY),
        ];
        for (name, value, max) in fields {
            if value == 0 {
                return Err(OptionsError::NotPositive(name));
            }
            if value > max {
                return Err(OptionsError::TooLarge { name, max });
            }
        }
        Ok(())
    }
}

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub board_sizes: RangeInclusive<u8>,
    /// Options used for matches paired through the queue.
    pub default_options: GameOptions,
    /// How long a finished session answers late state requests.
    pub retention: Duration,
    pub write_timeout: Duration,
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            board_sizes: MIN_BOARD_SIZE..=MAX_BOARD_SIZE,
            default_options: GameOptions::default(),
            retention: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            seed: None,
        }
    }
}
