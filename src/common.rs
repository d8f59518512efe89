//! Rule-level error types shared by the validators and the session.

use crate::bitboard::BitBoardError;
use crate::protocol::ErrorType;

/// Coordinates of a single board cell, `(x, y)`.
pub type Cell = (u8, u8);

/// Errors returned by fleet placement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Underlying bitboard error (e.g., invalid size or index).
    #[error("bitboard error: {0}")]
    BitBoard(#[from] BitBoardError),
    /// A ship's footprint leaves the board.
    #[error("ship {ship_id} is out of bounds")]
    OutOfBounds { ship_id: u8 },
    /// Two ships share at least one cell.
    #[error("ship {ship_id} overlaps ship {other_id}")]
    Overlap { ship_id: u8, other_id: u8 },
    /// The fleet contains a ship that was not offered.
    #[error("ship {ship_id} is not in the catalog")]
    UnknownShip { ship_id: u8 },
    /// The same catalog ship appears twice.
    #[error("ship {ship_id} is placed more than once")]
    DuplicateShip { ship_id: u8 },
    /// The ship's dimensions differ from its catalog entry.
    #[error("ship {ship_id} does not match its catalog shape")]
    ShapeMismatch { ship_id: u8 },
    /// A catalog ship was left out of the fleet.
    #[error("ship {ship_id} is missing from the fleet")]
    MissingShip { ship_id: u8 },
    /// Random placement ran out of attempts.
    #[error("unable to place ship {ship_id}")]
    UnableToPlaceShip { ship_id: u8 },
}

/// Errors returned by move validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// The move's primary coordinate is off the board.
    #[error("move is out of bounds")]
    OutOfBounds,
    /// A plain shot at a cell this player already targeted.
    #[error("cell ({x}, {y}) was already targeted")]
    AlreadyTargeted { x: u8, y: u8 },
    /// A second radar at the same point.
    #[error("radar was already used at ({x}, {y})")]
    RadarAlreadyUsed { x: u8, y: u8 },
    /// A second sea-bomb at the same anchor.
    #[error("sea-bomb was already dropped at ({x}, {y})")]
    SeaBombAlreadyUsed { x: u8, y: u8 },
    /// A second air-strike along the same line.
    #[error("air-strike already flown along this line")]
    AirStrikeAlreadyUsed,
    /// The player cannot pay the item's energy cost.
    #[error("not enough energy: need {required}, have {available}")]
    NotEnoughEnergy { required: u32, available: u32 },
}

/// Errors returned by session operations. Each maps onto a wire
/// [`ErrorType`] through [`GameError::error_type`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("no game in progress")]
    NoGameInProgress,
    #[error("player is not part of this game")]
    InvalidPlayer,
    #[error("player is already in this game")]
    AlreadyInGame,
    #[error("game has already started")]
    GameAlreadyStarted,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("fleet was already submitted")]
    FleetAlreadySubmitted,
    #[error("invalid placement: {0}")]
    InvalidPlacement(#[from] BoardError),
    #[error("invalid move: {0}")]
    InvalidMove(#[from] MoveError),
}

impl GameError {
    /// The error kind reported to the client.
    pub fn error_type(&self) -> ErrorType {
        match self {
            GameError::NoGameInProgress => ErrorType::NoGameInProgress,
            GameError::InvalidPlayer => ErrorType::InvalidPlayer,
            GameError::AlreadyInGame => ErrorType::AlreadyInGame,
            GameError::GameAlreadyStarted => ErrorType::GameAlreadyStarted,
            GameError::NotYourTurn => ErrorType::NotYourTurn,
            GameError::FleetAlreadySubmitted | GameError::InvalidPlacement(_) => ErrorType::InvalidPlacement,
            GameError::InvalidMove(_) => ErrorType::InvalidMove,
        }
    }
}
