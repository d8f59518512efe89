pub mod bitboard;
pub mod board;
pub mod codec;
mod common;
pub mod config;
pub mod connection;
pub mod game;
mod logging;
pub mod moves;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
mod ship;
pub mod transport;

pub use bitboard::{BitBoard, BitBoardError};
pub use board::Board;
pub use common::*;
pub use config::*;
pub use game::*;
pub use logging::init_logging;
pub use moves::{Move, MoveRecord, Orientation};
pub use protocol::*;
pub use registry::{PlayerSender, Registry};
pub use server::Server;
pub use ship::*;
pub use transport::in_memory::InMemoryTransport;
pub use transport::tcp::TcpTransport;
pub use transport::Transport;
