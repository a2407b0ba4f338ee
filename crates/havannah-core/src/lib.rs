//! Board representation and rules for Havannah: hexagonal topology, move
//! legality, and incremental win detection (bridge, fork, ring).

mod board;
mod cell;
mod error;
mod hex;
mod mv;
mod symmetry;

pub use board::{Board, Outcome};
pub use cell::{Cell, Piece};
pub use error::BoardError;
pub use hex::{diameter, num_cells, Coord, NEIGHBOURS};
pub use mv::Move;
pub use symmetry::{is_orbit_representative, orbit};
