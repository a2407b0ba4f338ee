//! Error types for board construction and move validation.

use thiserror::Error;

/// Errors surfaced by [`crate::Board`] construction and mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Board side length must be 3..=10.
    #[error("board size {size} out of range 3..=10")]
    InvalidArgument {
        /// The rejected size.
        size: u8,
    },

    /// The move is off-board, the cell is occupied, or the game is already
    /// decided.
    #[error("invalid move: {reason}")]
    InvalidMove {
        /// Why the move was rejected.
        reason: &'static str,
    },
}
