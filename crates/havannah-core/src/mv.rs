//! Move representation: a board cell or one of the sentinel actions a
//! controller protocol can request.

use std::fmt;

use crate::hex::Coord;

/// A move: either a cell to play on, or a sentinel action.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Move {
    /// Place a stone at this coordinate.
    Cell(Coord),
    /// Swap sides (pie rule), if the controller protocol supports it.
    Swap,
    /// Resign the game.
    Resign,
    /// No move has been decided yet.
    Unknown,
    /// Explicitly no move (e.g. end of a finished game).
    None,
}

impl Move {
    pub fn coord(self) -> Option<Coord> {
        match self {
            Move::Cell(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_cell(self) -> bool {
        matches!(self, Move::Cell(_))
    }

    /// Hex distance between two cell moves. Non-cell moves are treated as
    /// infinitely far — knowledge heuristics that gate on proximity simply
    /// never fire for them.
    pub fn dist(self, other: Move) -> i16 {
        match (self.coord(), other.coord()) {
            (Some(a), Some(b)) => a.dist(b),
            _ => i16::MAX,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::Cell(c) => write!(f, "{},{}", c.x, c.y),
            Move::Swap => write!(f, "swap"),
            Move::Resign => write!(f, "resign"),
            Move::Unknown => write!(f, "unknown"),
            Move::None => write!(f, "none"),
        }
    }
}
