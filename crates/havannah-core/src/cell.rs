//! A single board cell: its piece, and its union-find group state.

/// What occupies a cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Piece {
    #[default]
    Empty,
    P1,
    P2,
}

impl Piece {
    /// The other player's piece. `Empty` maps to itself.
    pub fn other(self) -> Piece {
        match self {
            Piece::P1 => Piece::P2,
            Piece::P2 => Piece::P1,
            Piece::Empty => Piece::Empty,
        }
    }

    pub fn from_player(p: u8) -> Piece {
        match p {
            1 => Piece::P1,
            2 => Piece::P2,
            _ => Piece::Empty,
        }
    }

    pub fn as_player(self) -> Option<u8> {
        match self {
            Piece::P1 => Some(1),
            Piece::P2 => Some(2),
            Piece::Empty => None,
        }
    }
}

/// One cell's union-find state plus the group-wide corner/edge masks.
///
/// `parent`/`size`/`corner_mask`/`edge_mask` are only meaningful at the
/// group's root (the cell `i` for which `find(i) == i`); non-root cells
/// carry stale values that [`crate::Board`] never reads directly.
#[derive(Clone, Copy, Debug)]
pub struct Cell {
    pub piece: Piece,
    pub(crate) parent: u16,
    pub(crate) size: u16,
    pub(crate) corner_mask: u8,
    pub(crate) edge_mask: u8,
}

impl Cell {
    pub fn num_corners(&self) -> u32 {
        (self.corner_mask & 0x3F).count_ones()
    }

    pub fn num_edges(&self) -> u32 {
        (self.edge_mask & 0x3F).count_ones()
    }

    pub fn group_size(&self) -> u16 {
        self.size
    }
}
