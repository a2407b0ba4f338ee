//! The Havannah board: hexagonal topology, move legality, and incremental
//! win detection via union-find augmented with edge/corner bitmasks and
//! ring detection.
//!
//! Grounded on `original_source/board.h`'s `Board::move`/`join_groups`/
//! `detectring`/`followring`.

use std::fmt;

use crate::cell::{Cell, Piece};
use crate::error::BoardError;
use crate::hex::{self, Coord};
use crate::mv::Move;
use crate::symmetry;

/// The outcome of a game. Monotone: once set to a terminal value, a
/// [`Board`] never changes it again except by being replaced wholesale.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Outcome {
    #[default]
    Unknown,
    Draw,
    P1,
    P2,
}

impl Outcome {
    pub fn from_player(p: u8) -> Outcome {
        match p {
            1 => Outcome::P1,
            2 => Outcome::P2,
            _ => Outcome::Unknown,
        }
    }

    pub fn winner(self) -> Option<u8> {
        match self {
            Outcome::P1 => Some(1),
            Outcome::P2 => Some(2),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Unknown)
    }
}

/// Hexagonal Havannah board of side `size` (3..=10), value-copied before
/// each rollout.
#[derive(Clone, Debug)]
pub struct Board {
    size: u8,
    size_d: i16,
    num_moves: u32,
    outcome: Outcome,
    cells: Vec<Cell>,
}

impl Board {
    /// Construct an empty board. `size` must be 3..=10.
    pub fn empty(size: u8) -> Result<Board, BoardError> {
        if !(3..=10).contains(&size) {
            return Err(BoardError::InvalidArgument { size });
        }
        let size_d = hex::diameter(size) as i16;
        let n = (size_d * size_d) as usize;
        let mut cells = vec![
            Cell {
                piece: Piece::Empty,
                parent: 0,
                size: 1,
                corner_mask: 0,
                edge_mask: 0,
            };
            n
        ];
        for y in 0..size_d {
            for x in 0..size_d {
                let c = Coord::new(x, y);
                let i = (y * size_d + x) as usize;
                cells[i].parent = i as u16;
                if c.on_board(size) {
                    if let Some(k) = c.corner(size) {
                        cells[i].corner_mask = 1 << k;
                    }
                    if let Some(k) = c.edge(size) {
                        cells[i].edge_mask = 1 << k;
                    }
                }
            }
        }
        Ok(Board {
            size,
            size_d,
            num_moves: 0,
            outcome: Outcome::Unknown,
            cells,
        })
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn num_moves(&self) -> u32 {
        self.num_moves
    }

    pub fn moves_remain(&self) -> u32 {
        hex::num_cells(self.size) as u32 - self.num_moves
    }

    pub fn toplay(&self) -> u8 {
        (self.num_moves % 2) as u8 + 1
    }

    fn idx(&self, c: Coord) -> usize {
        c.y as usize * self.size_d as usize + c.x as usize
    }

    fn coord_of(&self, i: usize) -> Coord {
        let sd = self.size_d as usize;
        Coord::new((i % sd) as i16, (i / sd) as i16)
    }

    pub fn get(&self, c: Coord) -> Piece {
        self.cells[self.idx(c)].piece
    }

    /// True iff `mv` can legally be played right now.
    pub fn valid(&self, mv: Move) -> bool {
        match mv {
            Move::Cell(c) => {
                self.outcome == Outcome::Unknown && c.on_board(self.size) && self.get(c) == Piece::Empty
            }
            _ => false,
        }
    }

    /// Play `mv` for `player`. Ring detection uses no filtering.
    pub fn play(&mut self, mv: Move, player: u8) -> Result<(), BoardError> {
        self.play_inner(mv, player, 0, true, true)
    }

    /// Play `mv` for `player`, suppressing rings shorter than
    /// `min_ring_size` and (when `ring_permissive` is false) rings that
    /// touch the board border — the rollout-only speed knobs from spec.md
    /// §4.1.
    pub fn play_ring_filtered(
        &mut self,
        mv: Move,
        player: u8,
        min_ring_size: u8,
        ring_permissive: bool,
    ) -> Result<(), BoardError> {
        self.play_inner(mv, player, min_ring_size, ring_permissive, true)
    }

    fn play_inner(
        &mut self,
        mv: Move,
        player: u8,
        min_ring_size: u8,
        ring_permissive: bool,
        detect_rings: bool,
    ) -> Result<(), BoardError> {
        if !self.valid(mv) {
            return Err(BoardError::InvalidMove {
                reason: "cell off-board, occupied, or game already decided",
            });
        }
        let c = mv.coord().expect("valid() only accepts Move::Cell");
        let idx = self.idx(c);
        let piece = Piece::from_player(player);
        self.cells[idx].piece = piece;
        self.num_moves += 1;

        let mut any_already_joined = false;
        for dir in 0..6 {
            let n = c.neighbour(dir);
            if n.on_board(self.size) {
                let ni = self.idx(n);
                if self.cells[ni].piece == piece {
                    any_already_joined |= self.union(idx, ni);
                }
            }
        }

        let root = self.find(idx);
        let (numcorners, numedges, groupsize) = {
            let g = &self.cells[root];
            (g.num_corners(), g.num_edges(), g.size)
        };

        if numcorners >= 2 || numedges >= 3 {
            self.outcome = Outcome::from_player(player);
        } else if any_already_joined
            && groupsize >= 6
            && detect_rings
            && self.detect_ring(idx, root, min_ring_size, ring_permissive)
        {
            self.outcome = Outcome::from_player(player);
        } else if self.num_moves as usize == hex::num_cells(self.size) {
            self.outcome = Outcome::Draw;
        }

        Ok(())
    }

    fn find(&mut self, i: usize) -> usize {
        if self.cells[i].parent as usize != i {
            let root = self.find(self.cells[i].parent as usize);
            self.cells[i].parent = root as u16;
        }
        self.cells[i].parent as usize
    }

    /// Union the groups of `i` and `j`. Returns `true` if they were already
    /// the same group (the played cell just closed a cycle).
    fn union(&mut self, i: usize, j: usize) -> bool {
        let ri = self.find(i);
        let rj = self.find(j);
        if ri == rj {
            return true;
        }
        let (big, small) = if self.cells[ri].size >= self.cells[rj].size {
            (ri, rj)
        } else {
            (rj, ri)
        };
        self.cells[small].parent = big as u16;
        self.cells[big].size += self.cells[small].size;
        self.cells[big].corner_mask |= self.cells[small].corner_mask;
        self.cells[big].edge_mask |= self.cells[small].edge_mask;
        false
    }

    /// Walk outward from the just-played cell looking for a ring. Only
    /// called when the move closed a cycle in a group of size >= 6.
    fn detect_ring(&mut self, start_idx: usize, group: usize, min_ring_size: u8, permissive: bool) -> bool {
        let start = self.coord_of(start_idx);
        for dir in 0..6 {
            let n = start.neighbour(dir);
            if !n.on_board(self.size) {
                continue;
            }
            let ni = self.idx(n);
            if self.find(ni) != group {
                continue;
            }
            let mut path = vec![start];
            if self.follow_ring(start, n, dir, group, &mut path) {
                if (path.len() as u8) < min_ring_size {
                    continue;
                }
                if !permissive && path.iter().any(|c| c.edge(self.size).is_some() || c.corner(self.size).is_some()) {
                    continue;
                }
                return true;
            }
        }
        false
    }

    /// Follow only the three forward directions (`dir+5, dir+6, dir+7 mod
    /// 6`) — the backward directions either leave the board or are not
    /// part of the shortest cycle through the closing move.
    fn follow_ring(&mut self, start: Coord, cur: Coord, dir: usize, group: usize, path: &mut Vec<Coord>) -> bool {
        if cur == start {
            return true;
        }
        path.push(cur);
        for step in 5..=7 {
            let nd = (dir + step) % 6;
            let n = cur.neighbour(nd);
            if n.on_board(self.size) {
                let ni = self.idx(n);
                if self.find(ni) == group && self.follow_ring(start, n, nd, group, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    /// Speculative query: would playing `mv` as `player` win? Does not
    /// mutate the board (plays on a clone, as everywhere else in this
    /// crate — `Board` is cheap to value-copy by design).
    pub fn test_win(&self, mv: Move, player: u8) -> bool {
        self.test_win_checked(mv, player, true)
    }

    /// Like [`Board::test_win`], but ring detection can be skipped entirely
    /// (the rollout engine's `checkrings` throttle).
    pub fn test_win_checked(&self, mv: Move, player: u8, check_rings: bool) -> bool {
        if !self.valid(mv) {
            return false;
        }
        let mut copy = self.clone();
        copy.play_inner(mv, player, 0, true, check_rings).is_ok() && copy.outcome == Outcome::from_player(player)
    }

    /// The group `Cell` stats that would result from playing `mv` as
    /// `player` — used by knowledge heuristics (group size, corner/edge
    /// connectivity) without committing the move.
    pub fn test_cell(&self, mv: Move, player: u8) -> Cell {
        let c = mv.coord().expect("test_cell requires a cell move");
        let mut copy = self.clone();
        let _ = copy.play_inner(mv, player, 0, true, false);
        let idx = copy.idx(c);
        let root = copy.find(idx);
        copy.cells[root]
    }

    /// All legal moves. If `prune_symmetry` and the board is empty,
    /// restricts to one representative per D6 orbit (12-fold symmetry).
    pub fn move_iter(&self, prune_symmetry: bool) -> impl Iterator<Item = Move> + '_ {
        let symmetric_empty = prune_symmetry && self.num_moves == 0;
        let size = self.size;
        (0..self.cells.len()).filter_map(move |i| {
            let c = self.coord_of(i);
            if !c.on_board(size) || self.cells[i].piece != Piece::Empty {
                return None;
            }
            if symmetric_empty && !symmetry::is_orbit_representative(c, size) {
                return None;
            }
            Some(Move::Cell(c))
        })
    }

    /// Count of `player`'s stones within hex-distance 2 of `mv` (a
    /// knowledge prior for "played near existing stones").
    pub fn local(&self, mv: Move, player: u8) -> u32 {
        let Some(c) = mv.coord() else { return 0 };
        let piece = Piece::from_player(player);
        let mut count = 0;
        for dx in -2..=2i16 {
            for dy in -2..=2i16 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let n = Coord::new(c.x + dx, c.y + dy);
                if n.on_board(self.size) && c.dist(n) <= 2 && self.get(n) == piece {
                    count += 1;
                }
            }
        }
        count
    }

    /// Encode the six-neighbour colour pattern of `c` from `toplay`'s
    /// perspective into a base-4 key (0=empty, 1=mine, 2=theirs, 3=wall),
    /// for gamma-weighted rollout sampling.
    pub fn pattern(&self, c: Coord, toplay: u8) -> u32 {
        let mine = Piece::from_player(toplay);
        let theirs = mine.other();
        let mut key = 0u32;
        for dir in 0..6 {
            let n = c.neighbour(dir);
            let state: u32 = if !n.on_board(self.size) {
                3
            } else {
                let p = self.get(n);
                if p == Piece::Empty {
                    0
                } else if p == mine {
                    1
                } else {
                    debug_assert_eq!(p, theirs);
                    2
                }
            };
            key = key * 4 + state;
        }
        key
    }

    /// Invert a `pattern()` key to the opposite player's perspective
    /// (swaps the `mine`/`theirs` state in each of the six slots).
    pub fn pattern_invert(mut key: u32) -> u32 {
        let mut inverted = 0u32;
        let mut mult = 1u32;
        for _ in 0..6 {
            let state = key % 4;
            key /= 4;
            let flipped = match state {
                1 => 2,
                2 => 1,
                other => other,
            };
            inverted += flipped * mult;
            mult *= 4;
        }
        inverted
    }
}

impl fmt::Display for Board {
    /// Text rendering used for display only: dots for empty, X for P1, O
    /// for P2, indented to look like a hexagon.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.size_d {
            let spaces = (self.size as i16 - 1 - y).unsigned_abs();
            write!(f, "{}", " ".repeat(spaces as usize))?;
            for x in 0..self.size_d {
                let c = Coord::new(x, y);
                if c.on_board(self.size) {
                    let ch = match self.get(c) {
                        Piece::Empty => '.',
                        Piece::P1 => 'X',
                        Piece::P2 => 'O',
                    };
                    write!(f, "{ch} ")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
