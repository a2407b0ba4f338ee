//! The board's D6 symmetry group (six rotations, six reflections), used to
//! prune the empty-board opening move list down to one representative per
//! orbit.

use crate::hex::Coord;

/// Rotate `c` by 60° clockwise about the board centre (`m = size - 1`).
fn rotate60(c: Coord, m: i16) -> Coord {
    let (dx, dy) = (c.x - m, c.y - m);
    Coord::new(dx - dy + m, dx + m)
}

/// Reflect `c` across the board's main diagonal.
fn reflect(c: Coord) -> Coord {
    Coord::new(c.y, c.x)
}

/// All twelve images of `c` under the board's symmetry group.
pub fn orbit(c: Coord, size: u8) -> [Coord; 12] {
    let m = size as i16 - 1;
    let mut out = [c; 12];
    let mut cur = c;
    for i in 0..6 {
        out[i] = cur;
        out[i + 6] = reflect(cur);
        cur = rotate60(cur, m);
    }
    out
}

/// True iff `c` is the lexicographically smallest coordinate in its orbit —
/// the representative that `move_iter(prune_symmetry = true)` keeps on an
/// empty board.
pub fn is_orbit_representative(c: Coord, size: u8) -> bool {
    orbit(c, size)
        .iter()
        .all(|&o| (o.y, o.x) >= (c.y, c.x))
}
