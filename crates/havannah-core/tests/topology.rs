//! End-to-end board scenarios exercising the three win conditions and the
//! draw/monotonicity guarantees across the full size range.

use havannah_core::{Board, Coord, Move, Outcome, Piece};

fn cell(x: i16, y: i16) -> Move {
    Move::Cell(Coord::new(x, y))
}

#[test]
fn corner_bridge_win_is_detected_on_the_closing_move() {
    // (0,0), (1,0), (2,0) are mutual neighbours in sequence (each step the
    // (1,0) offset), so this chain connects corner 0 straight to corner 1
    // (size 3: m = 2).
    let mut b = Board::empty(3).unwrap();
    b.play(cell(0, 0), 1).unwrap();
    b.play(cell(0, 1), 2).unwrap();
    b.play(cell(1, 0), 1).unwrap();
    assert_eq!(b.outcome(), Outcome::Unknown);
    b.play(cell(0, 2), 2).unwrap();
    b.play(cell(2, 0), 1).unwrap();
    assert_eq!(b.outcome(), Outcome::P1);
    assert_eq!(b.outcome().winner(), Some(1));
}

#[test]
fn fork_win_across_three_edges() {
    // Three straight spokes out of a common centre on a size-5 board, each
    // landing on a different edge without touching any corner. Spokes
    // share the centre stone so the whole shape is one connected group;
    // the third edge closes the fork on the final move.
    let mut b = Board::empty(5).unwrap();
    let p1_moves = [
        (4, 4), // centre
        (3, 3), (2, 2), (2, 1), (2, 0), // spoke to edge 0
        (5, 4), (6, 4), (7, 4), (8, 5), // spoke to edge 2
        (4, 5), (4, 6), (3, 6), (2, 6), // spoke to edge 4, closes the fork
    ];
    let p2_moves = [
        (1, 1), (1, 2), (1, 3), (1, 4), (5, 1), (5, 2), (5, 3), (7, 5), (6, 2), (6, 3), (2, 3), (3, 1),
    ];
    for (i, &(x, y)) in p1_moves.iter().enumerate() {
        b.play(cell(x, y), 1).unwrap();
        if b.outcome().is_terminal() {
            break;
        }
        let (ox, oy) = p2_moves[i];
        b.play(cell(ox, oy), 2).unwrap();
    }
    assert_eq!(b.outcome(), Outcome::P1);
}

// Interior cells for a size-4 board that avoid the ring centred on (3,3)
// and never touch a corner or edge, so the opponent can never accidentally
// win.
const SAFE_4_CENTRE_3_3: [(i16, i16); 5] = [(1, 1), (1, 2), (1, 3), (2, 1), (5, 5)];

// Same, but avoiding the ring centred on (1,1) instead.
const SAFE_4_CENTRE_1_1: [(i16, i16); 5] = [(4, 4), (5, 4), (5, 5), (4, 3), (3, 5)];

#[test]
fn ring_win_encloses_a_cell() {
    let mut b = Board::empty(4).unwrap();
    let centre = Coord::new(3, 3);
    let mut safe = SAFE_4_CENTRE_3_3.iter().map(|&(x, y)| Coord::new(x, y));
    for dir in 0..6 {
        let ring_cell = centre.neighbour(dir);
        b.play(Move::Cell(ring_cell), 1).unwrap();
        if dir < 5 {
            b.play(Move::Cell(safe.next().unwrap()), 2).unwrap();
        }
    }
    assert_eq!(b.outcome(), Outcome::P1);
    assert_eq!(b.get(centre), Piece::Empty);
}

#[test]
fn full_board_with_no_winner_is_a_draw() {
    // Greedily avoid any move that would immediately win; once no such
    // move remains (or the board fills), the game must have reached a
    // terminal outcome either way, since play_inner sets Draw the instant
    // the last cell is filled without a win.
    let mut b = Board::empty(3).unwrap();
    loop {
        let player = b.toplay();
        if b.move_iter(false).next().is_none() {
            break;
        }
        let mv = b
            .move_iter(false)
            .find(|&m| !b.test_win(m, player))
            .unwrap_or_else(|| b.move_iter(false).next().unwrap());
        b.play(mv, player).unwrap();
        if b.outcome().is_terminal() {
            break;
        }
    }
    assert!(b.outcome().is_terminal());
}

#[test]
fn outcome_is_monotone_once_terminal() {
    let mut b = Board::empty(3).unwrap();
    for &(x, y, p) in &[(0, 0, 1), (0, 1, 2), (1, 0, 1), (0, 2, 2), (2, 0, 1)] {
        b.play(cell(x, y), p).unwrap();
    }
    let outcome_after_win = b.outcome();
    assert!(outcome_after_win.is_terminal());
    // any further play attempt is rejected, leaving outcome untouched
    assert!(b.play(cell(1, 1), 2).is_err());
    assert_eq!(b.outcome(), outcome_after_win);
}

#[test]
fn ring_permissive_flag_rejects_border_touching_rings() {
    // Centred on (1,1), this ring's six cells include corner (0,0) and
    // edge cells (1,0)/(0,1): a ring that touches the board's border.
    let mut b = Board::empty(4).unwrap();
    let centre = Coord::new(1, 1);
    let mut safe = SAFE_4_CENTRE_1_1.iter().map(|&(x, y)| Coord::new(x, y));
    for dir in 0..6 {
        let ring_cell = centre.neighbour(dir);
        b.play_ring_filtered(Move::Cell(ring_cell), 1, 0, false).unwrap();
        if dir < 5 {
            b.play(Move::Cell(safe.next().unwrap()), 2).unwrap();
        }
    }
    assert_eq!(b.outcome(), Outcome::Unknown);
}

#[test]
fn num_moves_tracks_plies_played() {
    let mut b = Board::empty(5).unwrap();
    assert_eq!(b.num_moves(), 0);
    b.play(cell(0, 0), 1).unwrap();
    b.play(cell(1, 0), 2).unwrap();
    assert_eq!(b.num_moves(), 2);
    assert_eq!(b.moves_remain(), havannah_core::num_cells(5) as u32 - 2);
}
