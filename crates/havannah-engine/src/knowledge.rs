//! Knowledge heuristics: pure scalar priors over a `Board`, summed into a
//! child's `know` field at expansion.
//!
//! Grounded on `original_source/playeruct.cpp`'s `add_knowledge` and
//! `test_bridge_probe` — this module ports that function term-by-term, one
//! heuristic per weight in [`Config`](crate::Config), plus the `dists`
//! knob's BFS restored from the same file's `dists.get` call.

use std::collections::VecDeque;

use havannah_core::{diameter, Board, Coord, Move, Piece};

use crate::Config;

/// Sum of every enabled heuristic for playing `candidate` right after
/// `prev_move`, scaled by `config.knowledge`. `toplay` is the player about
/// to play `candidate`.
pub fn knowledge(board: &Board, config: &Config, prev_move: Move, candidate: Move, toplay: u8) -> f64 {
    let mut know = 0.0;

    if config.local_reply != 0.0 {
        know += local_reply_bonus(prev_move, candidate, config.local_reply);
    }
    if config.locality != 0.0 {
        know += config.locality * board.local(candidate, toplay) as f64;
    }

    if config.connect != 0.0 || config.size != 0.0 {
        let cell = board.test_cell(candidate, toplay);
        if config.connect != 0.0 {
            know += config.connect * (cell.num_corners() + cell.num_edges()) as f64;
        }
        if config.size != 0.0 {
            know += config.size * cell.group_size() as f64;
        }
    }

    if config.bridge != 0.0 && test_bridge_probe(board, prev_move, candidate) {
        know += config.bridge;
    }

    if config.dists != 0.0 {
        let d = edge_distance(board, candidate, toplay);
        let slack = (diameter(board.size()) as i32).saturating_sub(d as i32).max(0);
        know += config.dists.abs() * slack as f64;
    }

    config.knowledge * know
}

/// Boost for playing adjacent (within 3 hex steps) to the move that led
/// into this node — encourages locally coherent lines of play.
fn local_reply_bonus(prev_move: Move, candidate: Move, weight: f64) -> f64 {
    let dist = prev_move.dist(candidate);
    if dist < 4 {
        weight * (4 - dist) as f64
    } else {
        0.0
    }
}

/// Port of `test_bridge_probe`: true when `candidate` is the one empty
/// cell forced by the opponent having just played a move that threatens
/// two of our bridged groups at once, one hex-step away from `prev_move`.
///
/// Walks the eight (six plus wraparound of two) neighbours of `prev_move`
/// in a three-state machine that looks for "ours, empty, ours" either side
/// of the board border, and checks whether `candidate` is the empty cell
/// in between.
fn test_bridge_probe(board: &Board, prev_move: Move, candidate: Move) -> bool {
    let (Some(mv), Some(test)) = (prev_move.coord(), candidate.coord()) else {
        return false;
    };
    if mv.dist(test) != 1 {
        return false;
    }

    let piece = match board.get(mv) {
        Piece::P1 => Piece::P2,
        Piece::P2 => Piece::P1,
        Piece::Empty => return false,
    };

    let mut state = 0u8;
    let mut equals = false;
    for i in 0..8 {
        let cur: Coord = mv.neighbour(i % 6);
        let on = cur.on_board(board.size());
        let v = if on { board.get(cur) } else { Piece::Empty };

        match state {
            0 => {
                if !on || v == piece {
                    state = 1;
                }
            }
            1 => {
                if on {
                    if v == Piece::Empty {
                        state = 2;
                        equals = test == cur;
                    } else if v != piece {
                        state = 0;
                    }
                }
            }
            _ => {
                if !on || v == piece {
                    if equals {
                        return true;
                    }
                    state = 1;
                } else {
                    state = 0;
                }
            }
        }
    }
    false
}

/// Breadth-first shortest path, in plies, from `mv` to the nearer of the
/// board's border cells, stepping for free through `player`'s own stones
/// and paying one ply per empty cell crossed; blocked entirely by the
/// opponent. A minimal stand-in for the original's full multi-source
/// Dijkstra (`Dists::run`/`Dists::get`), restored here only because the
/// `dists` config knob is otherwise unused.
fn edge_distance(board: &Board, mv: Move, player: u8) -> u16 {
    let Some(start) = mv.coord() else { return u16::MAX };
    let piece = Piece::from_player(player);
    let size = board.size();

    if start.corner(size).is_some() || start.edge(size).is_some() {
        return 0;
    }

    let mut best = u16::MAX;
    let mut dist = std::collections::HashMap::new();
    dist.insert(start, 0u16);
    let mut queue = VecDeque::new();
    queue.push_back(start);

    while let Some(c) = queue.pop_front() {
        let d = dist[&c];
        if d >= best {
            continue;
        }
        for i in 0..6 {
            let n = c.neighbour(i);
            if !n.on_board(size) {
                continue;
            }
            let occ = board.get(n);
            if occ != Piece::Empty && occ != piece {
                continue;
            }
            let step = if occ == piece { 0 } else { 1 };
            let nd = d + step;
            if dist.get(&n).is_none_or(|&cur| nd < cur) {
                dist.insert(n, nd);
                if n.corner(size).is_some() || n.edge(size).is_some() {
                    best = best.min(nd);
                } else if step == 0 {
                    queue.push_front(n);
                } else {
                    queue.push_back(n);
                }
            }
        }
    }
    best
}
