//! The rollout engine: plays a board out to a terminal state using a mix
//! of tactical shortcuts and a knowledge-weighted (or plain shuffled)
//! random fill.
//!
//! Grounded on `original_source/playeruct.cpp`'s `rollout`,
//! `rollout_choose_move`, and `rollout_pattern`.

use std::collections::HashMap;

use rand::Rng;

use havannah_core::{Board, Coord, Move, Outcome as BoardOutcome, Piece};

use crate::config::Config;
use crate::movelist::{LastGoodReply, MoveList};

/// Gamma weight lookup feeding the weighted-random sampler. The original
/// engine trains these per-pattern from self-play; this crate has no
/// training pipeline, so [`UniformGammas`] is the only implementation
/// provided — it exercises the sampling machinery without favouring any
/// pattern over another.
pub trait Gammas: Send + Sync {
    fn gamma(&self, pattern: u32) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UniformGammas;

impl Gammas for UniformGammas {
    fn gamma(&self, _pattern: u32) -> f64 {
        1.0
    }
}

/// A Fenwick (binary indexed) tree over per-slot sampling weights:
/// O(log n) updates, O(log n) weighted draws.
#[derive(Debug)]
struct Fenwick {
    tree: Vec<f64>,
    weight: Vec<f64>,
}

impl Fenwick {
    fn new(n: usize) -> Self {
        Fenwick { tree: vec![0.0; n + 1], weight: vec![0.0; n] }
    }

    fn set_weight(&mut self, i: usize, w: f64) {
        let delta = w - self.weight[i];
        if delta == 0.0 {
            return;
        }
        self.weight[i] = w;
        let mut idx = i + 1;
        while idx < self.tree.len() {
            self.tree[idx] += delta;
            idx += idx & idx.wrapping_neg();
        }
    }

    fn prefix_sum(&self, mut idx: usize) -> f64 {
        let mut sum = 0.0;
        while idx > 0 {
            sum += self.tree[idx];
            idx -= idx & idx.wrapping_neg();
        }
        sum
    }

    fn total(&self) -> f64 {
        self.prefix_sum(self.weight.len())
    }

    /// The 0-indexed slot whose cumulative weight first exceeds `target`.
    /// `target` must fall in `[0, total())`.
    fn find(&self, mut target: f64) -> usize {
        let n = self.weight.len();
        let mut pos = 0usize;
        let mut bit = n.next_power_of_two();
        while bit > 0 {
            let next = pos + bit;
            if next <= n && self.tree[next] <= target {
                pos = next;
                target -= self.tree[next];
            }
            bit >>= 1;
        }
        pos
    }
}

struct WeightedPool {
    trees: [Fenwick; 2],
    coord_to_index: HashMap<Coord, usize>,
}

impl WeightedPool {
    fn build(board: &Board, moves: &[Coord], gammas: &dyn Gammas) -> Self {
        let n = moves.len();
        let mut trees = [Fenwick::new(n), Fenwick::new(n)];
        let mut coord_to_index = HashMap::with_capacity(n);
        for (i, &c) in moves.iter().enumerate() {
            let p1 = board.pattern(c, 1);
            let p2 = Board::pattern_invert(p1);
            trees[0].set_weight(i, gammas.gamma(p1));
            trees[1].set_weight(i, gammas.gamma(p2));
            coord_to_index.insert(c, i);
        }
        WeightedPool { trees, coord_to_index }
    }

    fn choose(&mut self, player: u8, rng: &mut impl Rng, moves: &[Coord]) -> Option<Coord> {
        let tree = &self.trees[player as usize - 1];
        let total = tree.total();
        if total <= 0.0 {
            return None;
        }
        let target = rng.gen::<f64>() * total;
        let idx = tree.find(target);
        moves.get(idx).copied()
    }

    /// Zero a played cell's weight in both trees so it is never redrawn,
    /// regardless of which mechanism played it.
    fn retire(&mut self, c: Coord) {
        if let Some(&idx) = self.coord_to_index.get(&c) {
            self.trees[0].set_weight(idx, 0.0);
            self.trees[1].set_weight(idx, 0.0);
        }
    }

    /// Recompute a still-empty neighbour's weight after a nearby move
    /// changes its six-neighbour pattern.
    fn refresh(&mut self, board: &Board, c: Coord, gammas: &dyn Gammas) {
        if let Some(&idx) = self.coord_to_index.get(&c) {
            if board.get(c) != Piece::Empty {
                return;
            }
            let p1 = board.pattern(c, 1);
            let p2 = Board::pattern_invert(p1);
            self.trees[0].set_weight(idx, gammas.gamma(p1));
            self.trees[1].set_weight(idx, gammas.gamma(p2));
        }
    }
}

enum Shortcut {
    Play(Move),
    /// The defender already has two unstoppable winning replies: the
    /// rollout is decided without simulating further.
    TwoThreats(Move, Move),
    None,
}

/// One call's worth of tactical lookahead, gated by a shared per-rollout
/// depth budget (`instwin_budget`) that is decremented on every call
/// regardless of which tier runs, exactly like the original's `doinstwin`.
fn tactical_shortcut(board: &Board, config: &Config, prev: Move, instwin_budget: &mut i32, check_rings: bool) -> Shortcut {
    *instwin_budget -= 1;
    if *instwin_budget < 0 || config.instantwin == 0 {
        return Shortcut::None;
    }

    let toplay = board.toplay();
    let opponent = if toplay == 1 { 2 } else { 1 };

    if config.instantwin == 1 {
        for mv in board.move_iter(false) {
            if board.test_win_checked(mv, toplay, check_rings) {
                return Shortcut::Play(mv);
            }
        }
        return Shortcut::None;
    }

    if config.instantwin == 2 {
        let mut loss = None;
        for mv in board.move_iter(false) {
            if board.test_win_checked(mv, toplay, check_rings) {
                return Shortcut::Play(mv);
            }
            if board.test_win_checked(mv, opponent, check_rings) {
                loss = Some(mv);
            }
        }
        return loss.map(Shortcut::Play).unwrap_or(Shortcut::None);
    }

    // instantwin >= 3: walk the contour of the group the previous move
    // extended, looking for cells that would already win it the game for
    // the side that just moved (i.e. a threat this side-to-move failed to
    // block in time).
    contour_scan(board, prev, opponent, check_rings).unwrap_or(Shortcut::None)
}

fn contour_scan(board: &Board, prev: Move, group_owner: u8, check_rings: bool) -> Option<Shortcut> {
    let prev_coord = prev.coord()?;
    let size = board.size();
    let owner_piece = Piece::from_player(group_owner);

    let mut start = None;
    let mut dir = 0usize;
    for i in 0..6 {
        let c = prev_coord.neighbour(i);
        if !c.on_board(size) || board.get(c) != owner_piece {
            start = Some(c);
            dir = (i + 5) % 6;
            break;
        }
    }
    let start = start?; // fully enclosed by its own group: rare, skip

    let mut cur = start;
    let mut loss: Option<Coord> = None;
    loop {
        if cur.on_board(size)
            && board.get(cur) == Piece::Empty
            && board.test_win_checked(Move::Cell(cur), group_owner, check_rings)
        {
            match loss {
                None => loss = Some(cur),
                Some(l) if l != cur => {
                    return Some(Shortcut::TwoThreats(Move::Cell(l), Move::Cell(cur)));
                }
                _ => {}
            }
        }

        let mut advanced = false;
        for i in 5..=9usize {
            let nd = (dir + i) % 6;
            let next = cur.neighbour(nd);
            if !next.on_board(size) || board.get(next) != owner_piece {
                cur = next;
                dir = nd;
                advanced = true;
                break;
            }
        }
        if !advanced || cur == start {
            break;
        }
    }

    loss.map(|l| Shortcut::Play(Move::Cell(l)))
}

/// Port of `rollout_pattern`: six consecutive neighbours of `prev` (offset
/// by `rotation`, which the caller advances each call to spread the load
/// across directions) in a three-state machine looking for "our
/// stone/border, empty, our stone/border" — the empty slot is a forced
/// save of a virtual connection the opponent's last move threatened.
fn bridge_probe_defence(board: &Board, prev: Move, rotation: usize) -> Option<Coord> {
    let mv = prev.coord()?;
    let piece = match board.get(mv) {
        Piece::P1 => Piece::P2,
        Piece::P2 => Piece::P1,
        Piece::Empty => return None,
    };

    let mut state = 0u8;
    let mut ret = None;
    for i in 0..8 {
        let cur = mv.neighbour((i + rotation) % 6);
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
                        ret = Some(cur);
                    } else if v != piece {
                        state = 0;
                    }
                }
            }
            _ => {
                if !on || v == piece {
                    return ret;
                } else {
                    state = 0;
                }
            }
        }
    }
    None
}

fn resolve_instwin_depth(config: &Config, size: u8) -> i32 {
    if config.instwin_depth < 0 {
        -config.instwin_depth * size as i32
    } else {
        config.instwin_depth
    }
}

/// Play `board` out to a terminal state, recording every move into
/// `movelist` and consulting/updating `last_good` on the way. Returns the
/// finished board's outcome.
pub fn rollout(
    board: &mut Board,
    config: &Config,
    gammas: &dyn Gammas,
    rng: &mut impl Rng,
    movelist: &mut MoveList,
    last_good: &mut LastGoodReply,
) -> BoardOutcome {
    let size = board.size();
    let num_remaining = board.moves_remain() as f64;
    let mut moves: Vec<Coord> = board.move_iter(false).filter_map(Move::coord).collect();

    let mut pool = config.weighted_random.then(|| WeightedPool::build(board, &moves, gammas));
    if !config.weighted_random {
        use rand::seq::SliceRandom;
        moves.shuffle(rng);
    }
    let mut shuffle_cursor = 0usize;

    let mut instwin_budget = resolve_instwin_depth(config, size);
    let mut check_rings = rng.gen::<f64>() < config.check_rings;
    let check_ring_depth = if config.check_ring_depth < 0 {
        (num_remaining * (-config.check_ring_depth) as f64).ceil() as i32
    } else {
        config.check_ring_depth
    };
    let ring_period = u32::from(config.ring_incr);
    let mut moves_into_rollout = 0u32;

    let mut forced: Option<Move> = None;
    let mut prev_move = movelist.iter().last().map(|p| p.mv).unwrap_or(Move::None);
    let mut pattern_rotation = 0usize;

    while board.outcome() == BoardOutcome::Unknown {
        let toplay = board.toplay();

        let mv = if let Some(f) = forced.take() {
            f
        } else {
            match tactical_shortcut(board, config, prev_move, &mut instwin_budget, check_rings) {
                Shortcut::Play(mv) => mv,
                Shortcut::TwoThreats(a, b) => {
                    forced = Some(b);
                    a
                }
                Shortcut::None => {
                    let bridge = config
                        .rollout_pattern
                        .then(|| {
                            pattern_rotation = (pattern_rotation + 1) % 6;
                            bridge_probe_defence(board, prev_move, pattern_rotation)
                        })
                        .flatten();

                    let reply = bridge.map(Move::Cell).or_else(|| {
                        (config.last_good_reply != 0 && prev_move != Move::Swap)
                            .then(|| last_good.get(toplay, prev_move))
                            .flatten()
                            .filter(|&mv| board.valid(mv))
                    });

                    match reply {
                        Some(mv) => mv,
                        None => sample_move(board, &mut pool, &mut moves, &mut shuffle_cursor, toplay, rng),
                    }
                }
            }
        };

        if let Some(c) = mv.coord() {
            if let Some(pool) = pool.as_mut() {
                pool.retire(c);
            }
        }

        let min_ring_size = if check_rings {
            config.ring_size_at(moves_into_rollout, ring_period)
        } else {
            0
        };
        movelist.push_rollout(mv, toplay);
        board
            .play_ring_filtered(mv, toplay, min_ring_size, config.ring_perm)
            .expect("rollout sampled an illegal move");

        moves_into_rollout += 1;
        check_rings &= (moves_into_rollout as i32) < check_ring_depth;

        if let (Some(pool), Some(c)) = (pool.as_mut(), mv.coord()) {
            for i in 0..6 {
                let n = c.neighbour(i);
                if n.on_board(size) {
                    pool.refresh(board, n, gammas);
                }
            }
        }

        prev_move = mv;
    }

    let winner = board.outcome().winner();
    if config.last_good_reply != 0 {
        update_last_good_reply(movelist, winner, config.last_good_reply, last_good);
    }

    board.outcome()
}

fn sample_move(
    board: &Board,
    pool: &mut Option<WeightedPool>,
    moves: &mut [Coord],
    shuffle_cursor: &mut usize,
    toplay: u8,
    rng: &mut impl Rng,
) -> Move {
    if let Some(pool) = pool {
        loop {
            if let Some(c) = pool.choose(toplay, rng, moves) {
                if board.get(c) == Piece::Empty {
                    return Move::Cell(c);
                }
                pool.retire(c);
            } else {
                break;
            }
        }
    }
    loop {
        let c = moves[*shuffle_cursor % moves.len()];
        *shuffle_cursor += 1;
        if board.get(c) == Piece::Empty {
            return Move::Cell(c);
        }
    }
}

/// Port of `rollout`'s trailing last-good-reply update: for every
/// consecutive pair of moves in the whole simulation (tree and rollout
/// combined), record the winner's reply to the move that preceded it.
fn update_last_good_reply(movelist: &MoveList, winner: Option<u8>, mode: u8, table: &mut LastGoodReply) {
    let Some(winner) = winner else { return };
    let mut prev: Option<Move> = None;
    for played in movelist.iter() {
        if let Some(p) = prev {
            if played.player == winner && played.mv != Move::Swap {
                table.record_win(played.player, p, played.mv);
            } else if mode == 2 {
                table.clear_losing(played.player, p);
            }
        }
        prev = Some(played.mv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use havannah_core::Board;
    use rand::SeedableRng;

    fn cell(x: i16, y: i16) -> Move {
        Move::Cell(Coord::new(x, y))
    }

    #[test]
    fn fenwick_samples_proportionally_to_weight() {
        let mut tree = Fenwick::new(3);
        tree.set_weight(0, 1.0);
        tree.set_weight(1, 0.0);
        tree.set_weight(2, 3.0);
        assert_eq!(tree.total(), 4.0);
        assert_eq!(tree.find(0.0), 0);
        assert_eq!(tree.find(0.99), 0);
        assert_eq!(tree.find(1.0), 2);
        assert_eq!(tree.find(3.99), 2);
    }

    #[test]
    fn rollout_always_terminates_on_a_tiny_board() {
        let mut board = Board::empty(3).unwrap();
        let config = Config { threads: 1, ..Config::default() };
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut movelist = MoveList::new();
        let mut last_good = LastGoodReply::new();
        let outcome = rollout(&mut board, &config, &UniformGammas, &mut rng, &mut movelist, &mut last_good);
        assert!(outcome.is_terminal());
        assert_eq!(board.outcome(), outcome);
    }

    #[test]
    fn rollout_respects_moves_already_played() {
        let mut board = Board::empty(4).unwrap();
        board.play(cell(0, 0), 1).unwrap();
        board.play(cell(1, 0), 2).unwrap();
        let config = Config { threads: 1, ..Config::default() };
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut movelist = MoveList::new();
        let mut last_good = LastGoodReply::new();
        let outcome = rollout(&mut board, &config, &UniformGammas, &mut rng, &mut movelist, &mut last_good);
        assert!(outcome.is_terminal());
    }

    #[test]
    fn weighted_rollout_also_terminates() {
        let mut board = Board::empty(3).unwrap();
        let config = Config { threads: 1, weighted_random: true, ..Config::default() };
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut movelist = MoveList::new();
        let mut last_good = LastGoodReply::new();
        let outcome = rollout(&mut board, &config, &UniformGammas, &mut rng, &mut movelist, &mut last_good);
        assert!(outcome.is_terminal());
    }

    #[test]
    fn bridge_probe_defence_finds_the_forced_save() {
        // size 4, centre (3,3) just taken by the opponent (P1). Five of its
        // six neighbours are already ours (P2), leaving exactly one empty:
        // that's the forced reply completing the ring around the gap.
        let mut board = Board::empty(4).unwrap();
        let centre = Coord::new(3, 3);
        board.play(Move::Cell(centre), 1).unwrap();
        let neighbours: Vec<Coord> = (0..6).map(|d| centre.neighbour(d)).collect();
        for (i, &n) in neighbours.iter().enumerate() {
            if i == 5 {
                continue; // leave this one empty as the forced save
            }
            board.play(Move::Cell(n), 2).unwrap();
        }
        let save = bridge_probe_defence(&board, Move::Cell(centre), 0);
        assert_eq!(save, Some(neighbours[5]));
    }

    #[test]
    fn update_last_good_reply_records_the_winners_replies() {
        let mut movelist = MoveList::new();
        movelist.push_in_tree(cell(0, 0), 1);
        movelist.push_rollout(cell(1, 0), 2);
        movelist.push_rollout(cell(2, 0), 1);
        let mut table = LastGoodReply::new();
        update_last_good_reply(&movelist, Some(1), 1, &mut table);
        // player 1's reply to (1,0) was (2,0), and player 1 won: recorded.
        assert_eq!(table.get(1, cell(1, 0)), Some(cell(2, 0)));
        // player 2 never won, so its reply to (0,0) is never recorded.
        assert_eq!(table.get(2, cell(0, 0)), None);
    }
}
