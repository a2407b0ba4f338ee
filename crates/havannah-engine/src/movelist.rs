//! Per-iteration move history and the cross-iteration last-good-reply table.
//!
//! `MoveList` is owned by a single worker and cleared at the start of every
//! iteration (prepare step). It records both in-tree and rollout moves so
//! the backup step can credit RAVE statistics to every child whose move
//! shows up later in the same simulation, and so the rollout engine can
//! look up (and later update) the last-good-reply table.

use std::collections::HashMap;

use havannah_core::Move;

/// One played move, tagged with the side that played it and whether it was
/// chosen by tree selection or by the rollout policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Played {
    pub mv: Move,
    pub player: u8,
    pub in_tree: bool,
}

/// The moves played by one MCTS iteration, tree and rollout combined, in
/// play order.
#[derive(Debug, Default)]
pub struct MoveList {
    moves: Vec<Played>,
}

impl MoveList {
    pub fn new() -> Self {
        MoveList::default()
    }

    pub fn clear(&mut self) {
        self.moves.clear();
    }

    pub fn push_in_tree(&mut self, mv: Move, player: u8) {
        self.moves.push(Played { mv, player, in_tree: true });
    }

    pub fn push_rollout(&mut self, mv: Move, player: u8) {
        self.moves.push(Played { mv, player, in_tree: false });
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Played> {
        self.moves.iter()
    }

    pub fn last_rollout_move(&self) -> Option<Move> {
        self.moves.iter().rev().find(|p| !p.in_tree).map(|p| p.mv)
    }

    /// Moves eligible to credit a child's RAVE statistics for `player`:
    /// every move played by `player`, plus the opponent's moves too when
    /// `opmoves` is set (the "either side" AMAF variant).
    pub fn rave_candidates(&self, player: u8, opmoves: bool) -> impl Iterator<Item = Move> + '_ {
        self.moves
            .iter()
            .filter(move |p| p.player == player || opmoves)
            .map(|p| p.mv)
    }
}

/// Cross-iteration table mapping "the opponent just played move X" to "the
/// reply that won last time", one instance per worker. `record_mode`
/// mirrors the `last_good_reply` config knob: `0` disabled (the table is
/// simply never consulted by the caller), `1` records winning replies
/// only, `2` also clears an entry once its reply stops winning.
#[derive(Debug, Default)]
pub struct LastGoodReply {
    replies: HashMap<(u8, Move), Move>,
}

impl LastGoodReply {
    pub fn new() -> Self {
        LastGoodReply::default()
    }

    pub fn get(&self, player: u8, opponent_move: Move) -> Option<Move> {
        self.replies.get(&(player, opponent_move)).copied()
    }

    pub fn record_win(&mut self, player: u8, opponent_move: Move, reply: Move) {
        self.replies.insert((player, opponent_move), reply);
    }

    /// `last_good_reply == 2`: a previously recorded reply just lost, so
    /// drop it rather than keep recommending a beaten line.
    pub fn clear_losing(&mut self, player: u8, opponent_move: Move) {
        self.replies.remove(&(player, opponent_move));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use havannah_core::Coord;

    fn cell(x: i16, y: i16) -> Move {
        Move::Cell(Coord::new(x, y))
    }

    #[test]
    fn clear_resets_an_iterations_history() {
        let mut list = MoveList::new();
        list.push_in_tree(cell(0, 0), 1);
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn rave_candidates_filters_by_player_unless_opmoves() {
        let mut list = MoveList::new();
        list.push_in_tree(cell(0, 0), 1);
        list.push_rollout(cell(1, 0), 2);
        list.push_rollout(cell(2, 0), 1);

        let p1_only: Vec<_> = list.rave_candidates(1, false).collect();
        assert_eq!(p1_only, vec![cell(0, 0), cell(2, 0)]);

        let either: Vec<_> = list.rave_candidates(1, true).collect();
        assert_eq!(either.len(), 3);
    }

    #[test]
    fn last_rollout_move_skips_in_tree_entries() {
        let mut list = MoveList::new();
        list.push_in_tree(cell(0, 0), 1);
        list.push_rollout(cell(1, 0), 2);
        assert_eq!(list.last_rollout_move(), Some(cell(1, 0)));
    }

    #[test]
    fn last_good_reply_round_trips_and_clears() {
        let mut table = LastGoodReply::new();
        let opp = cell(0, 0);
        let reply = cell(1, 0);
        assert_eq!(table.get(1, opp), None);
        table.record_win(1, opp, reply);
        assert_eq!(table.get(1, opp), Some(reply));
        table.clear_losing(1, opp);
        assert_eq!(table.get(1, opp), None);
    }
}
