//! The external alpha-beta/proof-number solver boundary.
//!
//! Only the interface the search consults is in scope here; the solver's
//! internals (pn-search, transposition, iterative deepening) are someone
//! else's crate. [`NullSolver`] lets the coordinator and worker run
//! solver-free, which is the configuration spec.md's "solver-free
//! regression" property is stated against.

use havannah_core::{Board, Move};

/// A proof result for the defending side at a position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SolvedOutcome {
    Win,
    Loss,
    Unknown,
}

/// Pre-search and shallow tactical lookups the coordinator/worker may
/// consult. Any failure (timeout, memory exhaustion, no solver wired up)
/// is represented as `SolvedOutcome::Unknown` / a score of `0`, never an
/// error — per spec.md §7, an unavailable solver degrades to plain MCTS.
pub trait Solver: Send + Sync {
    /// Prove or disprove a win for `defender` from `board`, within
    /// `mem_budget` bytes. Returns the best move alongside the result when
    /// one is known, so the coordinator can short-circuit `genmove`.
    fn run_pnsab(&self, board: &Board, defender: u8, mem_budget: usize) -> (SolvedOutcome, Option<Move>);

    /// Shallow negamax search to `depth` plies, score from the side to
    /// move's perspective in `[-2, 2]` (loss, draw, win and the two
    /// partial values in between). Used by expansion's tactical check when
    /// `minimax >= 2`.
    fn negamax(&self, board: &Board, depth: u32, alpha: f64, beta: f64) -> f64;
}

/// A solver that knows nothing. Always reports `Unknown`/`0.0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSolver;

impl Solver for NullSolver {
    fn run_pnsab(&self, _board: &Board, _defender: u8, _mem_budget: usize) -> (SolvedOutcome, Option<Move>) {
        (SolvedOutcome::Unknown, None)
    }

    fn negamax(&self, _board: &Board, _depth: u32, _alpha: f64, _beta: f64) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_solver_reports_unknown() {
        let solver = NullSolver;
        let board = Board::empty(4).unwrap();
        assert_eq!(solver.run_pnsab(&board, 1, 1024), (SolvedOutcome::Unknown, None));
        assert_eq!(solver.negamax(&board, 3, -2.0, 2.0), 0.0);
    }
}
