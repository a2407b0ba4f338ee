//! End-to-end scenarios exercising the coordinator/worker pair together
//! (not just their individual units), grounded directly on the MCTS
//! sanity check, the solver-free regression property, and the forced-loss
//! proof propagation scenario.

use std::time::Duration;

use havannah_core::{Board, Coord, Move};
use havannah_engine::backup::{self, ChildProof, Outcome as ProofOutcome};
use havannah_engine::{Config, Coordinator, NullSolver, UniformGammas};

fn cell(x: i16, y: i16) -> Move {
    Move::Cell(Coord::new(x, y))
}

#[test]
fn mcts_sanity_root_visits_match_max_runs_within_thread_count() {
    let config = Config { threads: 1, visit_expand: 1, explore: 0.7, max_mem: 32 * 1024 * 1024, ..Config::default() };
    let coordinator = Coordinator::new(config);
    let board = Board::empty(4).unwrap();

    let report = coordinator.genmove(
        &board,
        Duration::from_secs(20),
        2000,
        11,
        &NullSolver,
        &UniformGammas,
    );

    assert_ne!(report.best_move, Move::None);
    assert!(board.valid(report.best_move));

    let root_visits = coordinator.tree().with_node(coordinator.tree().root(), |n| n.exp.visits());
    assert!(
        root_visits.abs_diff(2000) <= 1,
        "root visits {root_visits} should land within one thread of 2000"
    );
}

#[test]
fn solver_free_search_is_deterministic_given_the_same_seed() {
    let config = Config {
        threads: 1,
        minimax: 0,
        instantwin: 0,
        rollout_pattern: false,
        last_good_reply: 0,
        weighted_random: false,
        max_mem: 16 * 1024 * 1024,
        ..Config::default()
    };
    let board = Board::empty(3).unwrap();

    let run = |seed: u64| {
        let coordinator = Coordinator::new(config);
        let report = coordinator.genmove(&board, Duration::from_secs(10), 300, seed, &NullSolver, &UniformGammas);
        let root = coordinator.tree().root();
        let children = coordinator.tree().with_node(root, |n| n.children());
        let visits: Vec<u32> = children
            .iter()
            .map(|c| coordinator.tree().with_node(c, |n| n.exp.visits()))
            .collect();
        (report.best_move, report.pv, visits)
    };

    let first = run(99);
    let second = run(99);
    assert_eq!(first, second);
}

#[test]
fn a_node_whose_children_are_all_proven_losses_backs_up_as_a_win_with_proofdepth_two() {
    // Every P1 reply from this node loses to a forced P2 follow-up one ply
    // deeper (`proofdepth: 1` on each child), so the node itself is a
    // certain win for the player to move *there* (P2), at proofdepth 2.
    let children = [
        ChildProof { outcome: ProofOutcome::Loss, proofdepth: 1, visits: 4, id: 0 },
        ChildProof { outcome: ProofOutcome::Loss, proofdepth: 1, visits: 7, id: 1 },
        ChildProof { outcome: ProofOutcome::Loss, proofdepth: 1, visits: 2, id: 2 },
    ];
    let parent = backup::AtomicOutcome::new(ProofOutcome::Unknown);
    let proof = backup::do_backup(&parent, &children).expect("all children proven should back up");

    assert_eq!(proof.outcome, ProofOutcome::Loss);
    assert_eq!(proof.proofdepth, 2);
    // ties among equally-proven losses go to the longest-surviving line
    assert_eq!(proof.bestmove_id, 1);
    assert_eq!(parent.load(), ProofOutcome::Loss);
}

#[test]
fn genmove_short_circuits_when_a_solver_already_proved_a_win() {
    struct AlwaysWins;
    impl havannah_engine::Solver for AlwaysWins {
        fn run_pnsab(
            &self,
            _board: &Board,
            _defender: u8,
            _mem_budget: usize,
        ) -> (havannah_engine::SolvedOutcome, Option<Move>) {
            (havannah_engine::SolvedOutcome::Win, Some(cell(0, 0)))
        }
        fn negamax(&self, _board: &Board, _depth: u32, _alpha: f64, _beta: f64) -> f64 {
            0.0
        }
    }

    let coordinator = Coordinator::new(Config::default());
    let board = Board::empty(3).unwrap();
    let report = coordinator.genmove(&board, Duration::from_secs(1), 5000, 1, &AlwaysWins, &UniformGammas);

    assert_eq!(report.best_move, cell(0, 0));
    assert_eq!(report.pv, vec![cell(0, 0)]);
    assert!(report.children.is_empty());
}
