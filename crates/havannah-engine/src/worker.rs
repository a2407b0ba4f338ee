//! One MCTS iteration: select a path down the tree, expand its leaf, run a
//! rollout, and back the result up.
//!
//! Grounded on `original_source/playeruct.cpp`'s `iterate`/`walk_tree`
//! (selection and expansion dispatch), `choose_move` (UCT+RAVE child
//! selection) and `create_children` (expansion, including the immediate
//! tactical proof `minimax` can find without a rollout).

use rand::Rng;

use havannah_core::{Board, Move, Outcome as BoardOutcome};

use crate::backup::{self, ChildProof, Outcome as ProofOutcome};
use crate::config::Config;
use crate::knowledge;
use crate::movelist::{LastGoodReply, MoveList};
use crate::rollout::{self, Gammas};
use crate::solver::Solver;
use crate::tree::{ChildRange, CompactTree, NodeId};

/// `1.0` if `player` won the finished board, `0.0` if they lost, `0.5` for
/// a draw. `outcome` must be terminal.
fn score_for(outcome: BoardOutcome, player: u8) -> f64 {
    match outcome.winner() {
        Some(p) if p == player => 1.0,
        Some(_) => 0.0,
        None => 0.5,
    }
}

/// UCT+RAVE value of one child, from the perspective of the player about to
/// choose it. Unvisited children get `fpurgency` in place of a sampled mean
/// (their knowledge prior still applies), and the exploration term is the
/// standard UCT bonus scaled by the *parent's* visit count, so it shrinks as
/// this particular child accumulates its own visits.
fn child_value(
    tree: &CompactTree,
    child: NodeId,
    parent_visits: u32,
    raveval: f64,
    explore: f64,
    know_weight: f64,
    fpurgency: f64,
) -> f64 {
    tree.with_node(child, |node| {
        let visits = node.exp.visits();
        let know = f32::from_bits(node.know.load(std::sync::atomic::Ordering::Relaxed)) as f64;

        let mut val = if visits == 0 { fpurgency } else { node.exp.mean() };
        if raveval > 0.0 && node.rave.visits() > 0 {
            let alpha = raveval / (raveval + visits as f64);
            val = alpha * node.rave.mean() + (1.0 - alpha) * val;
        }
        if know_weight != 0.0 {
            val += know_weight * know / (visits as f64 + 1.0).sqrt();
        }
        if explore > 0.0 {
            val += explore * ((parent_visits.max(1) as f64).ln() / (visits as f64 + 1.0)).sqrt();
        }
        val
    })
}

/// Port of `choose_move`: scan `range`'s children, short-circuiting on an
/// already-proven win for `toplay` and otherwise taking the highest-value
/// unsolved child (proven draws rank just below any unknown child; proven
/// losses rank below that).
fn select_child(
    tree: &CompactTree,
    range: &ChildRange,
    _toplay: u8,
    parent_visits: u32,
    config: &Config,
    use_rave: bool,
    use_explore: bool,
) -> Option<(NodeId, usize)> {
    let raveval = if use_rave { config.rave_factor } else { 0.0 };
    let explore = if use_explore { config.explore } else { 0.0 };

    let mut best: Option<(NodeId, usize, f64)> = None;
    for (idx, child) in range.iter().enumerate() {
        let outcome = tree.with_node(child, |n| n.outcome.load());
        let val = if outcome.is_terminal() {
            // a child's outcome is relative to the mover at the child; one
            // flip reframes it relative to `toplay`, who is choosing it.
            let relative = outcome.flip();
            if relative == ProofOutcome::Win {
                return Some((child, idx));
            }
            match relative {
                ProofOutcome::Draw => -1.0,
                _ => -2.0,
            }
        } else {
            child_value(tree, child, parent_visits, raveval, explore, config.knowledge, config.fpurgency)
        };

        if best.is_none_or(|(_, _, best_val)| val > best_val) {
            best = Some((child, idx, val));
        }
    }
    best.map(|(id, idx, _)| (id, idx))
}

/// Try to expand `node`: allocate one child per legal move, tag
/// knowledge priors, and look for an immediate tactical proof via `solver`
/// when `config.minimax != 0`. Returns `false` if another worker is already
/// expanding this node or the arena is full (caller should back off).
fn expand(tree: &CompactTree, config: &Config, solver: &dyn Solver, board: &Board, node: NodeId) -> bool {
    let got_lock = tree.with_node(node, |n| n.try_lock_expand());
    if !got_lock {
        return false;
    }

    let toplay = board.toplay();
    let moves: Vec<Move> = board.move_iter(config.prune_symmetry).collect();

    if moves.is_empty() {
        tree.with_node(node, |n| n.unlock());
        return false;
    }

    let Some(range) = tree.alloc_children(node, &moves) else {
        tree.with_node(node, |n| n.unlock());
        return false;
    };

    let prev_move = tree.with_node(node, |n| n.mv());
    let mut forced_loss: Option<NodeId> = None;
    let mut forced_losses = 0u32;
    let mut proven_win: Option<usize> = None;

    for (idx, (child_id, &mv)) in range.iter().zip(moves.iter()).enumerate() {
        if config.minimax != 0 {
            if board.test_win(mv, toplay) {
                // the move ends the game outright, so there is no side left
                // to move at the child. Store it pre-flipped (a loss at the
                // child) so reading it back through `Outcome::flip` hands
                // `toplay` the win they actually just played.
                tree.with_node(child_id, |c| {
                    let _ = c.outcome.compare_exchange(ProofOutcome::Unknown, ProofOutcome::Loss);
                });
                proven_win.get_or_insert(idx);
            } else if config.minimax >= 2 {
                let opponent = if toplay == 1 { 2 } else { 1 };
                if board.test_win(mv, opponent) {
                    forced_losses += 1;
                    forced_loss = Some(child_id);
                }
            }
        }
        if config.knowledge != 0.0 {
            let know = knowledge::knowledge(board, config, prev_move, mv, toplay);
            tree.with_node(child_id, |c| {
                c.know.store((know as f32).to_bits(), std::sync::atomic::Ordering::Relaxed);
            });
        }
    }

    // Safe to write `node`'s own outcome directly here (not through
    // `do_backup`): the expansion lock still excludes any concurrent backup
    // through these brand-new children.
    if let Some(idx) = proven_win {
        tree.with_node(node, |n| {
            let _ = n.outcome.compare_exchange(ProofOutcome::Unknown, ProofOutcome::Win);
            n.bestmove.store(idx as u32, std::sync::atomic::Ordering::Relaxed);
        });
    } else if forced_losses == 1 {
        // exactly one reply lets the opponent win: that reply is forced, so
        // there is no point expanding any sibling. Collapse the children
        // block down to that single move and seed it past `visit_expand`,
        // the "macro move" shortcut.
        if let Some(loss_child) = forced_loss {
            let mv = tree.with_node(loss_child, |n| n.mv());
            tree.prune(node);
            if let Some(single) = tree.alloc_children(node, &[mv]) {
                if let Some(macro_child) = single.get(0) {
                    tree.with_node(macro_child, |n| n.exp.add_wins(config.visit_expand));
                }
            }
        }
    } else if forced_losses >= 2 {
        // two or more moves the opponent would win from means this position
        // is already lost for `toplay`, whichever one they pick.
        if let Some(loss_child) = forced_loss {
            let loss_idx = range.iter().position(|c| c == loss_child).unwrap_or(0);
            tree.with_node(node, |n| {
                let _ = n.outcome.compare_exchange(ProofOutcome::Unknown, ProofOutcome::Loss);
                n.bestmove.store(loss_idx as u32, std::sync::atomic::Ordering::Relaxed);
            });
        }
    }

    tree.with_node(node, |n| n.unlock());
    true
}

/// One full MCTS iteration starting from `root_board`: select down to a
/// leaf, expand it if warranted, simulate a rollout, then back results up
/// through every visited node.
#[allow(clippy::too_many_arguments)]
pub fn run_iteration(
    tree: &CompactTree,
    config: &Config,
    gammas: &dyn Gammas,
    solver: &dyn Solver,
    root_board: &Board,
    rng: &mut impl Rng,
    movelist: &mut MoveList,
    last_good: &mut LastGoodReply,
) {
    movelist.clear();
    let mut board = root_board.clone();
    let root = tree.root();
    tree.with_node(root, |n| n.exp.add_virtual_loss());

    let use_rave = config.rave_factor > 0.0 && rng.gen::<f64>() < config.p_rave;
    let use_explore = config.explore > 0.0 && rng.gen::<f64>() < config.p_explore;

    // `path` pairs each visited node with the mover who chose to descend
    // into it, in root-to-leaf order. Root has no move leading into it, so
    // it's tagged with the player to move there instead, purely so its own
    // visit count advances past `visit_expand` like any other node's.
    let mut path: Vec<(NodeId, u8)> = vec![(root, root_board.toplay())];
    let mut node = root;

    loop {
        let outcome = tree.with_node(node, |n| n.outcome.load());
        if outcome.is_terminal() || board.outcome() != BoardOutcome::Unknown {
            break;
        }

        let children = tree.with_node(node, |n| n.children());
        if children.is_empty() {
            let visits = tree.with_node(node, |n| n.exp.visits());
            if visits >= config.visit_expand + 1 && expand(tree, config, solver, &board, node) {
                continue;
            }
            break;
        }

        let toplay = board.toplay();
        let parent_visits = tree.with_node(node, |n| n.exp.visits());
        let Some((child_id, _)) = select_child(tree, &children, toplay, parent_visits, config, use_rave, use_explore) else {
            break;
        };
        let mv = tree.with_node(child_id, |n| n.mv());
        movelist.push_in_tree(mv, toplay);
        board
            .play(mv, toplay)
            .expect("a selected child's move must still be legal");
        tree.with_node(child_id, |n| n.exp.add_virtual_loss());
        path.push((child_id, toplay));
        node = child_id;
    }

    let leaf_outcome = tree.with_node(node, |n| n.outcome.load());
    let sim_outcome = if leaf_outcome.is_terminal() {
        match leaf_outcome {
            ProofOutcome::Win => BoardOutcome::from_player(board.toplay()),
            ProofOutcome::Loss => {
                let opponent = if board.toplay() == 1 { 2 } else { 1 };
                BoardOutcome::from_player(opponent)
            }
            _ => BoardOutcome::Draw,
        }
    } else if board.outcome() != BoardOutcome::Unknown {
        board.outcome()
    } else {
        rollout::rollout(&mut board, config, gammas, rng, movelist, last_good)
    };

    for &(id, mover) in path.iter() {
        tree.with_node(id, |n| {
            n.exp.remove_virtual_loss();
            n.exp.add(score_for(sim_outcome, mover));
        });
    }

    update_rave(tree, &path, movelist, sim_outcome, config);
    backup_path(tree, &path);
}

/// Credit every child whose move shows up anywhere later in the same
/// simulation (tree or rollout) with an AMAF sample, per `update_rave`.
fn update_rave(tree: &CompactTree, path: &[(NodeId, u8)], movelist: &MoveList, sim_outcome: BoardOutcome, config: &Config) {
    if config.rave_factor <= 0.0 {
        return;
    }
    for window in path.windows(2) {
        let (parent, _) = window[0];
        let (_, mover) = window[1];
        let children = tree.with_node(parent, |n| n.children());
        if children.len() <= 1 {
            continue; // a macro move: RAVE credit would be meaningless
        }
        let candidates: Vec<Move> = movelist.rave_candidates(mover, false).collect();
        for child in children.iter() {
            let mv = tree.with_node(child, |n| n.mv());
            if candidates.contains(&mv) {
                tree.with_node(child, |n| n.rave.add(score_for(sim_outcome, mover)));
            }
        }
    }
}

/// Walk `path` leaf-to-root, attempting `do_backup` at every node whose
/// child just returned a new proof state.
fn backup_path(tree: &CompactTree, path: &[(NodeId, u8)]) {
    for window in path.windows(2).rev() {
        let (parent, toplay) = window[0];
        let children = tree.with_node(parent, |n| n.children());
        if children.is_empty() {
            continue;
        }
        let proofs: Vec<ChildProof> = children
            .iter()
            .enumerate()
            .map(|(idx, child)| {
                tree.with_node(child, |n| ChildProof {
                    outcome: n.outcome.load().flip(),
                    proofdepth: n.proofdepth.load(std::sync::atomic::Ordering::Relaxed),
                    visits: n.exp.visits(),
                    id: idx,
                })
            })
            .collect();

        tree.with_node(parent, |n| {
            if let Some(proof) = backup::do_backup(&n.outcome, &proofs) {
                n.proofdepth.store(proof.proofdepth, std::sync::atomic::Ordering::Relaxed);
                n.bestmove.store(proof.bestmove_id as u32, std::sync::atomic::Ordering::Relaxed);
            }
        });
        let _ = toplay;
    }
}
