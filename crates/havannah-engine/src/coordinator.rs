//! Thread pool, run/GC scheduling, final move selection and garbage
//! collection — the part of the engine an external controller actually
//! calls.
//!
//! Grounded on `original_source/player.cpp`'s `PlayerThread::run`,
//! `Player::genmove`, `Player::return_move` and `Player::garbage_collect`.
//! The six-state barrier machine described there (`Wait_Start`/`Running`/
//! `Wait_End`/`GC`/`GC_End`/`Cancelled`) assumes per-node individual frees
//! and an unsynchronized last-good-reply table, both fine in the original's
//! raw-pointer C++ but unsound as literal safe Rust. This port keeps the
//! same worker responsibilities and the same stop conditions, but realizes
//! them with `std::thread::scope` (as `search/pool.rs` does), a plain
//! `AtomicBool` timeout flag instead of a wakeable timer thread, a mutex
//! guarding garbage collection instead of a two-phase barrier (a worker
//! that already exited its loop before a GC condition appeared would
//! deadlock the barrier's other parties forever), and a `Mutex`-guarded
//! last-good-reply table instead of the original's tolerated data race.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use tracing::{debug, info};

use havannah_core::{Board, Move};

use crate::backup::Outcome as ProofOutcome;
use crate::config::Config;
use crate::movelist::{LastGoodReply, MoveList};
use crate::rollout::Gammas;
use crate::solver::{Solver, SolvedOutcome};
use crate::tree::{ChildRange, CompactTree, NodeId};
use crate::worker::run_iteration;

/// Any proven node whose subtree carried at least this many visits gets a
/// log line before garbage collection reclaims it.
const GC_LOG_VISIT_THRESHOLD: u32 = 1000;

/// One child's statistics as reported to the caller after `genmove`.
#[derive(Debug, Clone, Copy)]
pub struct ChildStat {
    pub mv: Move,
    pub exp_mean: f64,
    pub exp_visits: u32,
    pub rave_mean: f64,
    pub rave_visits: u32,
    pub outcome: ProofOutcome,
}

/// Result of a `genmove` call: the chosen move, the principal variation
/// obtained by repeatedly applying final move selection, and every root
/// child's statistics.
#[derive(Debug, Clone)]
pub struct GenmoveReport {
    pub best_move: Move,
    pub pv: Vec<Move>,
    pub children: Vec<ChildStat>,
    /// Set when a worker hit `max_mem` and garbage collection couldn't
    /// free enough room to continue: the move returned is the best one
    /// the tree supports, not the result of the full requested search.
    pub out_of_memory: bool,
}

/// Owns the search tree and the adaptive GC threshold across repeated
/// `genmove` calls. `Config` itself stays a caller-supplied snapshot;
/// `gc_limit` is the one piece of coordinator state that drifts over time
/// per spec.md's GC adaptation rule.
pub struct Coordinator {
    tree: CompactTree,
    config: Config,
    gc_limit: AtomicU32,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        Coordinator {
            tree: CompactTree::new(config.max_mem),
            gc_limit: AtomicU32::new(config.gc_limit),
            config,
        }
    }

    pub fn tree(&self) -> &CompactTree {
        &self.tree
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Search from `root_board` for up to `deadline`, capped at `max_runs`
    /// total iterations spread evenly over `config.threads` workers, and
    /// return the best move per the final move selection rule.
    ///
    /// `seed` drives each worker's RNG so a `threads == 1` call is fully
    /// reproducible, matching spec.md §8's solver-free regression property.
    /// The tree is pruned back to an empty root at the start of every call:
    /// this port does not carry a search tree over between moves (no
    /// opponent-reply re-rooting), a simplification recorded in DESIGN.md.
    #[allow(clippy::too_many_arguments)]
    pub fn genmove(
        &self,
        root_board: &Board,
        deadline: Duration,
        max_runs: u64,
        seed: u64,
        solver: &(dyn Solver + Sync),
        gammas: &(dyn Gammas + Sync),
    ) -> GenmoveReport {
        self.tree.prune(self.tree.root());

        let defender = root_board.toplay();
        let (solved, solver_move) = solver.run_pnsab(root_board, defender, self.config.max_mem);
        if solved == SolvedOutcome::Win {
            if let Some(mv) = solver_move {
                return GenmoveReport { best_move: mv, pv: vec![mv], children: Vec::new(), out_of_memory: false };
            }
        }

        let threads = self.config.threads.max(1);
        let per_worker_cap = (max_runs / threads as u64).max(1);
        let timeout = AtomicBool::new(false);
        let out_of_memory = AtomicBool::new(false);
        let gc_lock: Mutex<()> = Mutex::new(());
        let last_good: Mutex<LastGoodReply> = Mutex::new(LastGoodReply::new());
        let start = Instant::now();

        std::thread::scope(|scope| {
            for t in 0..threads {
                let tree = &self.tree;
                let config = &self.config;
                let gc_limit = &self.gc_limit;
                let timeout = &timeout;
                let out_of_memory = &out_of_memory;
                let gc_lock = &gc_lock;
                let last_good = &last_good;
                let worker_seed = seed.wrapping_add(t as u64);
                scope.spawn(move || {
                    worker_loop(
                        tree,
                        config,
                        gammas,
                        solver,
                        root_board,
                        worker_seed,
                        per_worker_cap,
                        deadline,
                        start,
                        timeout,
                        out_of_memory,
                        gc_lock,
                        gc_limit,
                        last_good,
                    );
                });
            }
        });

        self.finish_genmove(out_of_memory.load(Ordering::Relaxed))
    }

    fn finish_genmove(&self, out_of_memory: bool) -> GenmoveReport {
        let root = self.tree.root();
        let children = self.tree.with_node(root, |n| n.children());

        let root_outcome = self.tree.with_node(root, |n| n.outcome.load());
        let bestmove_idx = self.tree.with_node(root, |n| n.bestmove.load(Ordering::Relaxed));
        if root_outcome.is_terminal() && (bestmove_idx as usize) < children.len() {
            let winner = children.get(bestmove_idx as usize).unwrap();
            let mv = self.tree.with_node(winner, |n| n.mv());
            return GenmoveReport {
                best_move: mv,
                pv: build_pv(&self.tree, &self.config, root),
                children: child_stats(&self.tree, &children),
                out_of_memory,
            };
        }

        let best = select_final(&self.tree, &self.config, &children);
        let best_move = best
            .map(|(id, _)| self.tree.with_node(id, |n| n.mv()))
            .unwrap_or(Move::None);

        GenmoveReport {
            best_move,
            pv: build_pv(&self.tree, &self.config, root),
            children: child_stats(&self.tree, &children),
            out_of_memory,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    tree: &CompactTree,
    config: &Config,
    gammas: &(dyn Gammas + Sync),
    solver: &(dyn Solver + Sync),
    root_board: &Board,
    seed: u64,
    cap: u64,
    deadline: Duration,
    start: Instant,
    timeout: &AtomicBool,
    out_of_memory: &AtomicBool,
    gc_lock: &Mutex<()>,
    gc_limit: &AtomicU32,
    last_good: &Mutex<LastGoodReply>,
) -> u64 {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut movelist = MoveList::new();
    let mut runs = 0u64;

    while runs < cap {
        if start.elapsed() >= deadline {
            timeout.store(true, Ordering::Relaxed);
        }
        if timeout.load(Ordering::Relaxed) {
            break;
        }

        let root_outcome = tree.with_node(tree.root(), |n| n.outcome.load());
        if root_outcome.is_terminal() {
            break;
        }

        if tree.mem_used() >= config.max_mem {
            let _guard = gc_lock.lock().unwrap();
            // another worker may already have GC'd while we waited for the lock
            if tree.mem_used() >= config.max_mem {
                run_gc(tree, config, gc_limit);
            }
            if tree.mem_used() >= config.max_mem {
                // GC couldn't free enough: stop this worker with whatever
                // best move the tree already supports rather than spin.
                tracing::warn!(max_mem = config.max_mem, "search tree exhausted its memory budget after garbage collection");
                out_of_memory.store(true, Ordering::Relaxed);
                break;
            }
            continue;
        }

        {
            let mut table = last_good.lock().unwrap();
            run_iteration(tree, config, gammas, solver, root_board, &mut rng, &mut movelist, &mut table);
        }
        runs += 1;
    }

    runs
}

/// `Player::garbage_collect`: walk the tree, pruning proven subtrees and
/// thinly-visited unproven ones, then adapt `gc_limit` toward the 50%
/// memory-occupancy target.
fn run_gc(tree: &CompactTree, config: &Config, gc_limit: &AtomicU32) {
    let before = tree.mem_stats();
    let limit = gc_limit.load(Ordering::Relaxed);
    debug!(bytes_used = before.bytes_used, gc_limit = limit, "garbage collection starting");

    gc_walk(tree, tree.root(), limit);

    let after = tree.mem_stats();
    info!(bytes_used = after.bytes_used, live_blocks = after.live_blocks, "garbage collection finished");

    let used_frac = after.bytes_used as f64 / config.max_mem.max(1) as f64;
    let new_limit = if used_frac >= 0.5 {
        ((limit as f64) * 1.3).round() as u32
    } else {
        (((limit as f64) * 0.9).round() as u32).max(5)
    };
    gc_limit.store(new_limit, Ordering::Relaxed);
}

fn gc_walk(tree: &CompactTree, node: NodeId, gc_limit: u32) {
    let children = tree.with_node(node, |n| n.children());
    if children.is_empty() {
        return;
    }
    for child in children.iter() {
        let (outcome, visits) = tree.with_node(child, |n| (n.outcome.load(), n.exp.visits()));
        if outcome.is_terminal() {
            if visits >= GC_LOG_VISIT_THRESHOLD {
                debug!(visits, "freeing a proven subtree during GC");
            }
            tree.prune(child);
        } else if visits < gc_limit {
            tree.prune(child);
        } else {
            gc_walk(tree, child, gc_limit);
        }
    }
}

/// `final_score - lcb_penalty`, argmax'd over unproven children; proven
/// children are handled separately so a certain win always wins outright
/// and a certain loss/draw is only ever the fallback of last resort,
/// mirroring `worker::select_child`'s treatment of terminal children.
fn select_final(tree: &CompactTree, config: &Config, range: &ChildRange) -> Option<(NodeId, usize)> {
    if range.is_empty() {
        return None;
    }
    let total_visits: u32 = range.iter().map(|c| tree.with_node(c, |n| n.exp.visits())).sum();

    let mut proven_win: Option<(NodeId, usize, u32)> = None;
    let mut proven_other: Option<(NodeId, usize, ProofOutcome, u32)> = None;
    let mut best_unproven: Option<(NodeId, usize, f64)> = None;

    for (idx, child) in range.iter().enumerate() {
        let (outcome, visits) = tree.with_node(child, |n| (n.outcome.load(), n.exp.visits()));
        let relative = outcome.flip();

        if relative == ProofOutcome::Win {
            if proven_win.is_none_or(|(_, _, v)| visits < v) {
                proven_win = Some((child, idx, visits));
            }
            continue;
        }
        if outcome.is_terminal() {
            let keep = match proven_other {
                None => true,
                Some((_, _, cur, cur_visits)) => relative > cur || (relative == cur && visits > cur_visits),
            };
            if keep {
                proven_other = Some((child, idx, relative, visits));
            }
            continue;
        }

        let score = final_score(tree, child, config) - lcb_penalty(total_visits, visits, config.ms_explore);
        if best_unproven.is_none_or(|(_, _, v)| score > v) {
            best_unproven = Some((child, idx, score));
        }
    }

    if let Some((id, idx, _)) = proven_win {
        return Some((id, idx));
    }
    if let Some((id, idx, _)) = best_unproven {
        return Some((id, idx));
    }
    proven_other.map(|(id, idx, _, _)| (id, idx))
}

/// A child's robustness score. `ms_rave == -1` collapses to raw visit
/// count (the classic "most visited" robust-child rule), `-2` to raw win
/// count; any other value blends RAVE into the mean exactly like
/// `worker::child_value` does mid-search, just with its own RAVE constant.
fn final_score(tree: &CompactTree, child: NodeId, config: &Config) -> f64 {
    tree.with_node(child, |n| {
        let visits = n.exp.visits();
        if config.ms_rave == -1.0 {
            return visits as f64;
        }
        if config.ms_rave == -2.0 {
            return n.exp.score();
        }
        let mean = n.exp.mean();
        if config.ms_rave > 0.0 && n.rave.visits() > 0 {
            let alpha = config.ms_rave / (config.ms_rave + visits as f64);
            alpha * n.rave.mean() + (1.0 - alpha) * mean
        } else {
            mean
        }
    })
}

fn lcb_penalty(total_visits: u32, child_visits: u32, ms_explore: f64) -> f64 {
    if ms_explore <= 0.0 {
        return 0.0;
    }
    ms_explore * ((total_visits as f64 + 1.0).ln() / (child_visits as f64 + 1.0)).sqrt()
}

fn child_stats(tree: &CompactTree, range: &ChildRange) -> Vec<ChildStat> {
    range
        .iter()
        .map(|child| {
            tree.with_node(child, |n| ChildStat {
                mv: n.mv(),
                exp_mean: n.exp.mean(),
                exp_visits: n.exp.visits(),
                rave_mean: n.rave.mean(),
                rave_visits: n.rave.visits(),
                outcome: n.outcome.load(),
            })
        })
        .collect()
}

/// Repeatedly apply final move selection from `node`, collecting moves
/// until a leaf (no children) is reached.
fn build_pv(tree: &CompactTree, config: &Config, mut node: NodeId) -> Vec<Move> {
    let mut pv = Vec::new();
    loop {
        let children = tree.with_node(node, |n| n.children());
        let Some((next, _)) = select_final(tree, config, &children) else {
            break;
        };
        pv.push(tree.with_node(next, |n| n.mv()));
        node = next;
    }
    pv
}
