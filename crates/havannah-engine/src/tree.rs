//! `CompactTree`: a bounded-memory node arena backing the search tree.
//!
//! Mirrors `tt.rs`'s lockless-table technique — fixed-width fields packed
//! into atomics so readers never block — but indexes nodes by [`NodeId`]
//! rather than raw pointer, since nodes here are born inside a growable
//! arena instead of a fixed power-of-two table. A child block's start/length
//! live together in one `AtomicU64`, so publishing a freshly expanded node
//! is the single atomic write the design calls for: a reader sees either
//! `0` (not yet expanded) or the fully populated range, never a tear.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use havannah_core::Move;
use tracing::debug;

use crate::backup::{AtomicOutcome, Outcome};

/// A stable index into the arena. Never invalidated by `alloc`; `dealloc`
/// only returns the slot to the free list for future reuse.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct NodeId(pub u32);

/// A contiguous run of sibling nodes. `len == 0` is the sentinel for "not
/// yet expanded" — the value every node's children range starts at.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ChildRange {
    start: u32,
    len: u32,
}

impl ChildRange {
    const EMPTY: ChildRange = ChildRange { start: 0, len: 0 };

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        (self.start..self.start + self.len).map(NodeId)
    }

    pub fn get(&self, i: usize) -> Option<NodeId> {
        (i < self.len()).then(|| NodeId(self.start + i as u32))
    }

    fn pack(self) -> u64 {
        (self.start as u64) << 32 | self.len as u64
    }

    fn unpack(bits: u64) -> ChildRange {
        ChildRange { start: (bits >> 32) as u32, len: (bits & 0xFFFF_FFFF) as u32 }
    }
}

/// Exploration/RAVE accumulator: a running score sum in `[0, visits]` and a
/// visit count, plus a virtual-loss counter workers add/subtract around a
/// descent so sibling threads see the branch as temporarily worse.
#[derive(Debug, Default)]
pub struct Stat {
    score_bits: AtomicU64,
    visits: AtomicU32,
    virtual_loss: AtomicU32,
}

impl Stat {
    pub fn add(&self, score: f64) {
        self.visits.fetch_add(1, Ordering::Relaxed);
        let mut current = self.score_bits.load(Ordering::Relaxed);
        loop {
            let next = f64::to_bits(f64::from_bits(current) + score);
            match self.score_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Seed this accumulator with `n` wins at once, visits and score both
    /// advancing by `n` — used to plant a forced-reply macro move straight
    /// past `visit_expand` without `n` separate samples.
    pub fn add_wins(&self, n: u32) {
        if n == 0 {
            return;
        }
        self.visits.fetch_add(n, Ordering::Relaxed);
        let add = n as f64;
        let mut current = self.score_bits.load(Ordering::Relaxed);
        loop {
            let next = f64::to_bits(f64::from_bits(current) + add);
            match self.score_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn add_virtual_loss(&self) {
        self.virtual_loss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remove_virtual_loss(&self) {
        self.virtual_loss.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::Relaxed)
    }

    pub fn score(&self) -> f64 {
        f64::from_bits(self.score_bits.load(Ordering::Relaxed))
    }

    /// Mean score with virtual losses counted as visited-but-scoreless,
    /// the standard way concurrent MCTS discourages a branch other workers
    /// are already descending through.
    pub fn mean(&self) -> f64 {
        let visits = self.visits() as f64 + self.virtual_loss.load(Ordering::Relaxed) as f64;
        if visits == 0.0 {
            0.0
        } else {
            self.score() / visits
        }
    }
}

/// One tree node: the move leading into it, its exploration and RAVE
/// statistics, its knowledge prior, and its proof state.
///
/// `mv` is a `Mutex` rather than a plain field: a reused node (one handed
/// back from the free list for a different parent's expansion) needs its
/// move overwritten, and every other field here is already behind some
/// synchronization primitive.
#[derive(Debug)]
pub struct Node {
    mv: Mutex<Move>,
    pub exp: Stat,
    pub rave: Stat,
    pub know: AtomicU32,
    pub outcome: AtomicOutcome,
    pub proofdepth: AtomicU16,
    /// Index into `children` of the proof-carrying move, valid once
    /// `outcome` is terminal. `u32::MAX` means "none recorded yet".
    pub bestmove: AtomicU32,
    children: AtomicU64,
    lock: AtomicBool,
}

impl Node {
    pub fn mv(&self) -> Move {
        *self.mv.lock().unwrap()
    }

    fn set_mv(&self, mv: Move) {
        *self.mv.lock().unwrap() = mv;
    }

    fn new(mv: Move) -> Self {
        Node {
            mv: Mutex::new(mv),
            exp: Stat::default(),
            rave: Stat::default(),
            know: AtomicU32::new(0),
            outcome: AtomicOutcome::new(Outcome::Unknown),
            proofdepth: AtomicU16::new(0),
            bestmove: AtomicU32::new(u32::MAX),
            children: AtomicU64::new(0),
            lock: AtomicBool::new(false),
        }
    }

    pub fn children(&self) -> ChildRange {
        ChildRange::unpack(self.children.load(Ordering::Acquire))
    }

    /// Attempt to claim this node for expansion. On success the caller must
    /// eventually call [`Node::publish_children`] or [`Node::unlock`].
    pub fn try_lock_expand(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }

    /// Atomically publish a freshly populated child block. Readers racing
    /// this call see either the empty range or this one, never a tear.
    fn publish_children(&self, range: ChildRange) {
        self.children.store(range.pack(), Ordering::Release);
    }
}

/// Snapshot of arena occupancy, for the coordinator's GC decision and for
/// logging at GC start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemStats {
    pub bytes_used: usize,
    pub live_blocks: usize,
    pub free_blocks: usize,
}

struct FreeList {
    /// Free blocks by exact size, first-fit within a size; coalesced by
    /// `compact` when a freed block abuts the arena's high-water mark.
    blocks: Vec<ChildRange>,
}

/// Bounded-memory arena of [`Node`]s, organised as a parent node plus a
/// contiguous children block per expansion.
pub struct CompactTree {
    nodes: RwLock<Vec<Node>>,
    free: Mutex<FreeList>,
    max_mem: usize,
    live_blocks: AtomicU32,
}

const NODE_SIZE: usize = std::mem::size_of::<Node>();

impl CompactTree {
    pub fn new(max_mem: usize) -> Self {
        let root = Node::new(Move::None);
        CompactTree {
            nodes: RwLock::new(vec![root]),
            free: Mutex::new(FreeList { blocks: Vec::new() }),
            max_mem,
            live_blocks: AtomicU32::new(0),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> R {
        let nodes = self.nodes.read().unwrap();
        f(&nodes[id.0 as usize])
    }

    /// Allocate and populate a children block of `moves.len()` nodes, then
    /// publish it onto `parent`. The caller must hold `parent`'s expansion
    /// lock (see [`Node::try_lock_expand`]); this does not itself contend
    /// on that bit, matching the spec's "a reader never blocks" guarantee —
    /// only expanding writers ever race each other.
    ///
    /// Returns `None` if `max_mem` would be exceeded; the caller should run
    /// a GC pass and retry.
    pub fn alloc_children(&self, parent: NodeId, moves: &[Move]) -> Option<ChildRange> {
        let n = moves.len() as u32;
        if n == 0 {
            return Some(ChildRange::EMPTY);
        }

        if let Some(range) = self.take_free(n) {
            self.populate(range, moves);
            self.with_node(parent, |node| node.publish_children(range));
            self.live_blocks.fetch_add(1, Ordering::Relaxed);
            return Some(range);
        }

        if self.mem_used() + n as usize * NODE_SIZE > self.max_mem {
            return None;
        }

        let mut nodes = self.nodes.write().unwrap();
        let start = nodes.len() as u32;
        nodes.extend(moves.iter().map(|&mv| Node::new(mv)));
        drop(nodes);

        let range = ChildRange { start, len: n };
        self.with_node(parent, |node| node.publish_children(range));
        self.live_blocks.fetch_add(1, Ordering::Relaxed);
        Some(range)
    }

    /// Reset a (possibly reused) child block's nodes in place, so a free-list
    /// hit behaves identically to a freshly grown block.
    fn populate(&self, range: ChildRange, moves: &[Move]) {
        let nodes = self.nodes.read().unwrap();
        for (i, &mv) in moves.iter().enumerate() {
            let node = &nodes[range.start as usize + i];
            node.set_mv(mv);
            node.children.store(0, Ordering::Relaxed);
            node.lock.store(false, Ordering::Relaxed);
            node.exp.visits.store(0, Ordering::Relaxed);
            node.exp.score_bits.store(0, Ordering::Relaxed);
            node.rave.visits.store(0, Ordering::Relaxed);
            node.rave.score_bits.store(0, Ordering::Relaxed);
            node.know.store(0, Ordering::Relaxed);
            loop {
                let current = node.outcome.load();
                if current == Outcome::Unknown || node.outcome.compare_exchange(current, Outcome::Unknown).is_ok() {
                    break;
                }
            }
            node.bestmove.store(u32::MAX, Ordering::Relaxed);
        }
    }

    fn take_free(&self, n: u32) -> Option<ChildRange> {
        let mut free = self.free.lock().unwrap();
        let idx = free.blocks.iter().position(|b| b.len == n)?;
        Some(free.blocks.swap_remove(idx))
    }

    /// Return a children block to the free list. The caller must guarantee
    /// no worker is still descending through it (safe once the owning
    /// iteration has completed, or during GC).
    pub fn dealloc(&self, range: ChildRange) {
        if range.is_empty() {
            return;
        }
        self.free.lock().unwrap().blocks.push(range);
        self.live_blocks.fetch_sub(1, Ordering::Relaxed);
    }

    /// Reclaim `node`'s entire children subtree, recursively, and reset
    /// `node` back to "not yet expanded" so it can be re-expanded later.
    /// The coordinator's garbage collector calls this on nodes it decides
    /// not to keep; descendants being discarded don't need their own
    /// fields reset, since `populate` already does that on reuse.
    pub fn prune(&self, node: NodeId) {
        let range = self.with_node(node, |n| n.children());
        if range.is_empty() {
            return;
        }
        self.with_node(node, |n| n.children.store(ChildRange::EMPTY.pack(), Ordering::Release));
        self.free_subtree(range);
    }

    fn free_subtree(&self, range: ChildRange) {
        for child in range.iter() {
            let sub = self.with_node(child, |n| n.children());
            if !sub.is_empty() {
                self.free_subtree(sub);
            }
        }
        self.dealloc(range);
    }

    /// Coalesce free blocks and reclaim the arena's high-water mark where
    /// possible. Requires the caller to have already quiesced all workers
    /// (the coordinator's GC barrier) — this does not itself synchronize
    /// with concurrent `alloc_children`/`with_node` calls beyond the locks
    /// it already takes, which is insufficient alone for correctness.
    pub fn compact(&self) {
        let stats_before = self.mem_stats();
        debug!(
            bytes_used = stats_before.bytes_used,
            live_blocks = stats_before.live_blocks,
            free_blocks = stats_before.free_blocks,
            "compacting arena"
        );

        let mut nodes = self.nodes.write().unwrap();
        let mut free = self.free.lock().unwrap();
        free.blocks.sort_by_key(|b| b.start);

        // Repeatedly drop any free block that abuts the end of the arena,
        // shrinking the backing store instead of leaving a dangling tail.
        loop {
            let tail_len = nodes.len() as u32;
            let Some(pos) = free
                .blocks
                .iter()
                .position(|b| b.start + b.len == tail_len)
            else {
                break;
            };
            let block = free.blocks.swap_remove(pos);
            nodes.truncate(block.start as usize);
        }
    }

    pub fn mem_used(&self) -> usize {
        self.nodes.read().unwrap().len() * NODE_SIZE
    }

    pub fn mem_stats(&self) -> MemStats {
        MemStats {
            bytes_used: self.mem_used(),
            live_blocks: self.live_blocks.load(Ordering::Relaxed) as usize,
            free_blocks: self.free.lock().unwrap().blocks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_starts_with_no_children() {
        let tree = CompactTree::new(1024 * 1024);
        let empty = tree.with_node(tree.root(), |n| n.children());
        assert!(empty.is_empty());
    }

    #[test]
    fn alloc_publishes_a_readable_child_range() {
        let tree = CompactTree::new(1024 * 1024);
        let moves = [Move::Cell(havannah_core::Coord::new(0, 0)), Move::Cell(havannah_core::Coord::new(1, 0))];
        let range = tree.alloc_children(tree.root(), &moves).unwrap();
        assert_eq!(range.len(), 2);
        let seen = tree.with_node(tree.root(), |n| n.children());
        assert_eq!(seen, range);
        for (i, id) in range.iter().enumerate() {
            let mv = tree.with_node(id, |n| n.mv());
            assert_eq!(mv, moves[i]);
        }
    }

    #[test]
    fn expansion_lock_is_single_writer() {
        let tree = CompactTree::new(1024 * 1024);
        let first = tree.with_node(tree.root(), |n| n.try_lock_expand());
        let second = tree.with_node(tree.root(), |n| n.try_lock_expand());
        assert!(first);
        assert!(!second);
        tree.with_node(tree.root(), |n| n.unlock());
        let third = tree.with_node(tree.root(), |n| n.try_lock_expand());
        assert!(third);
    }

    #[test]
    fn dealloc_and_realloc_reuses_the_freed_block() {
        let tree = CompactTree::new(1024 * 1024);
        let moves = [Move::Cell(havannah_core::Coord::new(0, 0))];
        let range = tree.alloc_children(tree.root(), &moves).unwrap();
        let used_before = tree.mem_used();
        tree.dealloc(range);
        assert_eq!(tree.mem_stats().free_blocks, 1);

        let other_moves = [Move::Cell(havannah_core::Coord::new(1, 0))];
        let reused = tree.alloc_children(tree.root(), &other_moves).unwrap();
        assert_eq!(reused, range);
        assert_eq!(tree.mem_used(), used_before);
        assert_eq!(tree.mem_stats().free_blocks, 0);
    }

    #[test]
    fn alloc_refuses_once_max_mem_is_exceeded() {
        let tree = CompactTree::new(NODE_SIZE);
        let moves = [
            Move::Cell(havannah_core::Coord::new(0, 0)),
            Move::Cell(havannah_core::Coord::new(1, 0)),
        ];
        assert!(tree.alloc_children(tree.root(), &moves).is_none());
    }

    #[test]
    fn prune_frees_a_two_level_subtree_and_resets_the_node() {
        let tree = CompactTree::new(1024 * 1024);
        let moves = [Move::Cell(havannah_core::Coord::new(0, 0)), Move::Cell(havannah_core::Coord::new(1, 0))];
        let range = tree.alloc_children(tree.root(), &moves).unwrap();
        let grandchild_moves = [Move::Cell(havannah_core::Coord::new(2, 0))];
        let first_child = range.get(0).unwrap();
        tree.alloc_children(first_child, &grandchild_moves).unwrap();

        let before = tree.mem_stats();
        tree.prune(tree.root());

        assert!(tree.with_node(tree.root(), |n| n.children()).is_empty());
        let after = tree.mem_stats();
        assert_eq!(after.free_blocks, before.free_blocks + 2);
        assert_eq!(after.live_blocks, 0);
    }

    #[test]
    fn compact_shrinks_a_trailing_free_block() {
        let tree = CompactTree::new(1024 * 1024);
        let moves = [Move::Cell(havannah_core::Coord::new(0, 0))];
        let range = tree.alloc_children(tree.root(), &moves).unwrap();
        let used_before = tree.mem_used();
        tree.dealloc(range);
        tree.compact();
        assert!(tree.mem_used() < used_before);
        assert_eq!(tree.mem_stats().free_blocks, 0);
    }

    #[test]
    fn stat_add_accumulates_score_and_visits() {
        let stat = Stat::default();
        stat.add(1.0);
        stat.add(0.0);
        assert_eq!(stat.visits(), 2);
        assert_eq!(stat.score(), 1.0);
        assert_eq!(stat.mean(), 0.5);
    }

    #[test]
    fn add_wins_seeds_visits_and_score_in_one_shot() {
        let stat = Stat::default();
        stat.add_wins(3);
        assert_eq!(stat.visits(), 3);
        assert_eq!(stat.score(), 3.0);
        assert_eq!(stat.mean(), 1.0);
    }

    #[test]
    fn virtual_loss_depresses_mean_without_touching_visits() {
        let stat = Stat::default();
        stat.add(1.0);
        stat.add_virtual_loss();
        assert_eq!(stat.visits(), 1);
        assert!(stat.mean() < 1.0);
        stat.remove_virtual_loss();
        assert_eq!(stat.mean(), 1.0);
    }
}
