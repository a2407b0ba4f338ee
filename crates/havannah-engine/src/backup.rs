//! The six-valued proof lattice and `do_backup`, propagating solved
//! sub-trees up through the search tree.
//!
//! Grounded on `original_source/playeruct.cpp`'s `Player::do_backup`: that
//! function ranks a child's outcome, from the perspective of the player to
//! move at the parent, on a 0..6 scale (loss=0, draw/loss=1, draw=2 or 4,
//! win/draw=5, win=6) and keeps the best-ranked child. This carries the
//! same ordering forward as the derived `Ord` on [`Outcome`], collapsing
//! the original's two draw ranks (the distinction only mattered for a
//! tie-break nuance this port folds into visit-count comparison instead).

use std::sync::atomic::{AtomicU8, Ordering};

use havannah_core::Outcome as BoardOutcome;

/// A node's proof state, relative to the player to move *at that node*.
/// Ranked worst-to-best by the derived [`Ord`] so `do_backup` can take a
/// plain `max`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum Outcome {
    /// Proven a loss for the player to move here.
    Loss,
    /// Proven to be a draw or a loss; which one is not yet known.
    DrawOrLoss,
    /// Proven a draw.
    Draw,
    /// Proven to be a win or a draw; which one is not yet known.
    WinOrDraw,
    /// Proven a win for the player to move here.
    Win,
    /// Nothing proven yet.
    #[default]
    Unknown,
}

impl Outcome {
    /// True once this leaves no room for further search.
    pub fn is_terminal(self) -> bool {
        matches!(self, Outcome::Win | Outcome::Loss | Outcome::Draw)
    }

    /// Relative outcome of a finished board, from `toplay`'s perspective.
    pub fn from_board(outcome: BoardOutcome, toplay: u8) -> Outcome {
        match outcome.winner() {
            Some(p) if p == toplay => Outcome::Win,
            Some(_) => Outcome::Loss,
            None if outcome == BoardOutcome::Draw => Outcome::Draw,
            None => Outcome::Unknown,
        }
    }

    /// Flip a child's outcome (recorded relative to the child's own
    /// side-to-move) to the parent's perspective — the parent and child
    /// alternate sides, so win/loss invert and draws are fixed points.
    pub fn flip(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::WinOrDraw => Outcome::DrawOrLoss,
            Outcome::DrawOrLoss => Outcome::WinOrDraw,
            other => other,
        }
    }

    fn to_bits(self) -> u8 {
        self as u8
    }

    fn from_bits(bits: u8) -> Outcome {
        match bits {
            0 => Outcome::Loss,
            1 => Outcome::DrawOrLoss,
            2 => Outcome::Draw,
            3 => Outcome::WinOrDraw,
            4 => Outcome::Win,
            _ => Outcome::Unknown,
        }
    }
}

/// An atomic cell holding a node's [`Outcome`], transitioned by CAS so
/// concurrent backups from different workers race safely.
#[derive(Debug, Default)]
pub struct AtomicOutcome(AtomicU8);

impl AtomicOutcome {
    pub fn new(outcome: Outcome) -> Self {
        AtomicOutcome(AtomicU8::new(outcome.to_bits()))
    }

    pub fn load(&self) -> Outcome {
        Outcome::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Attempt to move from `current` to `new`. Returns `Err(actual)` on a
    /// lost race so the caller can retry from the observed value.
    pub fn compare_exchange(&self, current: Outcome, new: Outcome) -> Result<(), Outcome> {
        self.0
            .compare_exchange(
                current.to_bits(),
                new.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(Outcome::from_bits)
    }
}

/// One child's outcome plus the stats `do_backup` needs to break ties
/// (fewest visits for a short win, most visits for a long loss/draw).
#[derive(Clone, Copy, Debug)]
pub struct ChildProof {
    pub outcome: Outcome,
    pub proofdepth: u16,
    pub visits: u32,
    /// Opaque handle the caller uses to identify the winning child (e.g.
    /// an index into the children array).
    pub id: usize,
}

/// Result of a successful backup: the parent's new proof state.
#[derive(Clone, Copy, Debug)]
pub struct ParentProof {
    pub outcome: Outcome,
    pub proofdepth: u16,
    pub bestmove_id: usize,
}

/// Scan `children` (already flipped to the parent's perspective) and
/// compute the parent's new proof state, per `original_source`'s
/// `do_backup`. Returns `None` if no child proves anything useful yet
/// (some child is still [`Outcome::Unknown`] and none is a win).
pub fn fold_children(children: &[ChildProof]) -> Option<ParentProof> {
    if let Some(win) = children
        .iter()
        .filter(|c| c.outcome == Outcome::Win)
        .min_by_key(|c| c.visits)
    {
        let proofdepth = children
            .iter()
            .filter(|c| c.outcome == Outcome::Win)
            .map(|c| c.proofdepth)
            .min()
            .unwrap_or(win.proofdepth)
            + 1;
        return Some(ParentProof {
            outcome: Outcome::Win,
            proofdepth,
            bestmove_id: win.id,
        });
    }

    if children.iter().any(|c| c.outcome == Outcome::Unknown) {
        return None;
    }

    // No win, no unresolved child: combine the remaining partial outcomes
    // into the tightest bound, preferring long losses/draws (most visits)
    // over short ones, matching the original's tie-break.
    let mut best: Option<ChildProof> = None;
    for &c in children {
        best = Some(match best {
            None => c,
            Some(b) if c.outcome > b.outcome => c,
            Some(b) if c.outcome == b.outcome && c.visits > b.visits => c,
            Some(b) => b,
        });
    }
    let best = best?;
    let proofdepth = children.iter().map(|c| c.proofdepth).max().unwrap_or(0) + 1;
    Some(ParentProof {
        outcome: best.outcome,
        proofdepth,
        bestmove_id: best.id,
    })
}

/// `do_backup(parent, children, toplay_at_parent)`: attempt to move
/// `parent`'s outcome from its currently observed value to whatever
/// `fold_children` computes, retrying on CAS contention. `children` must
/// already be expressed relative to `toplay_at_parent` (see [`Outcome::flip`]).
///
/// Returns `true` once the parent carries a terminal or partial proof
/// (matching the original's `return node->outcome >= 0`).
pub fn do_backup(parent: &AtomicOutcome, children: &[ChildProof]) -> Option<ParentProof> {
    loop {
        let current = parent.load();
        if current.is_terminal() {
            return Some(ParentProof {
                outcome: current,
                proofdepth: 0,
                bestmove_id: 0,
            });
        }

        let Some(proof) = fold_children(children) else {
            return None;
        };

        match parent.compare_exchange(current, proof.outcome) {
            Ok(()) => return Some(proof),
            Err(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(outcome: Outcome, visits: u32, id: usize) -> ChildProof {
        ChildProof { outcome, proofdepth: 0, visits, id }
    }

    #[test]
    fn ordering_matches_backup_order() {
        assert!(Outcome::Loss < Outcome::DrawOrLoss);
        assert!(Outcome::DrawOrLoss < Outcome::Draw);
        assert!(Outcome::Draw < Outcome::WinOrDraw);
        assert!(Outcome::WinOrDraw < Outcome::Win);
    }

    #[test]
    fn one_win_proves_the_node_a_win_with_min_plus_one_proofdepth() {
        let children = [
            ChildProof { outcome: Outcome::Unknown, proofdepth: 0, visits: 5, id: 0 },
            ChildProof { outcome: Outcome::Win, proofdepth: 3, visits: 10, id: 1 },
            ChildProof { outcome: Outcome::Win, proofdepth: 1, visits: 2, id: 2 },
        ];
        let proof = fold_children(&children).unwrap();
        assert_eq!(proof.outcome, Outcome::Win);
        assert_eq!(proof.proofdepth, 2);
        // prefers the short win (fewest visits) as the witnessing move
        assert_eq!(proof.bestmove_id, 2);
    }

    #[test]
    fn all_losses_prove_a_loss_with_max_plus_one_proofdepth_and_long_loss_preference() {
        let children = [
            child(Outcome::Loss, 3, 0).with_depth(2),
            child(Outcome::Loss, 9, 1).with_depth(4),
        ];
        let proof = fold_children(&children).unwrap();
        assert_eq!(proof.outcome, Outcome::Loss);
        assert_eq!(proof.proofdepth, 5);
        assert_eq!(proof.bestmove_id, 1); // most visits: the long loss
    }

    #[test]
    fn mixing_loss_and_unknown_proves_nothing() {
        let children = [child(Outcome::Loss, 3, 0), child(Outcome::Unknown, 1, 1)];
        assert!(fold_children(&children).is_none());
    }

    #[test]
    fn a_proven_draw_beats_a_proven_loss() {
        // toplay can always pick the drawing child, so the parent is a
        // certain draw even though a losing sibling also exists.
        let children = [child(Outcome::Draw, 4, 0), child(Outcome::Loss, 2, 1)];
        let proof = fold_children(&children).unwrap();
        assert_eq!(proof.outcome, Outcome::Draw);
    }

    #[test]
    fn partial_draw_or_loss_beats_a_proven_loss() {
        // when the best available child is itself only partially proven
        // (draw-or-loss), that uncertainty propagates to the parent.
        let children = [child(Outcome::DrawOrLoss, 4, 0), child(Outcome::Loss, 2, 1)];
        let proof = fold_children(&children).unwrap();
        assert_eq!(proof.outcome, Outcome::DrawOrLoss);
    }

    #[test]
    fn atomic_outcome_cas_retries_on_contention() {
        let cell = AtomicOutcome::new(Outcome::Unknown);
        assert!(cell.compare_exchange(Outcome::Unknown, Outcome::Draw).is_ok());
        assert_eq!(cell.load(), Outcome::Draw);
        assert_eq!(
            cell.compare_exchange(Outcome::Unknown, Outcome::Win),
            Err(Outcome::Draw)
        );
    }

    #[test]
    fn do_backup_is_a_noop_once_parent_is_terminal() {
        let parent = AtomicOutcome::new(Outcome::Win);
        let children = [child(Outcome::Loss, 1, 0)];
        let proof = do_backup(&parent, &children).unwrap();
        assert_eq!(proof.outcome, Outcome::Win);
    }

    #[test]
    fn flip_inverts_win_and_loss_but_fixes_draw() {
        assert_eq!(Outcome::Win.flip(), Outcome::Loss);
        assert_eq!(Outcome::Loss.flip(), Outcome::Win);
        assert_eq!(Outcome::Draw.flip(), Outcome::Draw);
        assert_eq!(Outcome::Unknown.flip(), Outcome::Unknown);
    }

    impl ChildProof {
        fn with_depth(mut self, d: u16) -> Self {
            self.proofdepth = d;
            self
        }
    }
}
