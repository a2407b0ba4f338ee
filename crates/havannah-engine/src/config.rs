//! Search configuration: a flat parameter record, one field per knob in
//! the options table, with a [`Default`] matching the engine's baseline
//! constants.

/// All tunable search parameters. Deliberately flat — no builder, no
/// setters: callers construct one with `Config { threads: 4, ..Default::default() }`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Worker thread count. `1` degenerates to single-threaded search.
    pub threads: usize,
    /// Keep searching between moves on the opponent's clock.
    pub ponder: bool,
    /// Arena byte budget.
    pub max_mem: usize,
    /// Visits required before a leaf is expanded.
    pub visit_expand: u32,

    /// RAVE blending factor: `alpha = rave_factor / (rave_factor + visits)`.
    pub rave_factor: f64,
    /// Multiplier applied to `rave_factor` as a node accumulates visits.
    pub decr_rave: f64,
    /// Probability, per iteration, that selection blends in RAVE at all.
    pub p_rave: f64,
    /// UCT exploration constant.
    pub explore: f64,
    /// Probability, per iteration, that selection adds the UCT exploration
    /// term at all.
    pub p_explore: f64,
    /// Value assigned to an unvisited child ("first play urgency").
    pub fpurgency: f64,

    /// Overall knowledge weight scale.
    pub knowledge: f64,
    /// Weight of the locality heuristic.
    pub locality: f64,
    /// Weight of the last-good-reply-adjacent heuristic.
    pub local_reply: f64,
    /// Weight of the group-connectivity (corner/edge touch) heuristic.
    pub connect: f64,
    /// Weight of the group-size heuristic.
    pub size: f64,
    /// Weight of the bridge-probe heuristic.
    pub bridge: f64,
    /// Weight of the distance-to-win heuristic. `0` disables the BFS.
    pub dists: f64,

    /// Use gamma-weighted random sampling in rollouts instead of a shuffle.
    pub weighted_random: bool,
    /// Let knowledge weights influence the rollout gamma table.
    pub weighted_know: bool,

    /// Probability in `[0, 1]` of checking for rings during a rollout.
    pub check_rings: f64,
    /// Plies into the rollout that ring checking stays active; negative
    /// values are a fraction of the moves remaining.
    pub check_ring_depth: i32,
    /// Minimum ring length counted as a win early in a rollout.
    pub min_ring_size: u8,
    /// Amount `min_ring_size` grows every `ring_counter_full` moves.
    pub ring_incr: u8,
    /// Reject rings that touch the board border.
    pub ring_perm: bool,

    /// `0` off, `1` instant win only, `2` adds forced block, `3` adds
    /// contour scan.
    pub instantwin: u8,
    /// Depth limit for tactical shortcuts; negative scales by board size.
    pub instwin_depth: i32,
    /// Use the bridge-probe forced-reply defence in rollouts.
    pub rollout_pattern: bool,
    /// `0` off, `1` record winning replies only, `2` also clear losing ones.
    pub last_good_reply: u8,

    /// `0` off, `1` immediate test only, `>=2` shallow alpha-beta via the
    /// external solver at expansion.
    pub minimax: u8,
    /// Restrict first-move children to one representative per D6 orbit.
    pub prune_symmetry: bool,

    /// Final move selection exploration coefficient.
    pub ms_explore: f64,
    /// Final move selection RAVE weight; `-1`/`-2` collapse to raw
    /// simulation/win counts.
    pub ms_rave: f64,

    /// Progressive widening base; `0` disables widening.
    pub dynwiden: f64,

    /// GC threshold: nodes below this visit count are reclaimed first.
    pub gc_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            threads: 1,
            ponder: false,
            max_mem: 256 * 1024 * 1024,
            visit_expand: 1,

            rave_factor: 500.0,
            decr_rave: 0.0,
            p_rave: 1.0,
            explore: 0.7,
            p_explore: 1.0,
            fpurgency: 1.1,

            knowledge: 1.0,
            locality: 5.0,
            local_reply: 10.0,
            connect: 20.0,
            size: 0.1,
            bridge: 2.0,
            dists: 0.0,

            weighted_random: false,
            weighted_know: false,

            check_rings: 1.0,
            check_ring_depth: -1,
            min_ring_size: 6,
            ring_incr: 0,
            ring_perm: true,

            instantwin: 1,
            instwin_depth: -1,
            rollout_pattern: true,
            last_good_reply: 1,

            minimax: 0,
            prune_symmetry: false,

            ms_explore: 0.0,
            ms_rave: -1.0,

            dynwiden: 0.0,

            gc_limit: 5,
        }
    }
}

impl Config {
    /// The [`havannah_core::Board::play_ring_filtered`] threshold to use
    /// this many moves into a rollout, per the `ring_incr` escalation.
    pub fn ring_size_at(&self, moves_into_rollout: u32, ring_counter_full: u32) -> u8 {
        if ring_counter_full == 0 {
            return self.min_ring_size;
        }
        let steps = moves_into_rollout / ring_counter_full;
        self.min_ring_size
            .saturating_add((steps as u8).saturating_mul(self.ring_incr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = Config::default();
        assert!(cfg.threads >= 1);
        assert!(cfg.rave_factor > 0.0);
    }

    #[test]
    fn ring_size_escalates_with_ring_incr() {
        let mut cfg = Config::default();
        cfg.min_ring_size = 6;
        cfg.ring_incr = 2;
        assert_eq!(cfg.ring_size_at(0, 10), 6);
        assert_eq!(cfg.ring_size_at(10, 10), 8);
        assert_eq!(cfg.ring_size_at(25, 10), 10);
    }

    #[test]
    fn ring_size_flat_when_ring_counter_full_is_zero() {
        let cfg = Config::default();
        assert_eq!(cfg.ring_size_at(100, 0), cfg.min_ring_size);
    }
}
