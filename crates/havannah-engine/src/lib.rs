//! Concurrent Monte Carlo tree search for Havannah: a bounded-memory node
//! arena, RAVE/UCT statistics, proof-number-style back-propagation, a
//! knowledge-weighted rollout policy, and a worker/coordinator pair driving
//! it all through a barrier-based run/GC state machine.

pub mod backup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod knowledge;
pub mod movelist;
pub mod rollout;
pub mod solver;
pub mod tree;
pub mod worker;

pub use backup::{AtomicOutcome, ChildProof, Outcome, ParentProof};
pub use config::Config;
pub use coordinator::{ChildStat, Coordinator, GenmoveReport};
pub use error::EngineError;
pub use movelist::{LastGoodReply, MoveList, Played};
pub use rollout::{Gammas, UniformGammas};
pub use solver::{NullSolver, Solver, SolvedOutcome};
pub use tree::{ChildRange, CompactTree, MemStats, Node, NodeId, Stat};
pub use worker::run_iteration;
