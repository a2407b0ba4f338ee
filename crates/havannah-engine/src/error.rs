//! Error types surfaced by the search to its caller.

use thiserror::Error;

use havannah_core::BoardError;

/// Errors that can escape a search call. Internal races (lock contention,
/// CAS retries) are recovered locally and never reach this type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Propagated from board construction or move application.
    #[error(transparent)]
    Board(#[from] BoardError),

    /// The arena could not satisfy an allocation even after garbage
    /// collection. The search stops and returns its current best move.
    #[error("search tree exhausted its {max_mem} byte budget after garbage collection")]
    OutOfMemory {
        /// The configured arena byte budget.
        max_mem: usize,
    },

    /// A worker thread panicked. All workers are torn down; never
    /// swallowed silently.
    #[error("worker thread {thread_id} panicked: {detail}")]
    WorkerPanic {
        /// Which worker panicked.
        thread_id: usize,
        /// The panic payload, downcast to a string where possible.
        detail: String,
    },
}
