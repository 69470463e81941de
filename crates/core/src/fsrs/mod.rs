/// FSRS scheduling engine.
///
/// Implements the 17-parameter FSRS model (v4 revision, exponential
/// forgetting curve) over the four-state card machine:
///
/// 1. **State machine**: NEW → LEARNING → REVIEW with RELEARNING on lapses
/// 2. **Memory model**: stability/difficulty updates per grade and elapsed time
/// 3. **Interval calculator**: next review date from stability and the
///    user's requested retention
/// 4. **Queue assembly**: prioritized union of learning, review, and new
///    cards under a capacity split
///
/// All computations are pure and deterministic; per-call cost is a handful
/// of float ops, far under the 10ms target.
pub mod engine;
pub mod queue;
pub mod weights;

pub use engine::{FsrsEngine, ReviewOutcome};
pub use queue::{assemble_queue, QueueSplit, ReviewQueue};
pub use weights::{SchedulerParams, RETENTION_MAX, RETENTION_MIN};
