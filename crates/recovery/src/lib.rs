//! Recovery: captured explosions, the pending-restoration queue and the batch restorer.
//!
//! # Invariants
//! - A snapshot exists before its block is cleared; restoration only ever reads snapshots.
//! - Queue order is explosion arrival order, then snapshot order within an explosion.
//! - A work item leaves the queue at most once, so a block is restored at most once.
//! - Stats counters only ever increase.

mod queue;
mod restore;
mod snapshot;
mod stats;

pub use queue::{DrainLimit, RecoveryQueue, WorkItem};
pub use restore::{DrainReport, RestoreOutcome, drain_now, restore_batch};
pub use snapshot::{BlockSnapshot, Explosion};
pub use stats::{Stats, StatsSink, StatsSnapshot};
