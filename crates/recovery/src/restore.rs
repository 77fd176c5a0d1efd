use crate::queue::{DrainLimit, RecoveryQueue, WorkItem};
use crate::stats::Stats;
use blastmend_kernel::{BlockWorld, WorldError};

/// Result of applying one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// Transient host refusal; the snapshot is dropped and the batch continues.
    Failed(WorldError),
    /// The snapshot's world is gone.
    Discarded(WorldError),
}

/// Apply each work item's snapshot to `world`, in order.
///
/// Must run on the world context. Restoring a position overwrites whatever is
/// there, so applying the same snapshot twice leaves the same end state.
pub fn restore_batch(world: &mut dyn BlockWorld, items: &[WorkItem]) -> Vec<RestoreOutcome> {
    items
        .iter()
        .map(|item| {
            let pos = item.snapshot.pos();
            match world.set_block(pos, item.snapshot.data().clone()) {
                Ok(()) => RestoreOutcome::Restored,
                Err(err @ WorldError::ChunkUnloaded { .. }) => {
                    tracing::warn!(explosion = %item.explosion, %pos, %err, "restore failed, skipping block");
                    RestoreOutcome::Failed(err)
                }
                Err(err @ WorldError::WorldUnavailable(_)) => {
                    tracing::debug!(explosion = %item.explosion, %pos, %err, "discarding block");
                    RestoreOutcome::Discarded(err)
                }
            }
        })
        .collect()
}

/// Tally of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items taken off the queue.
    pub taken: usize,
    pub restored: usize,
    pub failed: usize,
    pub discarded: usize,
    /// Explosions whose final snapshot was restored in this drain.
    pub explosions_completed: usize,
}

impl DrainReport {
    /// Count `outcomes` against `items` and credit the restorations to `stats`.
    pub fn settle(items: &[WorkItem], outcomes: &[RestoreOutcome], stats: &Stats) -> Self {
        let mut report = Self {
            taken: items.len(),
            ..Self::default()
        };
        for (item, outcome) in items.iter().zip(outcomes) {
            match outcome {
                RestoreOutcome::Restored => {
                    report.restored += 1;
                    if item.last {
                        report.explosions_completed += 1;
                    }
                }
                RestoreOutcome::Failed(_) => report.failed += 1,
                RestoreOutcome::Discarded(_) => report.discarded += 1,
            }
        }
        stats.record_blocks(report.restored as u64);
        stats.record_explosions(report.explosions_completed as u64);
        report
    }
}

/// Take up to `limit` items and restore them immediately on `world`.
///
/// For callers already on the world context. Returns once the batch is applied.
pub fn drain_now(
    queue: &RecoveryQueue,
    stats: &Stats,
    world: &mut dyn BlockWorld,
    limit: DrainLimit,
) -> DrainReport {
    let _span = tracing::debug_span!("drain_now", ?limit).entered();
    let items = queue.take(limit);
    if items.is_empty() {
        return DrainReport::default();
    }
    let outcomes = restore_batch(world, &items);
    let report = DrainReport::settle(&items, &outcomes, stats);
    tracing::debug!(
        restored = report.restored,
        failed = report.failed,
        discarded = report.discarded,
        "drain applied"
    );
    report
}
