use crate::snapshot::{BlockSnapshot, Explosion};
use blastmend_common::{ExplosionId, WorldId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// How many pending snapshots a drain may restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainLimit {
    Count(usize),
    Unbounded,
}

impl DrainLimit {
    pub fn max(self) -> usize {
        match self {
            Self::Count(n) => n,
            Self::Unbounded => usize::MAX,
        }
    }
}

/// One snapshot taken off the queue for restoration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub explosion: ExplosionId,
    pub index: usize,
    pub snapshot: BlockSnapshot,
    /// This is the final pending snapshot of its explosion.
    pub last: bool,
    origin: Arc<Explosion>,
}

#[derive(Debug)]
struct PendingExplosion {
    explosion: Arc<Explosion>,
    /// Index of the next snapshot to hand out.
    cursor: usize,
}

impl PendingExplosion {
    fn remaining(&self) -> usize {
        self.explosion.len().saturating_sub(self.cursor)
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    explosions: VecDeque<PendingExplosion>,
    pending_blocks: usize,
}

/// FIFO of pending restorations, flattened across explosions.
///
/// Shared between the capture path and the drain paths. The lock is held only
/// for the duration of a push or take, never while blocks are applied.
#[derive(Debug)]
pub struct RecoveryQueue {
    inner: Mutex<QueueInner>,
    next_id: AtomicU64,
}

impl Default for RecoveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Reserve the next explosion id.
    pub fn allocate_id(&self) -> ExplosionId {
        ExplosionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Append an explosion. Empty explosions are dropped.
    pub fn push(&self, explosion: Explosion) {
        if explosion.is_empty() {
            return;
        }
        // Keep ids unique across explosions restored from disk.
        self.next_id
            .fetch_max(explosion.id().0.saturating_add(1), Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.pending_blocks += explosion.len();
        tracing::debug!(
            id = %explosion.id(),
            blocks = explosion.len(),
            queued = inner.pending_blocks,
            "explosion queued"
        );
        inner.explosions.push_back(PendingExplosion {
            explosion: Arc::new(explosion),
            cursor: 0,
        });
    }

    /// Remove up to `limit` snapshots from the front of the queue.
    pub fn take(&self, limit: DrainLimit) -> Vec<WorkItem> {
        let max = limit.max();
        let mut inner = self.inner.lock();
        let mut items = Vec::with_capacity(max.min(inner.pending_blocks));
        while items.len() < max {
            let Some(front) = inner.explosions.front_mut() else {
                break;
            };
            let Some(snapshot) = front.explosion.snapshots().get(front.cursor).cloned() else {
                inner.explosions.pop_front();
                continue;
            };
            let index = front.cursor;
            front.cursor += 1;
            let last = front.remaining() == 0;
            items.push(WorkItem {
                explosion: front.explosion.id(),
                index,
                snapshot,
                last,
                origin: Arc::clone(&front.explosion),
            });
            if last {
                inner.explosions.pop_front();
            }
        }
        inner.pending_blocks = inner.pending_blocks.saturating_sub(items.len());
        items
    }

    /// Put items from one `take` back at the head of the queue, in their original order.
    ///
    /// Used when a batch could not be applied. Callers must not interleave other
    /// takes between the `take` and the requeue.
    pub fn requeue_front(&self, items: Vec<WorkItem>) {
        let Some(first) = items.first() else {
            return;
        };
        // Contiguous runs per explosion: (explosion, index of its first taken snapshot).
        let mut runs: Vec<(Arc<Explosion>, usize)> = vec![(Arc::clone(&first.origin), first.index)];
        for item in &items[1..] {
            if runs.last().is_some_and(|(origin, _)| origin.id() != item.explosion) {
                runs.push((Arc::clone(&item.origin), item.index));
            }
        }

        let mut inner = self.inner.lock();
        for (origin, from) in runs.into_iter().rev() {
            match inner.explosions.front_mut() {
                Some(front) if front.explosion.id() == origin.id() => front.cursor = from,
                _ => inner.explosions.push_front(PendingExplosion {
                    explosion: origin,
                    cursor: from,
                }),
            }
        }
        inner.pending_blocks += items.len();
        tracing::debug!(
            requeued = items.len(),
            queued = inner.pending_blocks,
            "batch returned to the queue"
        );
    }

    /// Number of snapshots still waiting.
    pub fn pending_blocks(&self) -> usize {
        self.inner.lock().pending_blocks
    }

    /// Number of explosions with at least one snapshot waiting.
    pub fn pending_explosions(&self) -> usize {
        self.inner.lock().explosions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_blocks() == 0
    }

    /// Drop every pending snapshot located in `world`. Returns how many were discarded.
    pub fn discard_world(&self, world: WorldId) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.pending_blocks;
        inner.explosions.retain(|p| p.explosion.location().world != world);
        let after: usize = inner.explosions.iter().map(PendingExplosion::remaining).sum();
        inner.pending_blocks = after;
        let discarded = before.saturating_sub(after);
        if discarded > 0 {
            tracing::info!(%world, discarded, "discarded pending restorations for removed world");
        }
        discarded
    }

    /// Copy of what is still pending, one explosion per entry.
    pub fn snapshot_pending(&self) -> Vec<Explosion> {
        self.inner
            .lock()
            .explosions
            .iter()
            .map(|p| p.explosion.remainder(p.cursor))
            .collect()
    }

    /// Remove and return everything still pending.
    pub fn take_all_explosions(&self) -> Vec<Explosion> {
        let mut inner = self.inner.lock();
        inner.pending_blocks = 0;
        inner
            .explosions
            .drain(..)
            .map(|p| p.explosion.remainder(p.cursor))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastmend_common::{BlockData, BlockPos, Location, Material};

    fn explosion(queue: &RecoveryQueue, world: WorldId, blocks: i32) -> Explosion {
        let stone = BlockData::solid(Material::parse("STONE").unwrap());
        Explosion::capture(
            queue.allocate_id(),
            Location::new(world, 0.0, 64.0, 0.0),
            "CREEPER",
            (0..blocks).map(|i| (BlockPos::new(world, i, 64, 0), stone.clone())),
        )
    }

    #[test]
    fn ids_are_monotonic() {
        let queue = RecoveryQueue::new();
        let a = queue.allocate_id();
        let b = queue.allocate_id();
        assert!(b > a);
    }

    #[test]
    fn take_is_fifo_across_explosions() {
        let queue = RecoveryQueue::new();
        let world = WorldId::new();
        let first = explosion(&queue, world, 2);
        let second = explosion(&queue, world, 2);
        let (first_id, second_id) = (first.id(), second.id());
        queue.push(first);
        queue.push(second);

        let items = queue.take(DrainLimit::Count(3));
        let order: Vec<(ExplosionId, usize, bool)> =
            items.iter().map(|i| (i.explosion, i.index, i.last)).collect();
        assert_eq!(
            order,
            vec![(first_id, 0, false), (first_id, 1, true), (second_id, 0, false)]
        );
        assert_eq!(queue.pending_blocks(), 1);
        assert_eq!(queue.pending_explosions(), 1);

        let rest = queue.take(DrainLimit::Count(3));
        assert_eq!(rest.len(), 1);
        assert!(rest[0].last);
        assert!(queue.is_empty());
    }

    #[test]
    fn take_count_restores_min_of_n_and_pending() {
        let queue = RecoveryQueue::new();
        queue.push(explosion(&queue, WorldId::new(), 5));
        assert_eq!(queue.take(DrainLimit::Count(2)).len(), 2);
        assert_eq!(queue.pending_blocks(), 3);
        assert_eq!(queue.take(DrainLimit::Count(10)).len(), 3);
        assert!(queue.take(DrainLimit::Count(10)).is_empty());
    }

    #[test]
    fn unbounded_takes_everything() {
        let queue = RecoveryQueue::new();
        let world = WorldId::new();
        queue.push(explosion(&queue, world, 3));
        queue.push(explosion(&queue, world, 4));
        assert_eq!(queue.take(DrainLimit::Unbounded).len(), 7);
        assert_eq!(queue.pending_explosions(), 0);
    }

    #[test]
    fn empty_explosion_is_not_queued() {
        let queue = RecoveryQueue::new();
        queue.push(explosion(&queue, WorldId::new(), 0));
        assert_eq!(queue.pending_explosions(), 0);
    }

    #[test]
    fn discard_world_keeps_other_worlds() {
        let queue = RecoveryQueue::new();
        let (a, b) = (WorldId::new(), WorldId::new());
        queue.push(explosion(&queue, a, 3));
        queue.push(explosion(&queue, b, 2));
        queue.take(DrainLimit::Count(1));

        assert_eq!(queue.discard_world(a), 2);
        assert_eq!(queue.pending_blocks(), 2);
        assert_eq!(queue.pending_explosions(), 1);
    }

    #[test]
    fn pending_reports_remainders() {
        let queue = RecoveryQueue::new();
        queue.push(explosion(&queue, WorldId::new(), 3));
        queue.take(DrainLimit::Count(2));
        let pending = queue.snapshot_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].len(), 1);
        assert_eq!(queue.pending_blocks(), 1);

        let taken = queue.take_all_explosions();
        assert_eq!(taken, pending);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeued_batch_goes_back_in_order() {
        let queue = RecoveryQueue::new();
        let world = WorldId::new();
        let first = explosion(&queue, world, 2);
        let second = explosion(&queue, world, 3);
        queue.push(first);
        queue.push(second);
        queue.push(explosion(&queue, world, 1));
        let before = queue.snapshot_pending();

        let taken = queue.take(DrainLimit::Count(4));
        assert_eq!(queue.pending_explosions(), 2);
        let order: Vec<(ExplosionId, usize)> =
            taken.iter().map(|i| (i.explosion, i.index)).collect();
        queue.requeue_front(taken);

        assert_eq!(queue.pending_blocks(), 6);
        assert_eq!(queue.pending_explosions(), 3);
        assert_eq!(queue.snapshot_pending(), before);
        let again: Vec<(ExplosionId, usize)> = queue
            .take(DrainLimit::Count(4))
            .iter()
            .map(|i| (i.explosion, i.index))
            .collect();
        assert_eq!(again, order);
    }

    #[test]
    fn requeue_after_partial_take_rewinds_cursor() {
        let queue = RecoveryQueue::new();
        queue.push(explosion(&queue, WorldId::new(), 5));
        queue.take(DrainLimit::Count(1));
        let taken = queue.take(DrainLimit::Count(2));
        queue.requeue_front(taken);
        assert_eq!(queue.pending_explosions(), 1);
        let indices: Vec<usize> = queue
            .take(DrainLimit::Unbounded)
            .iter()
            .map(|i| i.index)
            .collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn pushing_restored_explosion_advances_ids() {
        let queue = RecoveryQueue::new();
        let world = WorldId::new();
        let stone = BlockData::solid(Material::parse("STONE").unwrap());
        let old = Explosion::capture(
            ExplosionId(41),
            Location::new(world, 0.0, 0.0, 0.0),
            "CREEPER",
            [(BlockPos::new(world, 0, 0, 0), stone)],
        );
        queue.push(old);
        assert_eq!(queue.allocate_id(), ExplosionId(42));
    }

    #[test]
    fn concurrent_takes_never_share_items() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let queue = Arc::new(RecoveryQueue::new());
        let world = WorldId::new();
        for _ in 0..10 {
            queue.push(explosion(&queue, world, 50));
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        let items = queue.take(DrainLimit::Count(7));
                        if items.is_empty() {
                            break seen;
                        }
                        seen.extend(items.into_iter().map(|i| (i.explosion, i.index)));
                    }
                })
            })
            .collect();
        let mut all = HashSet::new();
        let mut total = 0;
        for h in handles {
            let seen = h.join().unwrap();
            total += seen.len();
            all.extend(seen);
        }
        assert_eq!(total, 500);
        assert_eq!(all.len(), 500);
    }
}
