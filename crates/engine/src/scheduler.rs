use crate::context::{ContextError, WorldHandle};
use blastmend_config::{ConfigStore, RecoverConfig};
use blastmend_recovery::{
    DrainLimit, DrainReport, RecoveryQueue, Stats, StatsSink, restore_batch,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Drives restoration from async tasks.
///
/// Work items are taken off the queue here and applied on the world context
/// through the [`WorldHandle`]. The drain guard keeps drains from interleaving.
#[derive(Debug)]
pub struct RecoveryScheduler {
    queue: Arc<RecoveryQueue>,
    stats: Arc<Stats>,
    world: WorldHandle,
    drain_guard: Mutex<()>,
}

impl RecoveryScheduler {
    pub fn new(queue: Arc<RecoveryQueue>, stats: Arc<Stats>, world: WorldHandle) -> Self {
        Self {
            queue,
            stats,
            world,
            drain_guard: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &Arc<RecoveryQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// True once the host dropped its pump; drains can no longer run.
    pub fn context_closed(&self) -> bool {
        self.world.is_closed()
    }

    /// Restore up to `limit` pending blocks in FIFO order.
    ///
    /// If the world context goes away before the batch is applied, the taken
    /// items go back to the head of the queue and the error is returned.
    pub async fn drain(&self, limit: DrainLimit) -> Result<DrainReport, ContextError> {
        let _guard = self.drain_guard.lock().await;
        let items = self.queue.take(limit);
        if items.is_empty() {
            return Ok(DrainReport::default());
        }
        let items = Arc::new(items);
        let batch = Arc::clone(&items);
        let outcomes = match self.world.run(move |world| restore_batch(world, &batch)).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                tracing::error!(%err, taken = items.len(), "drain aborted, batch requeued");
                self.queue.requeue_front(Arc::unwrap_or_clone(items));
                return Err(err);
            }
        };
        let report = DrainReport::settle(&items, &outcomes, &self.stats);
        tracing::debug!(
            ?limit,
            restored = report.restored,
            failed = report.failed,
            discarded = report.discarded,
            remaining = self.queue.pending_blocks(),
            "drain finished"
        );
        Ok(report)
    }

    /// Periodic drain with the configured batch size.
    ///
    /// Both rate limits are re-read on every tick, so a config reload takes
    /// effect without a restart. A new interval starts counting from the tick
    /// that noticed it.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        config: Arc<ConfigStore>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut every = drain_interval(&config.snapshot());
        tokio::spawn(async move {
            let mut ticker = skipping_interval(Instant::now(), every);
            tracing::info!(interval_ms = every.as_millis() as u64, "recovery scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let current = config.snapshot();
                        let wanted = drain_interval(&current);
                        if wanted != every {
                            tracing::info!(
                                from_ms = every.as_millis() as u64,
                                to_ms = wanted.as_millis() as u64,
                                "recovery interval changed"
                            );
                            every = wanted;
                            ticker = skipping_interval(Instant::now() + every, every);
                        }
                        if scheduler.queue.is_empty() {
                            continue;
                        }
                        let batch = current.recovery.blocks_per_run;
                        if let Err(err) = scheduler.drain(DrainLimit::Count(batch)).await {
                            tracing::warn!(%err, "periodic drain stopped");
                            break;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("recovery scheduler stopped");
        })
    }

    /// Periodic stats report. The first flush happens one interval after spawn.
    pub fn spawn_stats_ticker<S>(
        &self,
        sink: S,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()>
    where
        S: StatsSink + Send + 'static,
    {
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let mut ticker = skipping_interval(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        stats.tick(&sink);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn drain_interval(config: &RecoverConfig) -> Duration {
    Duration::from_millis(config.recovery.interval_ms.max(1))
}

fn skipping_interval(start: Instant, every: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(start, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
