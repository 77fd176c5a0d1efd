use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the recovery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub blocks_recovered: u64,
    pub explosions_recovered: u64,
}

/// Destination for periodic stats flushes.
pub trait StatsSink {
    type Error: std::fmt::Display;

    fn persist(&self, snapshot: &StatsSnapshot) -> Result<(), Self::Error>;
}

/// Process-wide recovery counters. Monotonic; there is no decrement.
#[derive(Debug, Default)]
pub struct Stats {
    blocks_recovered: AtomicU64,
    explosions_recovered: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting from previously persisted values.
    pub fn from_snapshot(snapshot: StatsSnapshot) -> Self {
        Self {
            blocks_recovered: AtomicU64::new(snapshot.blocks_recovered),
            explosions_recovered: AtomicU64::new(snapshot.explosions_recovered),
        }
    }

    pub fn record_blocks(&self, n: u64) {
        if n > 0 {
            self.blocks_recovered.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn record_explosions(&self, n: u64) {
        if n > 0 {
            self.explosions_recovered.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn blocks_recovered(&self) -> u64 {
        self.blocks_recovered.load(Ordering::Relaxed)
    }

    pub fn explosions_recovered(&self) -> u64 {
        self.explosions_recovered.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_recovered: self.blocks_recovered(),
            explosions_recovered: self.explosions_recovered(),
        }
    }

    /// Report the current counters and hand them to `sink`.
    ///
    /// A failing sink is logged and otherwise ignored; the next tick retries.
    pub fn tick<S: StatsSink>(&self, sink: &S) -> StatsSnapshot {
        let snapshot = self.snapshot();
        tracing::info!(
            blocks = snapshot.blocks_recovered,
            explosions = snapshot.explosions_recovered,
            "recovery stats"
        );
        if let Err(err) = sink.persist(&snapshot) {
            tracing::warn!(%err, "failed to persist recovery stats");
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<StatsSnapshot>>,
        fail: bool,
    }

    impl StatsSink for Recorder {
        type Error = String;

        fn persist(&self, snapshot: &StatsSnapshot) -> Result<(), String> {
            if self.fail {
                return Err("disk full".into());
            }
            self.seen.borrow_mut().push(*snapshot);
            Ok(())
        }
    }

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new();
        stats.record_blocks(3);
        stats.record_blocks(2);
        stats.record_explosions(1);
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                blocks_recovered: 5,
                explosions_recovered: 1,
            }
        );
    }

    #[test]
    fn resumes_from_snapshot() {
        let stats = Stats::from_snapshot(StatsSnapshot {
            blocks_recovered: 100,
            explosions_recovered: 4,
        });
        stats.record_blocks(1);
        assert_eq!(stats.blocks_recovered(), 101);
        assert_eq!(stats.explosions_recovered(), 4);
    }

    #[test]
    fn tick_persists_current_values() {
        let stats = Stats::new();
        let sink = Recorder::default();
        stats.record_blocks(7);
        stats.tick(&sink);
        stats.record_explosions(2);
        stats.tick(&sink);
        let seen = sink.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].blocks_recovered, 7);
        assert_eq!(seen[1].explosions_recovered, 2);
    }

    #[test]
    fn tick_survives_sink_failure() {
        let stats = Stats::new();
        stats.record_blocks(1);
        let sink = Recorder {
            fail: true,
            ..Recorder::default()
        };
        assert_eq!(stats.tick(&sink).blocks_recovered, 1);
    }
}
