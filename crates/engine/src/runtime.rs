//! Startup and shutdown of the recovery engine.

use crate::command::CommandHandler;
use crate::context::WorldHandle;
use crate::listener::ExplosionListener;
use crate::scheduler::RecoveryScheduler;
use blastmend_common::WorldId;
use blastmend_config::{ConfigError, ConfigStore, RecoverConfig, RegionProviderKind, ShutdownMode};
use blastmend_persist::{PendingStore, StatsStore, StoreError};
use blastmend_policy::{NoRegions, PolicyGate, RegionIndex, RegionProvider};
use blastmend_recovery::{DrainLimit, RecoveryQueue, Stats, StatsSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Where the engine keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub config: PathBuf,
    pub stats: PathBuf,
    pub pending_dir: PathBuf,
}

impl RuntimePaths {
    /// `config.yml`, `stats.json` and the pending files, all inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            config: dir.join("config.yml"),
            stats: dir.join("stats.json"),
            pending_dir: dir.to_path_buf(),
        }
    }

    /// Resolve a path from the config file relative to the config's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.config
            .parent()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

/// What shutdown did with the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub mode: ShutdownMode,
    pub restored: usize,
    pub persisted_explosions: usize,
    pub stats: StatsSnapshot,
}

/// The assembled engine: config, policy, queue, scheduler and their tasks.
#[derive(Debug)]
pub struct Runtime {
    paths: RuntimePaths,
    config: Arc<ConfigStore>,
    queue: Arc<RecoveryQueue>,
    stats: Arc<Stats>,
    scheduler: Arc<RecoveryScheduler>,
    listener: ExplosionListener,
    commands: CommandHandler,
    stats_store: StatsStore,
    pending_store: PendingStore,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Load configuration, counters and leftover pending explosions.
    ///
    /// No background task runs until [`Runtime::start`].
    pub fn assemble(paths: RuntimePaths, world: WorldHandle) -> Result<Self, RuntimeError> {
        let config = Arc::new(ConfigStore::open(&paths.config)?);
        let snapshot = config.snapshot();
        let gate = PolicyGate::new(select_provider(&snapshot, &paths));

        let stats_store = StatsStore::new(&paths.stats);
        let counters = match stats_store.load() {
            Ok(counters) => counters,
            Err(err) => {
                let moved = stats_store.quarantine()?;
                tracing::warn!(
                    %err,
                    path = %paths.stats.display(),
                    moved_to = ?moved,
                    "stats not loaded, counting from zero"
                );
                StatsSnapshot::default()
            }
        };
        let stats = Arc::new(Stats::from_snapshot(counters));

        let queue = Arc::new(RecoveryQueue::new());
        let pending_store = PendingStore::new(&paths.pending_dir);
        match pending_store.load() {
            Ok(pending) if !pending.is_empty() => {
                let count = pending.len();
                for explosion in pending {
                    queue.push(explosion);
                }
                pending_store.clear()?;
                tracing::info!(
                    explosions = count,
                    blocks = queue.pending_blocks(),
                    "resumed pending restorations"
                );
            }
            Ok(_) => {}
            Err(err) => {
                let moved = pending_store.quarantine()?;
                tracing::warn!(%err, moved_to = ?moved, "pending restorations not loaded");
            }
        }

        let scheduler = Arc::new(RecoveryScheduler::new(
            Arc::clone(&queue),
            Arc::clone(&stats),
            world,
        ));
        let listener = ExplosionListener::new(Arc::clone(&config), gate, Arc::clone(&queue));
        let commands = CommandHandler::new(Arc::clone(&config), Arc::clone(&scheduler));
        let (shutdown_tx, _) = watch::channel(false);

        tracing::info!(
            enabled = snapshot.enabled,
            provider = ?snapshot.regions.provider,
            protected = snapshot.protected_blocks.len(),
            "recovery engine assembled"
        );
        Ok(Self {
            paths,
            config,
            queue,
            stats,
            scheduler,
            listener,
            commands,
            stats_store,
            pending_store,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    /// Spawn the periodic drain and the stats ticker. Must run inside a tokio runtime.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }
        let every = Duration::from_secs(self.config.snapshot().stats.flush_interval_secs);
        self.tasks.push(
            self.scheduler
                .spawn_periodic(Arc::clone(&self.config), self.shutdown_tx.subscribe()),
        );
        self.tasks.push(self.scheduler.spawn_stats_ticker(
            self.stats_store.clone(),
            every,
            self.shutdown_tx.subscribe(),
        ));
    }

    pub fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn queue(&self) -> &Arc<RecoveryQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn scheduler(&self) -> &Arc<RecoveryScheduler> {
        &self.scheduler
    }

    /// Listener to call from the world context for every explosion.
    pub fn listener(&self) -> &ExplosionListener {
        &self.listener
    }

    pub fn commands(&self) -> &CommandHandler {
        &self.commands
    }

    /// The host unloaded `world`; its pending restorations are discarded.
    pub fn world_removed(&self, world: WorldId) -> usize {
        self.queue.discard_world(world)
    }

    /// Stop background tasks, settle the queue per the shutdown mode and flush stats.
    ///
    /// `restore_all` needs the world context to keep pumping until this returns.
    /// If the context is gone, before or during the drain, whatever is still
    /// queued is persisted instead. Stats are saved even when settling fails.
    pub async fn shutdown(mut self) -> Result<ShutdownReport, RuntimeError> {
        // Receivers may all be gone already; the tasks then stop on their own.
        let _ = self.shutdown_tx.send(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                tracing::warn!(%err, "background task ended abnormally");
            }
        }

        let configured = self.config.snapshot().shutdown;
        let mode = match configured {
            ShutdownMode::RestoreAll if self.scheduler.context_closed() => {
                tracing::warn!("world context closed, persisting pending restorations instead");
                ShutdownMode::Persist
            }
            mode => mode,
        };
        let mut report = ShutdownReport {
            mode,
            ..ShutdownReport::default()
        };
        let settled = self.settle_queue(&mut report).await;
        report.stats = self.stats.snapshot();
        let flushed = self.stats_store.save(&report.stats);
        settled?;
        flushed?;
        tracing::info!(
            mode = ?report.mode,
            restored = report.restored,
            persisted = report.persisted_explosions,
            blocks = report.stats.blocks_recovered,
            explosions = report.stats.explosions_recovered,
            "recovery engine stopped"
        );
        Ok(report)
    }

    async fn settle_queue(&self, report: &mut ShutdownReport) -> Result<(), StoreError> {
        if report.mode == ShutdownMode::RestoreAll {
            match self.scheduler.drain(DrainLimit::Unbounded).await {
                Ok(drained) => {
                    report.restored = drained.restored;
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(%err, "restore on shutdown interrupted, persisting the rest");
                    report.mode = ShutdownMode::Persist;
                }
            }
        }
        let pending = self.queue.take_all_explosions();
        report.persisted_explosions = pending.len();
        self.pending_store.save(&pending)?;
        Ok(())
    }
}

fn select_provider(config: &RecoverConfig, paths: &RuntimePaths) -> Arc<dyn RegionProvider> {
    match config.regions.provider {
        RegionProviderKind::None => Arc::new(NoRegions),
        RegionProviderKind::Static => {
            let path = paths.resolve(&config.regions.file);
            match RegionIndex::load(&path) {
                Ok(index) => {
                    tracing::info!(
                        path = %path.display(),
                        regions = index.region_count(),
                        "static region provider loaded"
                    );
                    Arc::new(index)
                }
                Err(err) => {
                    tracing::warn!(%err, path = %path.display(), "region provider unavailable");
                    Arc::new(NoRegions)
                }
            }
        }
    }
}
