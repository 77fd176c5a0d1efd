use blastmend_common::{BlockPos, ExplosionId, Location};
use blastmend_config::ConfigStore;
use blastmend_kernel::BlockWorld;
use blastmend_policy::{GateReason, PolicyDecision, PolicyGate};
use blastmend_recovery::{Explosion, RecoveryQueue};
use std::collections::HashSet;
use std::sync::Arc;

/// An explosion as reported by the host, before any block is destroyed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplosionEvent {
    /// Entity type that exploded (`CREEPER`, `PRIMED_TNT`, ...).
    pub source: String,
    pub location: Location,
    /// Positions the host is about to destroy. Rewritten by the listener to
    /// the positions the host should still destroy itself.
    pub blocks: Vec<BlockPos>,
}

/// What the listener did with one explosion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplosionOutcome {
    /// Id of the queued explosion, if anything was recoverable.
    pub explosion: Option<ExplosionId>,
    /// `None` when recovery is switched off.
    pub gate: Option<GateReason>,
    pub protected: usize,
    pub blacklisted: usize,
    pub blocked: usize,
    pub captured: usize,
    /// Positions the listener cleared, in clearing order.
    pub cleared: Vec<BlockPos>,
}

/// Turns host explosion events into queued recoveries.
///
/// Runs synchronously on the world context.
#[derive(Debug, Clone)]
pub struct ExplosionListener {
    config: Arc<ConfigStore>,
    gate: PolicyGate,
    queue: Arc<RecoveryQueue>,
}

impl ExplosionListener {
    pub fn new(config: Arc<ConfigStore>, gate: PolicyGate, queue: Arc<RecoveryQueue>) -> Self {
        Self {
            config,
            gate,
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<RecoveryQueue> {
        &self.queue
    }

    /// Filter, capture and clear the blocks of one explosion.
    ///
    /// Protected blocks are dropped from `event.blocks` and left standing.
    /// Recoverable blocks are snapshotted, queued and cleared here without
    /// drops. Everything else stays in `event.blocks` for the host to destroy.
    pub fn handle(&self, world: &mut dyn BlockWorld, event: &mut ExplosionEvent) -> ExplosionOutcome {
        let config = self.config.snapshot();
        if !config.enabled {
            return ExplosionOutcome::default();
        }
        let trace = config.debug;
        let _span = tracing::debug_span!("explosion", source = %event.source, at = %event.location)
            .entered();

        let mut present = Vec::with_capacity(event.blocks.len());
        for &pos in &event.blocks {
            match world.block(pos) {
                Ok(Some(data)) => present.push((pos, data)),
                Ok(None) => {}
                Err(err) => tracing::debug!(%pos, %err, "cannot read block, leaving it to the host"),
            }
        }

        let resolution = self.gate.resolve(
            &config,
            &event.source,
            &event.location,
            present.iter().map(|(_, data)| &data.material),
        );
        debug_trace!(
            trace,
            source = %event.source,
            location = %event.location,
            blocks = present.len(),
            provider = self.gate.provider_name(),
            "recovery gate: {}",
            resolution.gate
        );

        let mut outcome = ExplosionOutcome {
            gate: Some(resolution.gate),
            ..ExplosionOutcome::default()
        };
        let mut kept = HashSet::new();
        let mut recoverable = Vec::new();
        for ((pos, data), decision) in present.into_iter().zip(&resolution.decisions) {
            match decision {
                PolicyDecision::AlwaysProtected => {
                    debug_trace!(trace, %pos, material = %data.material, "protected block kept");
                    outcome.protected += 1;
                    kept.insert(pos);
                }
                PolicyDecision::Blacklisted => {
                    debug_trace!(trace, %pos, material = %data.material, "blacklisted block left to the host");
                    outcome.blacklisted += 1;
                }
                PolicyDecision::RecoveryBlocked => outcome.blocked += 1,
                PolicyDecision::Recoverable => recoverable.push((pos, data)),
            }
        }

        if !recoverable.is_empty() {
            let explosion = Explosion::capture(
                self.queue.allocate_id(),
                event.location,
                &event.source,
                recoverable,
            );
            // Passable blocks go first so nothing loses its support and drops.
            let snapshots = explosion.snapshots();
            let order = snapshots
                .iter()
                .filter(|s| s.passable())
                .chain(snapshots.iter().filter(|s| !s.passable()))
                .map(|s| s.pos());
            for pos in order {
                match world.clear_block(pos) {
                    Ok(_) => {
                        outcome.cleared.push(pos);
                        kept.insert(pos);
                    }
                    Err(err) => tracing::warn!(%pos, %err, "failed to clear captured block"),
                }
            }
            outcome.explosion = Some(explosion.id());
            outcome.captured = explosion.len();
            debug_trace!(
                trace,
                id = %explosion.id(),
                captured = explosion.len(),
                "explosion captured"
            );
            self.queue.push(explosion);
        }

        event.blocks.retain(|pos| !kept.contains(pos));
        tracing::debug!(
            protected = outcome.protected,
            blacklisted = outcome.blacklisted,
            blocked = outcome.blocked,
            captured = outcome.captured,
            "explosion handled"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastmend_common::{BlockData, Material, WorldId};
    use blastmend_config::RecoverConfig;
    use blastmend_kernel::World;
    use blastmend_policy::{FlagValue, RECOVERY_FLAG, RegionIndex, WorldRegions};

    fn mat(name: &str) -> Material {
        Material::parse(name).unwrap()
    }

    struct Fixture {
        world: World,
        id: WorldId,
        queue: Arc<RecoveryQueue>,
        listener: ExplosionListener,
    }

    fn fixture_with(config: RecoverConfig, gate: impl FnOnce(WorldId) -> PolicyGate) -> Fixture {
        let mut world = World::new();
        let id = WorldId::new();
        world.add_world(id);
        let queue = Arc::new(RecoveryQueue::new());
        let listener = ExplosionListener::new(
            Arc::new(ConfigStore::in_memory(config)),
            gate(id),
            Arc::clone(&queue),
        );
        Fixture {
            world,
            id,
            queue,
            listener,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecoverConfig::default(), |_| PolicyGate::without_regions())
    }

    impl Fixture {
        fn place(&mut self, x: i32, data: BlockData) -> BlockPos {
            let pos = BlockPos::new(self.id, x, 64, 0);
            self.world.set_block(pos, data).unwrap();
            pos
        }

        fn event(&self, blocks: Vec<BlockPos>) -> ExplosionEvent {
            ExplosionEvent {
                source: "CREEPER".into(),
                location: Location::new(self.id, 0.5, 64.0, 0.5),
                blocks,
            }
        }
    }

    #[test]
    fn splits_protected_blacklisted_and_recoverable() {
        let mut f = fixture();
        let a = f.place(0, BlockData::solid(mat("PLAYER_HEAD")));
        let b = f.place(1, BlockData::solid(mat("TNT")));
        let c = f.place(2, BlockData::solid(mat("STONE")));
        let mut event = f.event(vec![a, b, c]);

        let outcome = f.listener.handle(&mut f.world, &mut event);
        assert_eq!(outcome.gate, Some(GateReason::ProviderUnavailable));
        assert_eq!(outcome.protected, 1);
        assert_eq!(outcome.blacklisted, 1);
        assert_eq!(outcome.captured, 1);
        assert_eq!(outcome.cleared, vec![c]);

        // Host destroys only the blacklisted block.
        assert_eq!(event.blocks, vec![b]);
        assert!(f.world.block(a).unwrap().is_some());
        assert!(f.world.block(c).unwrap().is_none());

        let pending = f.queue.snapshot_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].snapshots()[0].pos(), c);
        assert_eq!(pending[0].source(), "CREEPER");
    }

    #[test]
    fn disabled_leaves_event_untouched() {
        let config = RecoverConfig {
            enabled: false,
            ..RecoverConfig::default()
        };
        let mut f = fixture_with(config, |_| PolicyGate::without_regions());
        let a = f.place(0, BlockData::solid(mat("PLAYER_HEAD")));
        let c = f.place(1, BlockData::solid(mat("STONE")));
        let mut event = f.event(vec![a, c]);

        let outcome = f.listener.handle(&mut f.world, &mut event);
        assert_eq!(outcome, ExplosionOutcome::default());
        assert_eq!(event.blocks, vec![a, c]);
        assert!(f.queue.is_empty());
        assert_eq!(f.world.block_count(), 2);
    }

    #[test]
    fn passable_blocks_are_cleared_first() {
        let mut f = fixture();
        let stone = f.place(0, BlockData::solid(mat("STONE")));
        let torch = f.place(1, BlockData::passable(mat("TORCH")));
        let dirt = f.place(2, BlockData::solid(mat("DIRT")));
        let mut event = f.event(vec![stone, torch, dirt]);

        let outcome = f.listener.handle(&mut f.world, &mut event);
        assert_eq!(outcome.cleared, vec![torch, stone, dirt]);
        assert!(event.blocks.is_empty());

        // Restoration order is the reverse: supports before fixtures.
        let pending = f.queue.snapshot_pending();
        let order: Vec<BlockPos> = pending[0].snapshots().iter().map(|s| s.pos()).collect();
        assert_eq!(order, vec![stone, dirt, torch]);
    }

    #[test]
    fn denied_region_queues_nothing() {
        let mut index = RegionIndex::new();
        let config = RecoverConfig::default();
        let mut f = fixture_with(config, |_| PolicyGate::without_regions());
        index.insert_world(
            f.id,
            WorldRegions {
                global: [(RECOVERY_FLAG.to_owned(), FlagValue::Deny)].into(),
                regions: vec![],
            },
        );
        f.listener = ExplosionListener::new(
            Arc::new(ConfigStore::in_memory(RecoverConfig::default())),
            PolicyGate::new(Arc::new(index)),
            Arc::clone(&f.queue),
        );
        let a = f.place(0, BlockData::solid(mat("PLAYER_HEAD")));
        let c = f.place(1, BlockData::solid(mat("STONE")));
        let mut event = f.event(vec![a, c]);

        let outcome = f.listener.handle(&mut f.world, &mut event);
        assert_eq!(outcome.gate, Some(GateReason::FlagDeny));
        assert_eq!(outcome.blocked, 1);
        assert_eq!(outcome.explosion, None);
        assert_eq!(event.blocks, vec![c]);
        assert!(f.queue.is_empty());
        // Protected still applies under deny.
        assert!(f.world.block(a).unwrap().is_some());
    }

    #[test]
    fn air_and_unreadable_positions_stay_with_host() {
        let mut f = fixture();
        let c = f.place(0, BlockData::solid(mat("STONE")));
        let air = BlockPos::new(f.id, 1, 64, 0);
        let far = BlockPos::new(f.id, 40, 64, 0);
        f.world.set_block(far, BlockData::solid(mat("STONE"))).unwrap();
        f.world.unload_chunk(far);
        let mut event = f.event(vec![c, air, far]);

        let outcome = f.listener.handle(&mut f.world, &mut event);
        assert_eq!(outcome.captured, 1);
        assert_eq!(event.blocks, vec![air, far]);
    }

    #[test]
    fn filtered_source_is_not_recovered() {
        let config = RecoverConfig {
            sources: vec!["PRIMED_TNT".into()],
            ..RecoverConfig::default()
        };
        let mut f = fixture_with(config, |_| PolicyGate::without_regions());
        let c = f.place(0, BlockData::solid(mat("STONE")));
        let mut event = f.event(vec![c]);

        let outcome = f.listener.handle(&mut f.world, &mut event);
        assert_eq!(outcome.gate, Some(GateReason::SourceFiltered));
        assert_eq!(event.blocks, vec![c]);
        assert!(f.queue.is_empty());
    }

    #[test]
    fn explosions_get_increasing_ids() {
        let mut f = fixture();
        let a = f.place(0, BlockData::solid(mat("STONE")));
        let mut event = f.event(vec![a]);
        let first = f.listener.handle(&mut f.world, &mut event);
        let b = f.place(1, BlockData::solid(mat("STONE")));
        let mut event = f.event(vec![b]);
        let second = f.listener.handle(&mut f.world, &mut event);
        assert!(second.explosion > first.explosion);
        assert_eq!(f.queue.pending_explosions(), 2);
    }
}
