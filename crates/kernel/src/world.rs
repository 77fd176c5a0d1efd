use blastmend_common::{BlockData, BlockPos, WorldId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Errors a host world reports when a block cannot be read or written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The chunk holding the position is not loaded. Transient; the block is skipped.
    #[error("chunk containing {pos} is not loaded")]
    ChunkUnloaded { pos: BlockPos },
    /// The world itself is gone (unloaded or deleted).
    #[error("world {0} is not available")]
    WorldUnavailable(WorldId),
}

/// Block-level access to the host's authoritative world.
///
/// Implementations are only ever called from the host's world context.
/// Air is represented as `None`.
pub trait BlockWorld {
    /// Read the block at `pos`.
    fn block(&self, pos: BlockPos) -> Result<Option<BlockData>, WorldError>;

    /// Place `data` at `pos`, overwriting whatever is there.
    fn set_block(&mut self, pos: BlockPos, data: BlockData) -> Result<(), WorldError>;

    /// Replace the block at `pos` with air without drops or physics. Returns what was there.
    fn clear_block(&mut self, pos: BlockPos) -> Result<Option<BlockData>, WorldError>;
}

/// An event record produced by every mutation to the in-memory world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// Block placed. `old` is what it replaced.
    BlockSet {
        pos: BlockPos,
        old: Option<BlockData>,
        new: BlockData,
    },
    /// Block removed. Carries the data it had.
    BlockCleared { pos: BlockPos, old: BlockData },
    /// The host advanced one game tick.
    Stepped { tick: u64 },
}

/// The in-memory authoritative world.
///
/// Holds blocks for any number of worlds, keyed by position. Chunks can be
/// marked unloaded to reproduce the host refusing access to a region.
///
/// Uses BTreeMap for deterministic iteration order across all platforms.
#[derive(Debug, Clone, Default)]
pub struct World {
    blocks: BTreeMap<BlockPos, BlockData>,
    worlds: BTreeSet<WorldId>,
    unloaded_chunks: BTreeSet<(WorldId, i32, i32)>,
    tick: u64,
    /// Append-only event log of all mutations.
    event_log: Vec<WorldEvent>,
}

impl World {
    /// Create a host with no worlds at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a world so positions inside it become addressable.
    pub fn add_world(&mut self, id: WorldId) {
        self.worlds.insert(id);
    }

    /// Remove a world and every block in it.
    pub fn remove_world(&mut self, id: WorldId) {
        self.worlds.remove(&id);
        self.blocks.retain(|pos, _| pos.world != id);
        self.unloaded_chunks.retain(|(w, _, _)| *w != id);
        tracing::debug!(world = %id, "world removed");
    }

    pub fn has_world(&self, id: WorldId) -> bool {
        self.worlds.contains(&id)
    }

    /// Mark the chunk column containing `pos` unloaded.
    pub fn unload_chunk(&mut self, pos: BlockPos) {
        let (cx, cz) = pos.chunk();
        self.unloaded_chunks.insert((pos.world, cx, cz));
    }

    /// Mark the chunk column containing `pos` loaded again.
    pub fn load_chunk(&mut self, pos: BlockPos) {
        let (cx, cz) = pos.chunk();
        self.unloaded_chunks.remove(&(pos.world, cx, cz));
    }

    /// Current host tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance the host by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.event_log.push(WorldEvent::Stepped { tick: self.tick });
    }

    /// Number of non-air blocks across all worlds.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Read-only access to all blocks (BTreeMap for deterministic iteration).
    pub fn blocks(&self) -> &BTreeMap<BlockPos, BlockData> {
        &self.blocks
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    /// Compute a deterministic hash of the block state for comparison.
    /// Uses canonical (BTreeMap) iteration order; the tick is not included.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325; // FNV offset basis
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        for (pos, data) in &self.blocks {
            mix(&mut h, pos.world.0.as_bytes());
            mix(&mut h, &pos.x.to_le_bytes());
            mix(&mut h, &pos.y.to_le_bytes());
            mix(&mut h, &pos.z.to_le_bytes());
            mix(&mut h, data.material.as_str().as_bytes());
            mix(&mut h, data.state.as_bytes());
            mix(&mut h, &[u8::from(data.passable)]);
        }
        h
    }

    fn check_access(&self, pos: BlockPos) -> Result<(), WorldError> {
        if !self.worlds.contains(&pos.world) {
            return Err(WorldError::WorldUnavailable(pos.world));
        }
        let (cx, cz) = pos.chunk();
        if self.unloaded_chunks.contains(&(pos.world, cx, cz)) {
            return Err(WorldError::ChunkUnloaded { pos });
        }
        Ok(())
    }
}

impl BlockWorld for World {
    fn block(&self, pos: BlockPos) -> Result<Option<BlockData>, WorldError> {
        self.check_access(pos)?;
        Ok(self.blocks.get(&pos).cloned())
    }

    fn set_block(&mut self, pos: BlockPos, data: BlockData) -> Result<(), WorldError> {
        self.check_access(pos)?;
        if data.material.is_air() {
            self.clear_block(pos)?;
            return Ok(());
        }
        let old = self.blocks.insert(pos, data.clone());
        self.event_log.push(WorldEvent::BlockSet {
            pos,
            old,
            new: data,
        });
        Ok(())
    }

    fn clear_block(&mut self, pos: BlockPos) -> Result<Option<BlockData>, WorldError> {
        self.check_access(pos)?;
        let old = self.blocks.remove(&pos);
        if let Some(ref d) = old {
            self.event_log.push(WorldEvent::BlockCleared {
                pos,
                old: d.clone(),
            });
        }
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastmend_common::Material;

    fn stone() -> BlockData {
        BlockData::solid(Material::parse("STONE").unwrap())
    }

    fn world_with_id() -> (World, WorldId) {
        let mut w = World::new();
        let id = WorldId::new();
        w.add_world(id);
        (w, id)
    }

    #[test]
    fn world_starts_empty() {
        let w = World::new();
        assert_eq!(w.tick(), 0);
        assert_eq!(w.block_count(), 0);
    }

    #[test]
    fn set_and_clear_block() {
        let (mut w, id) = world_with_id();
        let pos = BlockPos::new(id, 1, 64, 1);
        w.set_block(pos, stone()).unwrap();
        assert_eq!(w.block(pos).unwrap(), Some(stone()));

        let old = w.clear_block(pos).unwrap();
        assert_eq!(old, Some(stone()));
        assert_eq!(w.block(pos).unwrap(), None);
        assert_eq!(w.block_count(), 0);
    }

    #[test]
    fn setting_air_clears() {
        let (mut w, id) = world_with_id();
        let pos = BlockPos::new(id, 0, 0, 0);
        w.set_block(pos, stone()).unwrap();
        w.set_block(pos, BlockData::solid(Material::parse("AIR").unwrap()))
            .unwrap();
        assert_eq!(w.block(pos).unwrap(), None);
    }

    #[test]
    fn step_increments_tick() {
        let mut w = World::new();
        w.step();
        w.step();
        w.step();
        assert_eq!(w.tick(), 3);
    }

    #[test]
    fn unknown_world_is_unavailable() {
        let mut w = World::new();
        let pos = BlockPos::new(WorldId::new(), 0, 0, 0);
        assert_eq!(
            w.set_block(pos, stone()),
            Err(WorldError::WorldUnavailable(pos.world))
        );
    }

    #[test]
    fn unloaded_chunk_rejects_access() {
        let (mut w, id) = world_with_id();
        let pos = BlockPos::new(id, 20, 70, -3);
        w.unload_chunk(pos);
        assert_eq!(w.block(pos), Err(WorldError::ChunkUnloaded { pos }));

        // Neighbouring chunk is unaffected.
        let other = BlockPos::new(id, 0, 70, -3);
        assert!(w.set_block(other, stone()).is_ok());

        w.load_chunk(pos);
        assert!(w.set_block(pos, stone()).is_ok());
    }

    #[test]
    fn remove_world_drops_blocks() {
        let (mut w, id) = world_with_id();
        w.set_block(BlockPos::new(id, 0, 0, 0), stone()).unwrap();
        w.remove_world(id);
        assert_eq!(w.block_count(), 0);
        assert!(!w.has_world(id));
    }

    #[test]
    fn events_are_recorded() {
        let (mut w, id) = world_with_id();
        let pos = BlockPos::new(id, 0, 0, 0);
        w.set_block(pos, stone()).unwrap();
        w.step();
        w.clear_block(pos).unwrap();
        // Clearing air is not an event.
        w.clear_block(pos).unwrap();
        assert_eq!(w.events().len(), 3);
    }

    #[test]
    fn drain_events_clears_log() {
        let (mut w, id) = world_with_id();
        w.set_block(BlockPos::new(id, 0, 0, 0), stone()).unwrap();
        let events = w.drain_events();
        assert_eq!(events.len(), 1);
        assert!(w.events().is_empty());
    }

    #[test]
    fn state_hash_tracks_blocks() {
        let (mut w1, id) = world_with_id();
        let mut w2 = World::new();
        w2.add_world(id);
        let pos = BlockPos::new(id, 4, 5, 6);
        w1.set_block(pos, stone()).unwrap();
        w2.set_block(pos, stone()).unwrap();
        assert_eq!(w1.state_hash(), w2.state_hash());

        w2.set_block(pos, BlockData::solid(Material::parse("DIRT").unwrap()))
            .unwrap();
        assert_ne!(w1.state_hash(), w2.state_hash());
    }

    #[test]
    fn btreemap_gives_deterministic_iteration() {
        let (mut w, id) = world_with_id();
        for i in (0..50).rev() {
            w.set_block(BlockPos::new(id, i, 0, 0), stone()).unwrap();
        }
        let keys: Vec<BlockPos> = w.blocks().keys().copied().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
