use blastmend_common::{BlockData, BlockPos, BlockState, ExplosionId, Location, Material};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Pre-destruction state of one block. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pos: BlockPos,
    data: BlockData,
}

impl BlockSnapshot {
    pub fn capture(pos: BlockPos, data: BlockData) -> Self {
        Self { pos, data }
    }

    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    pub fn material(&self) -> &Material {
        &self.data.material
    }

    pub fn state(&self) -> &BlockState {
        &self.data.state
    }

    pub fn passable(&self) -> bool {
        self.data.passable
    }

    /// The block exactly as it was before the explosion.
    pub fn data(&self) -> &BlockData {
        &self.data
    }
}

/// All recoverable blocks destroyed by one explosion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    id: ExplosionId,
    location: Location,
    source: String,
    captured_at: DateTime<Utc>,
    snapshots: Vec<BlockSnapshot>,
}

impl Explosion {
    /// Capture an explosion from its recoverable blocks.
    ///
    /// Duplicate positions collapse to the first occurrence. Solid blocks are
    /// ordered before passable ones so restoration rebuilds supports first;
    /// relative order is otherwise preserved.
    pub fn capture<I>(id: ExplosionId, location: Location, source: &str, blocks: I) -> Self
    where
        I: IntoIterator<Item = (BlockPos, BlockData)>,
    {
        let mut seen = HashSet::new();
        let (solid, passable): (Vec<_>, Vec<_>) = blocks
            .into_iter()
            .filter(|(pos, _)| seen.insert(*pos))
            .map(|(pos, data)| BlockSnapshot::capture(pos, data))
            .partition(|s| !s.passable());
        let mut snapshots = solid;
        snapshots.extend(passable);
        Self {
            id,
            location,
            source: source.to_owned(),
            captured_at: Utc::now(),
            snapshots,
        }
    }

    pub fn id(&self) -> ExplosionId {
        self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Entity type that caused the explosion.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn snapshots(&self) -> &[BlockSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Same explosion restricted to snapshots from `from` onwards.
    pub(crate) fn remainder(&self, from: usize) -> Self {
        Self {
            snapshots: self.snapshots.get(from..).unwrap_or_default().to_vec(),
            source: self.source.clone(),
            ..*self
        }
    }
}
