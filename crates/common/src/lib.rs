//! Shared value types: world ids, block positions, materials and opaque block state.
//!
//! # Invariants
//! - A `Material` is always a normalized, upper-case identifier.
//! - A `BlockPos` is the only way blocks are addressed across crates.

mod types;

pub use types::{
    BlockData, BlockPos, BlockState, ExplosionId, InvalidMaterial, Location, Material, WorldId,
};
