use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a loaded world (dimension) on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub Uuid);

impl WorldId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorldId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic identifier assigned to each captured explosion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExplosionId(pub u64);

impl fmt::Display for ExplosionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Integer block coordinate inside a specific world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: WorldId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            z: self.z.saturating_add(dz),
            ..self
        }
    }

    /// Chunk column containing this block (16x16 columns).
    pub fn chunk(&self) -> (i32, i32) {
        (self.x >> 4, self.z >> 4)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Precise location of an event, e.g. the centre of an explosion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: WorldId,
    pub position: DVec3,
}

impl Location {
    pub fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self {
            world,
            position: DVec3::new(x, y, z),
        }
    }

    /// The block containing this location.
    pub fn block_pos(&self) -> BlockPos {
        let p = self.position.floor();
        BlockPos::new(self.world, p.x as i32, p.y as i32, p.z as i32)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ ({:.1}, {:.1}, {:.1})",
            self.world, self.position.x, self.position.y, self.position.z
        )
    }
}

/// A material name did not match the `[A-Z0-9_]+` identifier grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid material: {0:?}")]
pub struct InvalidMaterial(pub String);

/// Head and skull blocks with their wall-mounted counterparts.
const WALL_PAIRS: [(&str, &str); 7] = [
    ("PLAYER_HEAD", "PLAYER_WALL_HEAD"),
    ("ZOMBIE_HEAD", "ZOMBIE_WALL_HEAD"),
    ("CREEPER_HEAD", "CREEPER_WALL_HEAD"),
    ("DRAGON_HEAD", "DRAGON_WALL_HEAD"),
    ("PIGLIN_HEAD", "PIGLIN_WALL_HEAD"),
    ("SKELETON_SKULL", "SKELETON_WALL_SKULL"),
    ("WITHER_SKELETON_SKULL", "WITHER_SKELETON_WALL_SKULL"),
];

/// Block material identifier, normalized to upper case (`OAK_PLANKS`).
///
/// Accepts `minecraft:oak_planks`, `oak_planks` and `OAK_PLANKS` alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Material(String);

impl Material {
    pub fn parse(raw: &str) -> Result<Self, InvalidMaterial> {
        let trimmed = raw.trim();
        let name = trimmed
            .strip_prefix("minecraft:")
            .unwrap_or(trimmed)
            .to_ascii_uppercase();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
        if valid {
            Ok(Self(name))
        } else {
            Err(InvalidMaterial(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_air(&self) -> bool {
        matches!(self.0.as_str(), "AIR" | "CAVE_AIR" | "VOID_AIR")
    }

    /// The floor/wall counterpart of a head or skull material, if any.
    ///
    /// The relation is symmetric: `PLAYER_HEAD` pairs with `PLAYER_WALL_HEAD`
    /// and vice versa.
    pub fn wall_pair(&self) -> Option<Material> {
        WALL_PAIRS.iter().find_map(|(floor, wall)| {
            if self.0 == *floor {
                Some(Material((*wall).to_string()))
            } else if self.0 == *wall {
                Some(Material((*floor).to_string()))
            } else {
                None
            }
        })
    }
}

impl TryFrom<String> for Material {
    type Error = InvalidMaterial;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Material> for String {
    fn from(value: Material) -> Self {
        value.0
    }
}

impl std::str::FromStr for Material {
    type Err = InvalidMaterial;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque extra block state (orientation, contents, ...) owned by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState(pub Vec<u8>);

impl BlockState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for BlockState {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

/// Everything needed to place a block exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    pub material: Material,
    pub state: BlockState,
    /// True for blocks without collision (torches, rails, redstone, signs).
    pub passable: bool,
}

impl BlockData {
    pub fn solid(material: Material) -> Self {
        Self {
            material,
            state: BlockState::empty(),
            passable: false,
        }
    }

    pub fn passable(material: Material) -> Self {
        Self {
            material,
            state: BlockState::empty(),
            passable: true,
        }
    }

    pub fn with_state(mut self, state: BlockState) -> Self {
        self.state = state;
        self
    }
}
