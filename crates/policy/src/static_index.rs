//! Static region provider backed by cuboid definitions in `regions.yml`.
//!
//! ```yaml
//! worlds:
//!   6f1c...:              # world uuid
//!     global:
//!       tnt: deny
//!     regions:
//!       - id: arena
//!         min: [-50, 0, -50]
//!         max: [50, 255, 50]
//!         priority: 10
//!         flags:
//!           tnt: allow
//!           explosion-recover: deny
//! ```

use crate::gate::{RECOVERY_FLAG, TNT_FLAG};
use crate::region::{FlagValue, IntegrationError, RecoveryFlag, RegionProvider};
use blastmend_common::{Location, WorldId};
use glam::IVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A cuboid protected region. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDef {
    pub id: String,
    pub min: IVec3,
    pub max: IVec3,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
}

impl RegionDef {
    pub fn contains(&self, p: IVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    fn normalized(mut self) -> Self {
        let (lo, hi) = (self.min.min(self.max), self.min.max(self.max));
        self.min = lo;
        self.max = hi;
        self
    }
}

/// Regions of one world plus the flags of its implicit global region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldRegions {
    pub global: BTreeMap<String, FlagValue>,
    pub regions: Vec<RegionDef>,
}

/// In-memory region index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionIndex {
    worlds: BTreeMap<WorldId, WorldRegions>,
}

impl RegionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load region definitions from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntegrationError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, IntegrationError> {
        let index: Self =
            serde_yaml::from_str(text).map_err(|e| IntegrationError::Load(e.to_string()))?;
        let worlds = index
            .worlds
            .into_iter()
            .map(|(id, mut world)| {
                world.regions = world.regions.into_iter().map(RegionDef::normalized).collect();
                (id, world)
            })
            .collect();
        Ok(Self { worlds })
    }

    /// Replace the regions of one world.
    pub fn insert_world(&mut self, world: WorldId, mut regions: WorldRegions) {
        regions.regions = regions.regions.into_iter().map(RegionDef::normalized).collect();
        self.worlds.insert(world, regions);
    }

    pub fn region_count(&self) -> usize {
        self.worlds.values().map(|w| w.regions.len()).sum()
    }

    /// Ids of the non-global regions containing `location`.
    pub fn regions_at(&self, location: &Location) -> Vec<&str> {
        let p = block_vec(location);
        self.worlds
            .get(&location.world)
            .map(|w| {
                w.regions
                    .iter()
                    .filter(|r| r.contains(p))
                    .map(|r| r.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Effective value of `flag` at `location`.
    ///
    /// The highest-priority region that sets the flag wins; among regions of equal
    /// priority `Deny` wins. The global region only applies when no region sets it.
    pub fn query_flag(&self, location: &Location, flag: &str) -> Option<FlagValue> {
        let world = self.worlds.get(&location.world)?;
        let p = block_vec(location);
        let mut best: Option<(i32, FlagValue)> = None;
        for region in world.regions.iter().filter(|r| r.contains(p)) {
            let Some(&value) = region.flags.get(flag) else {
                continue;
            };
            best = match best {
                None => Some((region.priority, value)),
                Some((prio, _)) if region.priority > prio => Some((region.priority, value)),
                Some((prio, _)) if region.priority == prio && value == FlagValue::Deny => {
                    Some((prio, FlagValue::Deny))
                }
                keep => keep,
            };
        }
        best.map(|(_, v)| v)
            .or_else(|| world.global.get(flag).copied())
    }
}

impl RegionProvider for RegionIndex {
    fn name(&self) -> &str {
        "static"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn query_recovery_flag(&self, location: &Location) -> Result<RecoveryFlag, IntegrationError> {
        Ok(self.query_flag(location, RECOVERY_FLAG).into())
    }

    fn tnt_allowed_in_subregion(&self, location: &Location) -> Result<bool, IntegrationError> {
        let Some(world) = self.worlds.get(&location.world) else {
            return Ok(false);
        };
        if world.global.get(TNT_FLAG) == Some(&FlagValue::Allow) {
            return Ok(false);
        }
        let p = block_vec(location);
        Ok(world
            .regions
            .iter()
            .filter(|r| r.contains(p))
            .any(|r| r.flags.get(TNT_FLAG) == Some(&FlagValue::Allow)))
    }
}

fn block_vec(location: &Location) -> IVec3 {
    let pos = location.block_pos();
    IVec3::new(pos.x, pos.y, pos.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str, priority: i32, flags: &[(&str, FlagValue)]) -> RegionDef {
        RegionDef {
            id: id.to_owned(),
            min: IVec3::new(-10, 0, -10),
            max: IVec3::new(10, 100, 10),
            priority,
            flags: flags.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
        }
    }

    fn index_with(world: WorldId, regions: WorldRegions) -> RegionIndex {
        let mut index = RegionIndex::new();
        index.insert_world(world, regions);
        index
    }

    #[test]
    fn unknown_world_is_unset() {
        let index = RegionIndex::new();
        let loc = Location::new(WorldId::new(), 0.0, 0.0, 0.0);
        assert_eq!(index.query_recovery_flag(&loc).unwrap(), RecoveryFlag::Unset);
        assert!(!index.tnt_allowed_in_subregion(&loc).unwrap());
    }

    #[test]
    fn higher_priority_wins() {
        let world = WorldId::new();
        let index = index_with(
            world,
            WorldRegions {
                global: BTreeMap::new(),
                regions: vec![
                    region("outer", 0, &[(RECOVERY_FLAG, FlagValue::Deny)]),
                    region("inner", 5, &[(RECOVERY_FLAG, FlagValue::Allow)]),
                ],
            },
        );
        let loc = Location::new(world, 1.0, 50.0, 1.0);
        assert_eq!(index.query_recovery_flag(&loc).unwrap(), RecoveryFlag::Allow);
    }

    #[test]
    fn deny_wins_at_equal_priority() {
        let world = WorldId::new();
        let index = index_with(
            world,
            WorldRegions {
                global: BTreeMap::new(),
                regions: vec![
                    region("a", 3, &[(RECOVERY_FLAG, FlagValue::Allow)]),
                    region("b", 3, &[(RECOVERY_FLAG, FlagValue::Deny)]),
                ],
            },
        );
        let loc = Location::new(world, 0.0, 10.0, 0.0);
        assert_eq!(index.query_recovery_flag(&loc).unwrap(), RecoveryFlag::Deny);
    }

    #[test]
    fn global_flag_is_fallback() {
        let world = WorldId::new();
        let index = index_with(
            world,
            WorldRegions {
                global: [(RECOVERY_FLAG.to_owned(), FlagValue::Deny)].into(),
                regions: vec![],
            },
        );
        let loc = Location::new(world, 500.0, 10.0, 500.0);
        assert_eq!(index.query_recovery_flag(&loc).unwrap(), RecoveryFlag::Deny);
    }

    #[test]
    fn tnt_lookup_ignores_global_region() {
        let world = WorldId::new();
        let index = index_with(
            world,
            WorldRegions {
                global: [(TNT_FLAG.to_owned(), FlagValue::Allow)].into(),
                regions: vec![region("arena", 0, &[(TNT_FLAG, FlagValue::Allow)])],
            },
        );
        // Global allows TNT everywhere, so the sub-region is not an opt-out.
        let loc = Location::new(world, 0.0, 10.0, 0.0);
        assert!(!index.tnt_allowed_in_subregion(&loc).unwrap());
    }

    #[test]
    fn tnt_lookup_finds_subregion_allow() {
        let world = WorldId::new();
        let index = index_with(
            world,
            WorldRegions {
                global: BTreeMap::new(),
                regions: vec![region("arena", 0, &[(TNT_FLAG, FlagValue::Allow)])],
            },
        );
        assert!(index
            .tnt_allowed_in_subregion(&Location::new(world, 0.0, 10.0, 0.0))
            .unwrap());
        assert!(!index
            .tnt_allowed_in_subregion(&Location::new(world, 50.0, 10.0, 0.0))
            .unwrap());
    }

    #[test]
    fn yaml_bounds_are_normalized() {
        let world = WorldId::new();
        let yaml = format!(
            "worlds:\n  {world}:\n    regions:\n      - id: box\n        min: [5, 5, 5]\n        max: [-5, -5, -5]\n        flags:\n          tnt: allow\n"
        );
        let index = RegionIndex::from_yaml(&yaml).unwrap();
        assert_eq!(index.region_count(), 1);
        assert_eq!(index.regions_at(&Location::new(world, 0.0, 0.0, 0.0)), vec!["box"]);
    }

    #[test]
    fn bad_yaml_is_load_error() {
        assert!(matches!(
            RegionIndex::from_yaml("worlds: [1, 2"),
            Err(IntegrationError::Load(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("regions.yml");
        std::fs::write(&path, "worlds: {}\n").unwrap();
        assert_eq!(RegionIndex::load(&path).unwrap().region_count(), 0);
        assert!(RegionIndex::load(tmp.path().join("missing.yml")).is_err());
    }
}
