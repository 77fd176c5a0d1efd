use blastmend_common::Material;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Top-level configuration, stored as `config.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverConfig {
    /// Master switch. When off, explosions are left entirely to the host.
    pub enabled: bool,
    /// Verbose tracing of policy decisions.
    pub debug: bool,
    /// Materials that explosions never destroy.
    pub protected_blocks: BTreeSet<Material>,
    /// Materials that explosions destroy but that are never restored.
    pub block_blacklist: BTreeSet<Material>,
    /// Explosion sources (entity types) handled by recovery. Empty means all.
    pub sources: Vec<String>,
    pub recovery: RecoverySettings,
    pub stats: StatsSettings,
    pub regions: RegionSettings,
    pub shutdown: ShutdownMode,
}

impl Default for RecoverConfig {
    fn default() -> Self {
        let materials = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| Material::parse(n).ok())
                .collect::<BTreeSet<_>>()
        };
        Self {
            enabled: true,
            debug: false,
            protected_blocks: materials(&["PLAYER_HEAD", "PLAYER_WALL_HEAD", "SPAWNER"]),
            block_blacklist: materials(&["TNT"]),
            sources: Vec::new(),
            recovery: RecoverySettings::default(),
            stats: StatsSettings::default(),
            regions: RegionSettings::default(),
            shutdown: ShutdownMode::default(),
        }
    }
}

impl RecoverConfig {
    pub fn is_protected(&self, material: &Material) -> bool {
        self.protected_blocks.contains(material)
    }

    pub fn is_blacklisted(&self, material: &Material) -> bool {
        self.block_blacklist.contains(material)
    }

    /// Whether explosions caused by `source` are handled at all.
    pub fn allows_source(&self, source: &str) -> bool {
        self.sources.is_empty() || self.sources.iter().any(|s| s.eq_ignore_ascii_case(source))
    }

    /// Check value ranges. Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.recovery.blocks_per_run == 0 {
            return Err("recovery.blocks_per_run must be at least 1".to_owned());
        }
        if self.recovery.interval_ms == 0 {
            return Err("recovery.interval_ms must be at least 1".to_owned());
        }
        if self.stats.flush_interval_secs == 0 {
            return Err("stats.flush_interval_secs must be at least 1".to_owned());
        }
        if let Some(bad) = self.sources.iter().find(|s| s.trim().is_empty()) {
            return Err(format!("sources contains an empty entry: {bad:?}"));
        }
        Ok(())
    }
}

/// Rate limits for the automatic drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Blocks restored per scheduler run.
    pub blocks_per_run: usize,
    /// Milliseconds between scheduler runs.
    pub interval_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            blocks_per_run: 1,
            interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Seconds between stats flushes.
    pub flush_interval_secs: u64,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            flush_interval_secs: 300,
        }
    }
}

/// Which region provider implementation to bind at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionProviderKind {
    #[default]
    None,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Consult the region provider at all.
    pub integration: bool,
    /// When the recovery flag is unset, skip recovery in sub-regions that allow TNT.
    pub tnt_check: bool,
    pub provider: RegionProviderKind,
    /// Region definitions for the static provider, relative to the config file.
    pub file: PathBuf,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            integration: true,
            tnt_check: true,
            provider: RegionProviderKind::None,
            file: PathBuf::from("regions.yml"),
        }
    }
}

/// What happens to pending restorations when the engine stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Restore everything before the host stops.
    #[default]
    RestoreAll,
    /// Save pending explosions and resume them on next start.
    Persist,
}
