//! Configuration: the policy sets and rate limits the engine reads on every event.
//!
//! # Invariants
//! - Readers always see a complete, validated configuration.
//! - A mutation is visible in memory only after it has been written to disk.

mod settings;
mod store;

pub use settings::{
    RecoverConfig, RecoverySettings, RegionProviderKind, RegionSettings, ShutdownMode,
    StatsSettings,
};
pub use store::{ConfigError, ConfigStore, ProtectedChange};
