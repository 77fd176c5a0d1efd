//! Policy Gate: decides, per explosion and per block, whether recovery applies.
//!
//! # Invariants
//! - The gate never mutates the world.
//! - Always-protected materials are filtered before any region query.
//! - A failing region provider degrades to "recovery applies"; it never blocks recovery.

mod gate;
mod region;
mod static_index;

pub use gate::{GateReason, PolicyDecision, PolicyGate, Resolution, RECOVERY_FLAG, TNT_FLAG};
pub use region::{FlagValue, IntegrationError, NoRegions, RecoveryFlag, RegionProvider};
pub use static_index::{RegionDef, RegionIndex, WorldRegions};
