//! Persistence for recovery state that must outlive the process.
//!
//! # Invariants
//! - Stats and pending files carry a schema version; a mismatch fails closed.
//! - The pending file is verified against its SHA-256 manifest before decoding.
//! - A missing file means "nothing persisted yet", never an error.
//! - Files are replaced atomically (write to a sibling, then rename).
//! - An unreadable file is only ever moved aside, never overwritten in place.

mod pending;
mod stats;
mod store;

pub use pending::{PendingManifest, PendingStore};
pub use stats::{StatsFile, StatsStore};
pub use store::StoreError;
