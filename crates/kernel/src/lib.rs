//! World Kernel: the block-world capability the engine mutates, plus an in-memory
//! authoritative world used by the simulator and tests.
//!
//! # Invariants
//! - All block mutations flow through the `BlockWorld` operations.
//! - The in-memory world records every mutation in an append-only event log.

pub mod world;

pub use world::{BlockWorld, World, WorldError, WorldEvent};
