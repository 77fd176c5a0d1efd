//! Engine: the capture → policy → scheduled-restoration pipeline wired to a host.
//!
//! # Invariants
//! - Explosion handling and block restoration only ever run on the world context.
//! - A block is snapshotted before it is cleared, and cleared before the host sees the event again.
//! - At most one drain is in flight; a drain never holds the queue lock across an await.
//! - Command failures are reported to the invoker and leave state unchanged.

/// Policy trace under the `blastmend::debug` target: `info` when the debug flag is on, `trace` otherwise.
macro_rules! debug_trace {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            tracing::info!(target: "blastmend::debug", $($arg)+)
        } else {
            tracing::trace!(target: "blastmend::debug", $($arg)+)
        }
    };
}

pub mod command;
pub mod context;
pub mod listener;
pub mod runtime;
pub mod scheduler;

pub use command::{
    CommandError, CommandHandler, CommandOutput, CommandSender, ConsoleSender, PERM_ADMIN,
    PERM_COMMAND, PERM_DEBUG, RecoverCommand, help_lines, parse_command, tab_complete,
};
pub use context::{ContextError, WorldHandle, WorldJob, WorldPump, world_channel};
pub use listener::{ExplosionEvent, ExplosionListener, ExplosionOutcome};
pub use runtime::{Runtime, RuntimeError, RuntimePaths, ShutdownReport};
pub use scheduler::RecoveryScheduler;
