//! Marshalling work onto the host's authoritative world context.
//!
//! Async tasks hold a [`WorldHandle`] and submit closures; the host owns the
//! [`WorldPump`] and runs queued jobs against its world once per tick.

use blastmend_kernel::BlockWorld;
use tokio::sync::{mpsc, oneshot};

/// A unit of work executed on the world context.
pub type WorldJob = Box<dyn FnOnce(&mut dyn BlockWorld) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The pump was dropped; the host is gone.
    #[error("world context is closed")]
    Closed,
    /// The job was dropped without running.
    #[error("world job was dropped before completing")]
    Dropped,
}

/// Create a connected handle/pump pair.
pub fn world_channel() -> (WorldHandle, WorldPump) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WorldHandle { tx }, WorldPump { rx })
}

/// Cloneable sender side, usable from any task.
#[derive(Debug, Clone)]
pub struct WorldHandle {
    tx: mpsc::UnboundedSender<WorldJob>,
}

impl WorldHandle {
    /// Run `f` on the world context and wait for its result.
    pub async fn run<R, F>(&self, f: F) -> Result<R, ContextError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn BlockWorld) -> R + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: WorldJob = Box::new(move |world: &mut dyn BlockWorld| {
            // Receiver gone means the caller stopped waiting; nothing to report.
            let _ = done_tx.send(f(world));
        });
        self.tx.send(job).map_err(|_| ContextError::Closed)?;
        done_rx.await.map_err(|_| ContextError::Dropped)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiver side, owned by whoever owns the world.
#[derive(Debug)]
pub struct WorldPump {
    rx: mpsc::UnboundedReceiver<WorldJob>,
}

impl WorldPump {
    /// Run every job queued so far. Returns how many ran.
    pub fn pump(&mut self, world: &mut dyn BlockWorld) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job(&mut *world);
            ran += 1;
        }
        ran
    }

    /// Wait for the next job. `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<WorldJob> {
        self.rx.recv().await
    }
}
