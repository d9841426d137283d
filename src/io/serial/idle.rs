// src/io/serial/idle.rs
//
// One-shot idle timer used by the deframer to retire a stalled partial frame.
// The timer lives inside the deframer's locked state, so arm/cancel always
// happen under the same lock as the frame buffer.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Quiet period after which a partial frame is retired
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(10);

/// Cancellable one-shot timer running on a tokio runtime.
///
/// Every `arm`/`cancel` bumps a generation number. A timer task that already
/// woke up but lost the race for the lock sees a stale generation and does
/// nothing.
pub struct IdleFlushTimer {
    runtime: Handle,
    duration: Duration,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl IdleFlushTimer {
    pub fn new(runtime: Handle, duration: Duration) -> Self {
        Self {
            runtime,
            duration,
            generation: 0,
            pending: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Arm the timer, replacing any pending one. `on_fire` receives the
    /// generation it was armed with.
    pub fn arm<F>(&mut self, on_fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let duration = self.duration;
        self.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            on_fire(generation);
        }));
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Whether a firing timer with `generation` is still the live one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.pending.is_some() && self.generation == generation
    }

    /// Mark the live timer as fired. Called from the timer task itself.
    pub fn fired(&mut self) {
        self.pending = None;
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for IdleFlushTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
