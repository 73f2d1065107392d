//! Throttled execution of the highlight operation.
//!
//! At most one run is pending per [`Throttle`]. Scheduling again replaces the
//! pending run, so rapid updates collapse onto the latest input while runs keep
//! a steady cadence anchored to scheduling time.

use crate::constants::TRACE_TARGET;
use crate::error::HighlightError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::error;

/// Receives failures of scheduled operations.
pub type ErrorReporter = Arc<dyn Fn(HighlightError) + Send + Sync>;

/// Timer state owned by one [`Throttle`].
#[derive(Debug, Default)]
pub struct TimeoutState {
    pub pending: Option<JoinHandle<()>>,
    /// Earliest instant the next run may start; `None` before the first run.
    pub next_allowed: Option<Instant>,
    generation: u64,
}

/// Rate limiter for one binding's highlight operation.
pub struct Throttle {
    state: Arc<Mutex<TimeoutState>>,
    reporter: ErrorReporter,
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle").field("state", &self.state).finish()
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

fn log_failure(err: HighlightError) {
    error!(
        target: TRACE_TARGET,
        event = "operation_failed",
        error = %err,
        "scheduled highlight failed"
    );
}

impl Throttle {
    /// Throttle that logs operation failures.
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(log_failure))
    }

    pub fn with_reporter(reporter: ErrorReporter) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimeoutState::default())),
            reporter,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, TimeoutState>, HighlightError> {
        self.state.lock().map_err(|_| HighlightError::Poisoned)
    }

    /// Schedule `operation`, replacing any run still waiting for its timer.
    ///
    /// The delay is the time left until the next allowed run, or zero. When the
    /// timer fires the next allowed run moves to `now + min_interval`, where
    /// `now` is captured here, and the operation is spawned detached.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// - `operation`: Produces the run's future; errors go to the reporter.
    /// - `min_interval`: Minimum spacing between run starts.
    ///
    /// # Errors
    /// Returns [`HighlightError::Poisoned`] when timer state is poisoned.
    pub fn schedule<F, Fut>(
        &self,
        operation: F,
        min_interval: Duration,
    ) -> Result<(), HighlightError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HighlightError>> + Send + 'static,
    {
        let now = Instant::now();
        let mut state = self.state()?;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let delay = state
            .next_allowed
            .map(|next| next.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        let shared = Arc::clone(&self.state);
        let reporter = Arc::clone(&self.reporter);
        state.pending = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep_until(now + delay).await;
            }
            match shared.lock() {
                // Superseded after the timer fired but before the abort landed.
                Ok(state) if state.generation != generation => return,
                Ok(mut state) => {
                    state.next_allowed = Some(now + min_interval);
                    state.pending = None;
                }
                Err(_) => {
                    reporter(HighlightError::Poisoned);
                    return;
                }
            }
            tokio::spawn(async move {
                if let Err(err) = operation().await {
                    reporter(err);
                }
            });
        }));
        Ok(())
    }

    /// Whether a run is waiting for its timer.
    pub fn is_pending(&self) -> bool {
        self.state()
            .map(|state| state.pending.is_some())
            .unwrap_or(false)
    }

    /// Abort the pending run, if any. Runs already started are not affected.
    pub fn cancel(&self) {
        if let Ok(mut state) = self.state() {
            state.generation = state.generation.wrapping_add(1);
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
        }
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.cancel();
    }
}
