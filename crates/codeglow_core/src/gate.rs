//! Viewport-aware gate deciding when an expensive render may start.
//!
//! The gate watches intersection records for one container. Entering the
//! viewport starts a debounce window; if the container is still visible when
//! it closes, the gate waits for idle time and then opens for good. Leaving
//! the viewport cancels everything pending.

use crate::config::HighlightConfig;
use crate::constants::{
    DEFAULT_DEFER_DEBOUNCE, DEFAULT_DEFER_IDLE_TIMEOUT, DEFAULT_DEFER_ROOT_MARGIN,
    FALLBACK_IDLE_BUDGET, FALLBACK_IDLE_DELAY, MIN_IDLE_BUDGET, TRACE_TARGET,
};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRenderOptions {
    /// Open immediately and never observe.
    pub immediate: bool,
    pub debounce_delay: Duration,
    /// Margin grown around the viewport, CSS syntax (`200px`).
    pub viewport_margin: String,
    /// Upper bound on waiting for idle time.
    pub idle_timeout: Duration,
}

impl Default for DeferredRenderOptions {
    fn default() -> Self {
        Self {
            immediate: false,
            debounce_delay: DEFAULT_DEFER_DEBOUNCE,
            viewport_margin: DEFAULT_DEFER_ROOT_MARGIN.to_string(),
            idle_timeout: DEFAULT_DEFER_IDLE_TIMEOUT,
        }
    }
}

impl From<&HighlightConfig> for DeferredRenderOptions {
    fn from(config: &HighlightConfig) -> Self {
        Self {
            immediate: false,
            debounce_delay: config.defer_debounce,
            viewport_margin: config.defer_root_margin.clone(),
            idle_timeout: config.defer_idle_timeout,
        }
    }
}

/// Latest intersection observation for the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionRecord {
    pub is_intersecting: bool,
}

/// Host intersection observer bound to the gate's container.
pub trait ViewportObserver: Send + Sync {
    fn observe(&self, root_margin: &str);
    fn disconnect(&self);
}

/// What an idle callback was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleDeadline {
    pub did_timeout: bool,
    pub time_remaining: Duration,
}

/// Host idle-time callbacks.
pub trait IdleScheduler: Send + Sync {
    /// Resolve once the host is idle, or once `timeout` elapses.
    fn request_idle(&self, timeout: Duration) -> BoxFuture<'static, IdleDeadline>;
}

/// Idle approximation for hosts without idle callbacks: a short fixed delay
/// followed by a fabricated time budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackIdle;

impl IdleScheduler for FallbackIdle {
    fn request_idle(&self, _timeout: Duration) -> BoxFuture<'static, IdleDeadline> {
        Box::pin(async {
            tokio::time::sleep(FALLBACK_IDLE_DELAY).await;
            IdleDeadline {
                did_timeout: false,
                time_remaining: FALLBACK_IDLE_BUDGET,
            }
        })
    }
}

#[derive(Default)]
struct GateState {
    observer: Option<Arc<dyn ViewportObserver>>,
    latest: Option<IntersectionRecord>,
    pending: Option<JoinHandle<()>>,
    /// Bumped whenever pending work is invalidated.
    epoch: u64,
    rendered: bool,
}

impl GateState {
    fn cancel_pending(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    fn disconnect(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.disconnect();
        }
    }
}

/// One-way gate over a `should_render` flag.
pub struct RenderGate {
    options: DeferredRenderOptions,
    idle: Arc<dyn IdleScheduler>,
    state: Arc<Mutex<GateState>>,
    should_render: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for RenderGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGate")
            .field("options", &self.options)
            .field("should_render", &self.should_render())
            .finish()
    }
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl RenderGate {
    pub fn new(options: DeferredRenderOptions) -> Self {
        Self::with_idle_scheduler(options, Arc::new(FallbackIdle))
    }

    pub fn with_idle_scheduler(
        options: DeferredRenderOptions,
        idle: Arc<dyn IdleScheduler>,
    ) -> Self {
        let (should_render, _) = watch::channel(options.immediate);
        Self {
            options,
            idle,
            state: Arc::new(Mutex::new(GateState::default())),
            should_render: Arc::new(should_render),
        }
    }

    pub fn should_render(&self) -> bool {
        *self.should_render.borrow()
    }

    /// Receiver that observes the flag flipping to `true`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.should_render.subscribe()
    }

    /// Bind the gate to a container's observer and start observing.
    ///
    /// Does nothing once the gate is open. A previously attached observer is
    /// disconnected.
    pub fn attach(&self, observer: Arc<dyn ViewportObserver>) {
        if self.should_render() {
            return;
        }
        let mut state = lock(&self.state);
        state.disconnect();
        observer.observe(&self.options.viewport_margin);
        state.observer = Some(observer);
    }

    /// Feed the latest intersection record.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_intersection(&self, record: IntersectionRecord) {
        if self.should_render() {
            return;
        }
        let mut state = lock(&self.state);
        if state.rendered {
            return;
        }
        state.latest = Some(record);
        state.cancel_pending();
        if !record.is_intersecting {
            debug!(target: TRACE_TARGET, event = "gate_leave", "container left viewport");
            return;
        }
        let epoch = state.epoch;
        let shared = Arc::clone(&self.state);
        let flag = Arc::clone(&self.should_render);
        let idle = Arc::clone(&self.idle);
        let debounce = self.options.debounce_delay;
        let idle_timeout = self.options.idle_timeout;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            loop {
                {
                    let state = lock(&shared);
                    let still_visible = state
                        .latest
                        .is_some_and(|record| record.is_intersecting);
                    if state.epoch != epoch || !still_visible {
                        return;
                    }
                }
                let deadline = idle.request_idle(idle_timeout).await;
                if deadline.did_timeout || deadline.time_remaining >= MIN_IDLE_BUDGET {
                    break;
                }
            }
            let mut state = lock(&shared);
            if state.epoch != epoch || state.rendered {
                return;
            }
            state.rendered = true;
            state.pending = None;
            state.disconnect();
            flag.send_replace(true);
            debug!(target: TRACE_TARGET, event = "gate_open", "deferred render released");
        }));
    }

    /// Cancel pending work and stop observing.
    pub fn teardown(&self) {
        let mut state = lock(&self.state);
        state.cancel_pending();
        state.disconnect();
    }
}

impl Drop for RenderGate {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingObserver {
        margins: Mutex<Vec<String>>,
        disconnects: AtomicUsize,
    }

    impl ViewportObserver for RecordingObserver {
        fn observe(&self, root_margin: &str) {
            self.margins.lock().expect("margins").push(root_margin.to_string());
        }

        fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Host that never reports idle time; only the timeout releases it.
    struct BusyHost;

    impl IdleScheduler for BusyHost {
        fn request_idle(&self, timeout: Duration) -> BoxFuture<'static, IdleDeadline> {
            Box::pin(async move {
                tokio::time::sleep(timeout).await;
                IdleDeadline {
                    did_timeout: true,
                    time_remaining: Duration::ZERO,
                }
            })
        }
    }

    const ENTER: IntersectionRecord = IntersectionRecord {
        is_intersecting: true,
    };
    const LEAVE: IntersectionRecord = IntersectionRecord {
        is_intersecting: false,
    };

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_gate_is_open_and_never_observes() {
        let gate = RenderGate::new(DeferredRenderOptions {
            immediate: true,
            ..Default::default()
        });
        let observer = Arc::new(RecordingObserver::default());
        gate.attach(observer.clone());
        assert!(gate.should_render());
        assert!(observer.margins.lock().expect("margins").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn visible_container_opens_once_and_stops_observing() {
        let gate = RenderGate::new(DeferredRenderOptions::default());
        let mut updates = gate.subscribe();
        let observer = Arc::new(RecordingObserver::default());
        gate.attach(observer.clone());
        assert_eq!(*observer.margins.lock().expect("margins"), vec!["200px".to_string()]);

        gate.on_intersection(ENTER);
        tokio::time::sleep(ms(299)).await;
        assert!(!gate.should_render());

        tokio::time::sleep(ms(100)).await;
        assert!(gate.should_render());
        assert!(updates.has_changed().expect("sender alive"));
        assert!(*updates.borrow_and_update());
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 1);

        gate.on_intersection(LEAVE);
        gate.on_intersection(ENTER);
        tokio::time::sleep(ms(1_000)).await;
        assert!(gate.should_render());
        assert!(!updates.has_changed().expect("sender alive"));
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_before_debounce_never_renders() {
        let gate = RenderGate::new(DeferredRenderOptions::default());
        let observer = Arc::new(RecordingObserver::default());
        gate.attach(observer.clone());
        gate.on_intersection(ENTER);
        tokio::time::sleep(ms(150)).await;
        gate.on_intersection(LEAVE);
        tokio::time::sleep(ms(5_000)).await;
        assert!(!gate.should_render());
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_host_renders_after_idle_timeout_and_reentry_restarts() {
        let gate =
            RenderGate::with_idle_scheduler(DeferredRenderOptions::default(), Arc::new(BusyHost));
        gate.attach(Arc::new(RecordingObserver::default()));

        gate.on_intersection(ENTER);
        tokio::time::sleep(ms(400)).await;
        gate.on_intersection(LEAVE);
        tokio::time::sleep(ms(2_000)).await;
        assert!(!gate.should_render());

        gate.on_intersection(ENTER);
        tokio::time::sleep(ms(799)).await;
        assert!(!gate.should_render());
        tokio::time::sleep(ms(2)).await;
        assert!(gate.should_render());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_pending_work() {
        let gate = RenderGate::new(DeferredRenderOptions::default());
        let observer = Arc::new(RecordingObserver::default());
        gate.attach(observer.clone());
        gate.on_intersection(ENTER);
        gate.teardown();
        tokio::time::sleep(ms(2_000)).await;
        assert!(!gate.should_render());
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn options_follow_config() {
        let config = HighlightConfig {
            defer_debounce: ms(50),
            defer_root_margin: "0px".to_string(),
            ..Default::default()
        };
        let options = DeferredRenderOptions::from(&config);
        assert_eq!(options.debounce_delay, ms(50));
        assert_eq!(options.viewport_margin, "0px");
        assert_eq!(options.idle_timeout, DEFAULT_DEFER_IDLE_TIMEOUT);
    }
}
