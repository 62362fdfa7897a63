//! The path monitor: run state, batching and observer dispatch.
//!
//! # Threads
//!
//! ```text
//! source thread --EventSink--> pump thread --Executor--> observer
//!                              (quiescence    (one drain task at a time,
//!                               buffer+timer)  deliveries in order)
//! ```
//!
//! `start`/`stop`/`set_observer` may be called from any thread, including
//! from inside the observer. They only take short internal locks and never
//! wait for the pump or for a delivery in progress.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, after, bounded, never, select, unbounded};
use parking_lot::Mutex;

use super::debounce::QuiescenceBuffer;
use super::error::{ConfigError, MonitorError, SourceError};
use super::event::{ChangeEvent, ChangeKind, EventBatch, RootPathSet};
use super::executor::{Executor, InlineExecutor};
use super::notify_source::NotifySource;
use super::source::{EventSink, EventSource, SourceHandle, SourceSignal};
use crate::config::MonitorConfig;

/// Receives batches from a [`PathMonitor`].
///
/// `paths` and `flags` are index-aligned: `paths[i]` had `flags[i]`.
/// Calls are never concurrent with each other for one monitor.
pub trait PathObserver: Send + Sync {
    fn paths_changed(&self, monitor: MonitorId, paths: Vec<PathBuf>, flags: Vec<ChangeKind>);

    /// The event source died; the monitor has already stopped.
    fn source_terminated(&self, monitor: MonitorId, error: &SourceError) {
        tracing::warn!("[monitor] {monitor} stopped: {error}");
    }
}

impl<F> PathObserver for F
where
    F: Fn(MonitorId, Vec<PathBuf>, Vec<ChangeKind>) + Send + Sync,
{
    fn paths_changed(&self, monitor: MonitorId, paths: Vec<PathBuf>, flags: Vec<ChangeKind>) {
        self(monitor, paths, flags)
    }
}

/// Process-unique identity of a monitor, passed to its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(u64);

static NEXT_MONITOR: AtomicU64 = AtomicU64::new(1);

impl MonitorId {
    fn next() -> Self {
        Self(NEXT_MONITOR.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed, never started.
    Idle,
    Running,
    /// Stopped by `stop()` or by source termination. `start()` may run it again.
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorState::Idle => "idle",
            MonitorState::Running => "running",
            MonitorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Watches a set of roots and delivers debounced batches of changes.
///
/// Dropping the monitor stops it.
pub struct PathMonitor {
    shared: Arc<Shared>,
}

struct Shared {
    id: MonitorId,
    roots: RootPathSet,
    config: MonitorConfig,
    source: Arc<dyn EventSource>,
    executor: Arc<dyn Executor>,
    control: Mutex<Control>,
    observer: Mutex<Option<Weak<dyn PathObserver>>>,
    deliveries: Mutex<DeliveryQueue>,
    /// Deliveries from sessions up to this number are discarded unstarted.
    cancelled_through: AtomicU64,
}

struct Control {
    state: MonitorState,
    session: Option<Session>,
    /// Number of the most recently started session.
    sessions: u64,
}

impl Control {
    fn is_current(&self, session: u64) -> bool {
        self.state == MonitorState::Running
            && self.session.as_ref().is_some_and(|s| s.number == session)
    }
}

/// One Running period: a live source subscription plus its pump.
struct Session {
    number: u64,
    handle: SourceHandle,
    /// Dropping this disconnects the pump's shutdown channel.
    _shutdown: Sender<()>,
}

#[derive(Default)]
struct DeliveryQueue {
    pending: VecDeque<Delivery>,
    /// A drain task is scheduled or running.
    draining: bool,
}

struct Delivery {
    session: u64,
    payload: Payload,
}

enum Payload {
    Batch(EventBatch),
    Terminated(SourceError),
}

impl PathMonitor {
    /// Monitor `roots` with the platform event source and default options.
    ///
    /// Does not touch the filesystem; nothing is watched until `start`.
    pub fn new(roots: RootPathSet, executor: Arc<dyn Executor>) -> Self {
        Self::from_parts(
            roots,
            MonitorConfig::default(),
            Arc::new(NotifySource::new()),
            executor,
        )
    }

    pub fn builder() -> PathMonitorBuilder {
        PathMonitorBuilder::new()
    }

    fn from_parts(
        roots: RootPathSet,
        config: MonitorConfig,
        source: Arc<dyn EventSource>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: MonitorId::next(),
                roots,
                config,
                source,
                executor,
                control: Mutex::new(Control {
                    state: MonitorState::Idle,
                    session: None,
                    sessions: 0,
                }),
                observer: Mutex::new(None),
                deliveries: Mutex::new(DeliveryQueue::default()),
                cancelled_through: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> MonitorId {
        self.shared.id
    }

    pub fn roots(&self) -> &RootPathSet {
        &self.shared.roots
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    pub fn state(&self) -> MonitorState {
        self.shared.control.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Register the observer for subsequent deliveries.
    ///
    /// Only a weak reference is kept; the monitor never extends the
    /// observer's lifetime. A delivery already running on the previous
    /// observer completes normally.
    pub fn set_observer<O: PathObserver + 'static>(&self, observer: &Arc<O>) {
        let weak: Weak<dyn PathObserver> = Arc::downgrade(observer) as Weak<dyn PathObserver>;
        self.set_observer_weak(weak);
    }

    pub fn set_observer_weak(&self, observer: Weak<dyn PathObserver>) {
        *self.shared.observer.lock() = Some(observer);
    }

    /// Deliveries made while no observer is registered are dropped.
    pub fn clear_observer(&self) {
        *self.shared.observer.lock() = None;
    }

    /// Activate the event source and begin delivering batches.
    ///
    /// Calling `start` on a running monitor succeeds without creating a
    /// second subscription, unless `strict_start` is set. On source failure
    /// the state is left unchanged.
    pub fn start(&self) -> Result<(), MonitorError> {
        let shared = &self.shared;
        let mut control = shared.control.lock();

        if control.state == MonitorState::Running {
            if shared.config.strict_start {
                return Err(MonitorError::AlreadyRunning);
            }
            crate::debug_event!("monitor", "already running", "{}", shared.id);
            return Ok(());
        }

        let (signal_tx, signal_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = shared
            .source
            .activate(&shared.roots, EventSink::new(signal_tx))?;

        let number = control.sessions + 1;
        let pump = Pump {
            shared: Arc::downgrade(shared),
            id: shared.id,
            session: number,
            roots: shared.roots.clone(),
            include_nested: shared.config.include_nested,
            signals: signal_rx,
            shutdown: shutdown_rx,
            buffer: QuiescenceBuffer::new(shared.config.quiescence_window()),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("pathmon-pump-{}", shared.id.value()))
            .spawn(move || pump.run());
        if let Err(e) = spawned {
            shared.source.deactivate(&handle);
            return Err(MonitorError::WorkerSpawn {
                reason: e.to_string(),
            });
        }

        control.sessions = number;
        control.session = Some(Session {
            number,
            handle,
            _shutdown: shutdown_tx,
        });
        control.state = MonitorState::Running;

        crate::log_event!(
            "monitor",
            "started",
            "{} ({} roots via {}, quiescence {:?})",
            shared.id,
            shared.roots.len(),
            shared.source.name(),
            shared.config.quiescence_window()
        );
        Ok(())
    }

    /// Deactivate the event source and cancel undelivered batches.
    ///
    /// A no-op unless running. A delivery already executing is not
    /// interrupted. Safe to call from inside the observer.
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut control = shared.control.lock();
        if control.state != MonitorState::Running {
            return;
        }

        control.state = MonitorState::Stopped;
        if let Some(session) = control.session.take() {
            shared
                .cancelled_through
                .fetch_max(session.number, Ordering::AcqRel);
            shared.source.deactivate(&session.handle);
        }

        let dropped = {
            let mut queue = shared.deliveries.lock();
            let dropped = queue.pending.len();
            queue.pending.clear();
            dropped
        };
        drop(control);

        if dropped > 0 {
            crate::debug_event!("monitor", "cancelled", "{dropped} pending deliveries");
        }
        crate::log_event!("monitor", "stopped", "{}", shared.id);
    }
}

impl Drop for PathMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for PathMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMonitor")
            .field("id", &self.shared.id)
            .field("roots", &self.shared.roots)
            .field("state", &self.state())
            .field("source", &self.shared.source.name())
            .finish()
    }
}

impl Shared {
    /// Queue deliveries produced by `session`, if it is still current.
    fn enqueue(self: &Arc<Self>, session: u64, batch: EventBatch) {
        let schedule = {
            let control = self.control.lock();
            if !control.is_current(session) {
                crate::debug_event!(
                    "monitor",
                    "discarded",
                    "{} events from ended session",
                    batch.len()
                );
                return;
            }
            let mut queue = self.deliveries.lock();
            queue.pending.push_back(Delivery {
                session,
                payload: Payload::Batch(batch),
            });
            !std::mem::replace(&mut queue.draining, true)
        };

        if schedule {
            self.schedule_drain();
        }
    }

    /// The source died under `session`: flush what was buffered, report the
    /// error and move to `Stopped`.
    fn terminate(self: &Arc<Self>, session: u64, pending: Option<EventBatch>, error: SourceError) {
        let schedule = {
            let mut control = self.control.lock();
            if !control.is_current(session) {
                return;
            }
            control.state = MonitorState::Stopped;
            if let Some(ended) = control.session.take() {
                self.source.deactivate(&ended.handle);
            }

            let mut queue = self.deliveries.lock();
            if let Some(batch) = pending {
                queue.pending.push_back(Delivery {
                    session,
                    payload: Payload::Batch(batch),
                });
            }
            queue.pending.push_back(Delivery {
                session,
                payload: Payload::Terminated(error.clone()),
            });
            !std::mem::replace(&mut queue.draining, true)
        };

        tracing::warn!("[monitor] {} source terminated: {error}", self.id);

        if schedule {
            self.schedule_drain();
        }
    }

    fn schedule_drain(self: &Arc<Self>) {
        let guard = DrainGuard {
            shared: Arc::downgrade(self),
            armed: true,
        };
        let task = Box::new(move || {
            let mut guard = guard;
            if let Some(shared) = guard.shared.upgrade() {
                shared.drain();
            }
            guard.armed = false;
        });

        // A refused task is dropped unrun, which the guard handles.
        let _ = self.executor.submit(task);
    }

    /// The drain task will never run: discard what it would have delivered
    /// so later batches can schedule a fresh one.
    fn abandon_drain(&self) {
        let dropped = {
            let mut queue = self.deliveries.lock();
            let dropped = queue.pending.len();
            queue.pending.clear();
            queue.draining = false;
            dropped
        };
        crate::debug_event!(
            "monitor",
            "execution context closed",
            "{} dropped {dropped} deliveries",
            self.id
        );
    }

    /// Deliver queued batches one at a time, in order.
    fn drain(&self) {
        loop {
            let delivery = {
                let mut queue = self.deliveries.lock();
                match queue.pending.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            let observer = self.observer.lock().as_ref().and_then(Weak::upgrade);
            let Some(observer) = observer else {
                crate::debug_event!("monitor", "no live observer", "{} dropped delivery", self.id);
                continue;
            };

            // Checked last so a stop() that returned before this point is
            // honoured. A delivery past this check has begun.
            if delivery.session <= self.cancelled_through.load(Ordering::Acquire) {
                continue;
            }

            match delivery.payload {
                Payload::Batch(batch) => {
                    crate::debug_event!(
                        "monitor",
                        "delivering",
                        "{} events for {}",
                        batch.len(),
                        self.id
                    );
                    let (paths, flags) = batch.into_parts();
                    observer.paths_changed(self.id, paths, flags);
                }
                Payload::Terminated(error) => observer.source_terminated(self.id, &error),
            }
        }
    }
}

/// Travels with a scheduled drain task. If the executor drops the task
/// without running it (refused, runtime shut down, observer panicked), the
/// queue is released instead of staying marked as draining forever.
struct DrainGuard {
    shared: Weak<Shared>,
    armed: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.abandon_drain();
        }
    }
}

enum Step {
    Shutdown,
    /// `None` when every sink has been dropped.
    Signal(Option<SourceSignal>),
    Tick,
}

/// Per-session loop between the source and the delivery queue.
struct Pump {
    shared: Weak<Shared>,
    id: MonitorId,
    session: u64,
    roots: RootPathSet,
    include_nested: bool,
    signals: Receiver<SourceSignal>,
    shutdown: Receiver<()>,
    buffer: QuiescenceBuffer,
}

impl Pump {
    fn run(mut self) {
        crate::debug_event!("monitor", "pump running", "{} session {}", self.id, self.session);

        loop {
            let timer = match self.buffer.deadline() {
                Some(deadline) => after(deadline.saturating_duration_since(Instant::now())),
                None => never(),
            };

            let step = select! {
                recv(self.shutdown) -> _ => Step::Shutdown,
                recv(self.signals) -> signal => Step::Signal(signal.ok()),
                recv(timer) -> _ => Step::Tick,
            };

            match step {
                Step::Shutdown => break,
                Step::Signal(Some(SourceSignal::Event(event))) => self.accept(event),
                Step::Signal(Some(SourceSignal::Terminated(error))) => {
                    self.terminate(error);
                    break;
                }
                Step::Signal(None) => {
                    self.terminate(SourceError::Terminated {
                        reason: "event source closed its sink".to_string(),
                    });
                    break;
                }
                Step::Tick => {
                    let Some(batch) = self.buffer.take(Instant::now()) else {
                        continue;
                    };
                    let Some(shared) = self.shared.upgrade() else {
                        break;
                    };
                    shared.enqueue(self.session, batch);
                }
            }
        }

        crate::debug_event!("monitor", "pump exited", "{} session {}", self.id, self.session);
    }

    fn accept(&mut self, event: ChangeEvent) {
        if !self.include_nested
            && self
                .roots
                .depth_of(event.path())
                .is_some_and(|depth| depth > 1)
        {
            tracing::trace!("[monitor] skipped nested {event}");
            return;
        }
        self.buffer.push(event, Instant::now());
    }

    fn terminate(&mut self, error: SourceError) {
        if let Some(shared) = self.shared.upgrade() {
            let pending = self.buffer.take_now();
            shared.terminate(self.session, pending, error);
        }
    }
}

/// Builder for a [`PathMonitor`].
pub struct PathMonitorBuilder {
    roots: Vec<PathBuf>,
    config: MonitorConfig,
    source: Option<Arc<dyn EventSource>>,
    executor: Option<Arc<dyn Executor>>,
    observer: Option<Weak<dyn PathObserver>>,
}

impl PathMonitorBuilder {
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            config: MonitorConfig::default(),
            source: None,
            executor: None,
            observer: None,
        }
    }

    /// Add a root. Order is preserved.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    pub fn roots<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Rounded up to whole milliseconds; saturates at `u64::MAX`.
    pub fn quiescence(mut self, window: Duration) -> Self {
        self.config.quiescence_ms =
            u64::try_from(window.as_micros().div_ceil(1000)).unwrap_or(u64::MAX);
        self
    }

    pub fn strict_start(mut self, strict: bool) -> Self {
        self.config.strict_start = strict;
        self
    }

    /// When false, only roots and their direct children are reported.
    pub fn include_nested(mut self, include: bool) -> Self {
        self.config.include_nested = include;
        self
    }

    /// Defaults to [`NotifySource`].
    pub fn source<S: EventSource + 'static>(mut self, source: Arc<S>) -> Self {
        self.source = Some(source);
        self
    }

    /// Defaults to [`InlineExecutor`], which calls the observer on the
    /// monitor's own pump thread.
    pub fn executor<E: Executor + 'static>(mut self, executor: Arc<E>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn observer<O: PathObserver + 'static>(mut self, observer: &Arc<O>) -> Self {
        self.observer = Some(Arc::downgrade(observer) as Weak<dyn PathObserver>);
        self
    }

    pub fn build(self) -> Result<PathMonitor, ConfigError> {
        let roots = RootPathSet::new(self.roots)?;
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(NotifySource::new()) as Arc<dyn EventSource>);
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(InlineExecutor) as Arc<dyn Executor>);

        let monitor = PathMonitor::from_parts(roots, self.config, source, executor);
        if let Some(observer) = self.observer {
            monitor.set_observer_weak(observer);
        }
        Ok(monitor)
    }
}

impl Default for PathMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
