//! Hand-driven event source.
//!
//! Lets callers inject events without touching the filesystem: useful in
//! tests and for bridging producers that are not native notification
//! streams (a sync protocol replaying remote changes, for example).

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::error::SourceError;
use super::event::{ChangeEvent, ChangeKind, RootPathSet};
use super::source::{EventSink, EventSource, SourceHandle};

#[derive(Debug, Default)]
struct ManualState {
    /// Live subscriptions by handle.
    active: HashMap<SourceHandle, ActiveSubscription>,
    /// Error returned by the next `activate` call, if armed.
    fail_next: Option<SourceError>,
    activations: usize,
}

#[derive(Debug)]
struct ActiveSubscription {
    roots: RootPathSet,
    sink: EventSink,
}

/// An [`EventSource`] whose events are supplied by the caller.
#[derive(Debug, Default)]
pub struct ManualSource {
    state: Mutex<ManualState>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `activate` call fail with `error`.
    pub fn fail_next_activation(&self, error: SourceError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Deliver an event to every live subscription.
    ///
    /// Returns the number of subscriptions that accepted it.
    pub fn emit(&self, path: impl Into<PathBuf>, flags: ChangeKind) -> usize {
        self.emit_event(ChangeEvent::new(path, flags))
    }

    pub fn emit_event(&self, event: ChangeEvent) -> usize {
        let state = self.state.lock();
        state
            .active
            .values()
            .filter(|sub| sub.sink.emit(event.clone()))
            .count()
    }

    /// Kill every live subscription with `error`.
    ///
    /// Subscriptions stay registered until their owner deactivates them,
    /// mirroring a native stream that died underneath its handle.
    pub fn terminate(&self, error: SourceError) {
        let state = self.state.lock();
        for sub in state.active.values() {
            sub.sink.terminate(error.clone());
        }
    }

    /// Number of subscriptions not yet deactivated.
    pub fn active_handles(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Successful activations over the source's lifetime.
    pub fn activation_count(&self) -> usize {
        self.state.lock().activations
    }

    /// Roots of every live subscription.
    pub fn active_roots(&self) -> Vec<RootPathSet> {
        self.state
            .lock()
            .active
            .values()
            .map(|sub| sub.roots.clone())
            .collect()
    }
}

impl EventSource for ManualSource {
    fn name(&self) -> &str {
        "manual"
    }

    fn activate(&self, roots: &RootPathSet, sink: EventSink) -> Result<SourceHandle, SourceError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        let handle = SourceHandle::next();
        state.active.insert(
            handle,
            ActiveSubscription {
                roots: roots.clone(),
                sink,
            },
        );
        state.activations += 1;
        Ok(handle)
    }

    fn deactivate(&self, handle: &SourceHandle) {
        self.state.lock().active.remove(handle);
    }
}
