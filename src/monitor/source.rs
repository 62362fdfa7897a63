//! Event source capability consumed by the path monitor.
//!
//! A source binds a [`RootPathSet`] to one native notification stream and
//! pushes every raw notification into an [`EventSink`]. Sources do no
//! coalescing, filtering or deduplication; that policy belongs to the
//! monitor.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;

use super::error::SourceError;
use super::event::{ChangeEvent, ChangeKind, RootPathSet};

/// Platform notification capability.
pub trait EventSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Begin monitoring `roots`, reporting raw events into `sink`.
    fn activate(&self, roots: &RootPathSet, sink: EventSink) -> Result<SourceHandle, SourceError>;

    /// Release the subscription behind `handle`.
    ///
    /// Idempotent: unknown or already released handles are ignored.
    fn deactivate(&self, handle: &SourceHandle);
}

/// Opaque token for one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl SourceHandle {
    /// Allocate a process-unique handle.
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// What a source reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSignal {
    Event(ChangeEvent),
    /// The native subscription died. No further signals follow.
    Terminated(SourceError),
}

/// Producer end handed to a source on activation.
///
/// Safe to clone and use from the source's own notification thread.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<SourceSignal>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<SourceSignal>) -> Self {
        Self { tx }
    }

    /// Push one raw event.
    ///
    /// Returns false once the consumer has gone away.
    pub fn emit(&self, event: ChangeEvent) -> bool {
        self.tx.send(SourceSignal::Event(event)).is_ok()
    }

    /// Convenience for `emit(ChangeEvent::new(path, flags))`.
    pub fn emit_path(&self, path: impl Into<PathBuf>, flags: ChangeKind) -> bool {
        self.emit(ChangeEvent::new(path, flags))
    }

    /// Report a fatal error from the native layer.
    pub fn terminate(&self, error: SourceError) {
        let _ = self.tx.send(SourceSignal::Terminated(error));
    }
}
