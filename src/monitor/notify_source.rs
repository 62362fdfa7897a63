//! Platform event source backed by `notify`.
//!
//! One `notify::RecommendedWatcher` per subscription, with a recursive
//! watch on every root. Each path of each native event becomes one
//! [`ChangeEvent`], forwarded in the order the platform reported it.

use std::collections::HashMap;
use std::path::PathBuf;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::error::SourceError;
use super::event::{ChangeEvent, ChangeKind, RootPathSet};
use super::source::{EventSink, EventSource, SourceHandle};

/// [`EventSource`] for the current platform (inotify, FSEvents, ReadDirectoryChangesW, ...).
#[derive(Default)]
pub struct NotifySource {
    /// The watchers are kept alive here; dropping one ends its subscription.
    watchers: Mutex<HashMap<SourceHandle, RecommendedWatcher>>,
}

impl NotifySource {
    /// Does not touch the OS until `activate`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn active_handles(&self) -> usize {
        self.watchers.lock().len()
    }
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource")
            .field("active", &self.active_handles())
            .finish()
    }
}

impl EventSource for NotifySource {
    fn name(&self) -> &str {
        "notify"
    }

    fn activate(&self, roots: &RootPathSet, sink: EventSink) -> Result<SourceHandle, SourceError> {
        let rescan_roots: Vec<PathBuf> = roots.iter().map(PathBuf::from).collect();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => forward_event(&sink, &rescan_roots, event),
                Err(e) => sink.terminate(SourceError::Terminated {
                    reason: e.to_string(),
                }),
            }
        })
        .map_err(|e| SourceError::Unavailable {
            reason: e.to_string(),
        })?;

        // On failure the partially configured watcher is dropped, which
        // releases the roots already registered.
        for root in roots.iter() {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| SourceError::from_notify(root, e))?;
            crate::debug_event!("notify", "watching", "{}", root.display());
        }

        let handle = SourceHandle::next();
        self.watchers.lock().insert(handle, watcher);
        Ok(handle)
    }

    fn deactivate(&self, handle: &SourceHandle) {
        // Drop outside the lock: tearing down a native watcher may block
        // briefly on its event thread.
        let watcher = self.watchers.lock().remove(handle);
        if watcher.is_some() {
            crate::debug_event!("notify", "released", "handle {}", handle.id());
        }
    }
}

/// Translate one native event and push it into `sink`.
fn forward_event(sink: &EventSink, roots: &[PathBuf], event: Event) {
    let mut flags = change_kind(&event.kind);
    if event.need_rescan() {
        flags |= ChangeKind::MUST_SCAN;
    }

    if event.paths.is_empty() {
        // Overflow notices carry no path; report them against every root.
        if flags.contains(ChangeKind::MUST_SCAN) {
            for root in roots {
                sink.emit(ChangeEvent::new(root.clone(), flags));
            }
        }
        return;
    }

    for path in event.paths {
        sink.emit(ChangeEvent::new(path, flags));
    }
}

/// Map a `notify` event kind onto change flags.
pub(crate) fn change_kind(kind: &EventKind) -> ChangeKind {
    match kind {
        EventKind::Create(_) => ChangeKind::CREATED,
        EventKind::Remove(_) => ChangeKind::REMOVED,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::RENAMED,
        EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::METADATA,
        EventKind::Modify(_) => ChangeKind::MODIFIED,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            ChangeKind::ACCESSED | ChangeKind::MODIFIED
        }
        EventKind::Access(_) => ChangeKind::ACCESSED,
        EventKind::Any | EventKind::Other => ChangeKind::OTHER,
    }
}
