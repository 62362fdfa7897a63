#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use pathmon::{ChangeKind, MonitorId, PathObserver, SourceError};

/// One observer callback as seen by a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Batch {
        monitor: MonitorId,
        paths: Vec<PathBuf>,
        flags: Vec<ChangeKind>,
    },
    Terminated {
        monitor: MonitorId,
        error: SourceError,
    },
}

/// Observer that forwards every callback into a channel.
pub struct Recorder {
    tx: Sender<Seen>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, Receiver<Seen>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl PathObserver for Recorder {
    fn paths_changed(&self, monitor: MonitorId, paths: Vec<PathBuf>, flags: Vec<ChangeKind>) {
        let _ = self.tx.send(Seen::Batch {
            monitor,
            paths,
            flags,
        });
    }

    fn source_terminated(&self, monitor: MonitorId, error: &SourceError) {
        let _ = self.tx.send(Seen::Terminated {
            monitor,
            error: error.clone(),
        });
    }
}

/// Generous upper bound for anything that should happen.
pub const EVENTUALLY: Duration = Duration::from_secs(3);

pub fn next_batch(rx: &Receiver<Seen>) -> (Vec<PathBuf>, Vec<ChangeKind>) {
    match rx.recv_timeout(EVENTUALLY) {
        Ok(Seen::Batch { paths, flags, .. }) => (paths, flags),
        Ok(other) => panic!("expected a batch, got {other:?}"),
        Err(e) => panic!("no batch delivered: {e}"),
    }
}

pub fn assert_quiet(rx: &Receiver<Seen>, for_: Duration) {
    if let Ok(seen) = rx.recv_timeout(for_) {
        panic!("unexpected delivery: {seen:?}");
    }
}
