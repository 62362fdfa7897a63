//! Debounced filesystem path monitoring.
//!
//! A [`PathMonitor`] watches a set of roots through an [`EventSource`],
//! coalesces bursts of raw change notifications into one batch per quiet
//! period, and hands each batch to a [`PathObserver`] on an [`Executor`]
//! chosen by the caller.
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use pathmon::{ChangeKind, MonitorId, PathMonitor, RootPathSet, SerialQueue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Arc::new(SerialQueue::new("changes")?);
//! let monitor = PathMonitor::new(RootPathSet::new(["/tmp/watched"])?, queue);
//!
//! let observer = Arc::new(|id: MonitorId, paths: Vec<PathBuf>, flags: Vec<ChangeKind>| {
//!     for (path, flags) in paths.iter().zip(&flags) {
//!         println!("{id}: {} {flags}", path.display());
//!     }
//! });
//! monitor.set_observer(&observer);
//! monitor.start()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod monitor;

pub use config::{LoggingConfig, MonitorConfig, Settings};
pub use monitor::{
    ChangeEvent, ChangeKind, ConfigError, EventBatch, EventSink, EventSource, Executor,
    ExecutorClosed, InlineExecutor, ManualSource, MonitorError, MonitorId, MonitorState,
    NotifySource, PathMonitor, PathMonitorBuilder, PathObserver, QuiescenceBuffer, RootPathSet,
    SerialQueue, SourceError, SourceHandle, SourceSignal, Task, TokioExecutor,
};
