//! Path monitoring with debounced batch delivery.
//!
//! # Architecture
//!
//! ```text
//! PathMonitor
//!   - run state (Idle / Running / Stopped)
//!   - QuiescenceBuffer per running session
//!   - ordered delivery queue drained on the caller's Executor
//!         |
//!    EventSource (capability)
//!    +------------+--------------+
//!    |                           |
//! NotifySource               ManualSource
//! (inotify, FSEvents, ...)   (caller-driven)
//! ```

mod debounce;
mod error;
mod event;
mod executor;
mod manual;
mod notify_source;
mod path_monitor;
mod source;

pub use debounce::QuiescenceBuffer;
pub use error::{ConfigError, ExecutorClosed, MonitorError, SourceError};
pub use event::{ChangeEvent, ChangeKind, EventBatch, RootPathSet};
pub use executor::{Executor, InlineExecutor, SerialQueue, Task, TokioExecutor};
pub use manual::ManualSource;
pub use notify_source::NotifySource;
pub use path_monitor::{MonitorId, MonitorState, PathMonitor, PathMonitorBuilder, PathObserver};
pub use source::{EventSink, EventSource, SourceHandle, SourceSignal};
