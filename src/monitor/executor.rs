//! Execution contexts for observer callbacks.
//!
//! The monitor never calls its observer on the source's notification
//! thread. Deliveries are submitted as tasks to a caller-supplied
//! [`Executor`] instead.

use std::thread::JoinHandle;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;

use super::error::ExecutorClosed;

/// A unit of work submitted to an execution context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs tasks.
pub trait Executor: Send + Sync {
    /// Queue `task` for execution.
    ///
    /// Fails once the context has been torn down.
    fn submit(&self, task: Task) -> Result<(), ExecutorClosed>;
}

/// A single worker thread running tasks in submission order.
pub struct SerialQueue {
    label: String,
    sender: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    /// Spawn the worker thread.
    pub fn new(label: impl Into<String>) -> std::io::Result<Self> {
        let label = label.into();
        let (tx, rx) = unbounded::<Task>();

        let worker = std::thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                for task in rx {
                    task();
                }
            })?;

        crate::debug_event!("executor", "spawned", "{label}");

        Ok(Self {
            label,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            crate::debug_event!("executor", "closed", "{}", self.label);
        }
    }

    /// Close the queue and wait for queued tasks to finish.
    ///
    /// Must not be called from a task running on this queue.
    pub fn join(&self) {
        self.close();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::warn!("[executor] worker {} panicked", self.label);
            }
        }
    }
}

impl Executor for SerialQueue {
    fn submit(&self, task: Task) -> Result<(), ExecutorClosed> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(task).map_err(|_| ExecutorClosed),
            None => Err(ExecutorClosed),
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}

/// Runs tasks on tokio's blocking pool.
///
/// Observer callbacks are synchronous, so they go through `spawn_blocking`
/// rather than occupying an async worker.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn submit(&self, task: Task) -> Result<(), ExecutorClosed> {
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

/// Runs each task immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn submit(&self, task: Task) -> Result<(), ExecutorClosed> {
        task();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_serial_queue_runs_in_order() {
        let queue = SerialQueue::new("test-serial").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let seen = seen.clone();
            queue
                .submit(Box::new(move || {
                    seen.lock().push(i);
                }))
                .unwrap();
        }

        queue.join();
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_closed_queue_rejects_work() {
        let queue = SerialQueue::new("test-closed").unwrap();
        queue.close();
        assert_eq!(queue.submit(Box::new(|| {})), Err(ExecutorClosed));
    }

    #[test]
    fn test_inline_executor_runs_immediately() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        InlineExecutor
            .submit(Box::new(move || *flag.lock() = true))
            .unwrap();
        assert!(*ran.lock());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_executor_runs_task() {
        let executor = TokioExecutor::current().expect("inside a runtime");
        let (tx, rx) = crossbeam_channel::bounded(1);
        executor
            .submit(Box::new(move || {
                let _ = tx.send(std::thread::current().name().map(str::to_string));
            }))
            .unwrap();

        let received = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(received.is_ok());
    }

    #[test]
    fn test_tokio_current_outside_runtime() {
        assert!(TokioExecutor::current().is_none());
    }
}
