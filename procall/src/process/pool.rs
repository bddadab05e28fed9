//! Process pool for bounding concurrent invocations.
//!
//! Sessions never share state, so running many at once is safe; the pool
//! only limits how many children exist at the same time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};

use super::handle::{Output, ResultHandle};
use super::session;
use crate::args::Args;
use crate::command::{CallOptions, Command};
use crate::error::Result;

/// A unique identifier for a pooled invocation.
pub type ProcessId = usize;

/// Event emitted by the process pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A permit was acquired and the process is being spawned.
    Started { id: ProcessId },

    /// The invocation finished (or failed to start).
    Completed { id: ProcessId, success: bool },
}

/// Handle to an invocation queued in the pool.
#[derive(Debug)]
pub struct PooledProcess {
    /// Unique ID for this invocation.
    pub id: ProcessId,

    handle: ResultHandle,
}

impl PooledProcess {
    /// Wait for the process to complete and get the result.
    pub async fn wait(self) -> Result<Output> {
        self.handle.await
    }

    /// Send a signal; queued until the process has a permit and is spawned.
    pub fn signal(&self, name: &str) -> Result<()> {
        self.handle.signal(name)
    }

    pub fn into_handle(self) -> ResultHandle {
        self.handle
    }
}

/// A pool that runs at most `max_concurrent` commands at once.
///
/// # Example
///
/// ```rust,no_run
/// use procall::{Args, CallOptions, Command, ProcessPool};
///
/// #[tokio::main]
/// async fn main() -> procall::Result<()> {
///     let pool = ProcessPool::new(4);
///     let sleep = Command::new("sleep");
///
///     let first = pool.call(&sleep, Args::new().arg("1"), CallOptions::default());
///     let second = pool.call(&sleep, Args::new().arg("2"), CallOptions::default());
///
///     println!("first: {}", first.wait().await?.status);
///     println!("second: {}", second.wait().await?.status);
///     Ok(())
/// }
/// ```
pub struct ProcessPool {
    semaphore: Arc<Semaphore>,
    next_id: AtomicUsize,
    event_tx: Option<mpsc::Sender<PoolEvent>>,
}

impl ProcessPool {
    /// Create a new process pool with the given concurrency limit.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            next_id: AtomicUsize::new(0),
            event_tx: None,
        }
    }

    /// Create a pool with an event channel for monitoring all invocations.
    pub fn with_events(max_concurrent: usize) -> (Self, mpsc::Receiver<PoolEvent>) {
        let (tx, rx) = mpsc::channel(1000);
        let pool = Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            next_id: AtomicUsize::new(0),
            event_tx: Some(tx),
        };
        (pool, rx)
    }

    /// Queue an invocation of `command`.
    ///
    /// Returns immediately; the child is spawned once a slot is free and
    /// the slot is held until its session resolves.
    pub fn call(&self, command: &Command, args: Args, options: CallOptions) -> PooledProcess {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let launch = match command.launch(&args, options) {
            Ok(launch) => launch,
            Err(e) => {
                return PooledProcess {
                    id,
                    handle: ResultHandle::failed(e),
                }
            }
        };

        let semaphore = Arc::clone(&self.semaphore);
        let event_tx = self.event_tx.clone();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let timer_tx = control_tx.clone();

        tokio::spawn(async move {
            // The semaphore is never closed, so this only waits.
            let permit = semaphore.acquire_owned().await;

            if let Some(ref tx) = event_tx {
                let _ = tx.send(PoolEvent::Started { id }).await;
            }

            let outcome = session::run(launch, &timer_tx, control_rx).await;
            drop(permit);

            if let Some(ref tx) = event_tx {
                let success = outcome.as_ref().is_ok_and(Output::success);
                let _ = tx.send(PoolEvent::Completed { id, success }).await;
            }

            let _ = result_tx.send(outcome);
        });

        PooledProcess {
            id,
            handle: ResultHandle::new(None, control_tx, result_rx),
        }
    }

    /// Run a batch and collect the results in submission order.
    pub async fn call_all<I>(&self, calls: I) -> Vec<Result<Output>>
    where
        I: IntoIterator<Item = (Command, Args, CallOptions)>,
    {
        let pending: Vec<PooledProcess> = calls
            .into_iter()
            .map(|(command, args, options)| self.call(&command, args, options))
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for process in pending {
            results.push(process.wait().await);
        }
        results
    }

    /// Get the number of available slots in the pool.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
