//! The handle returned by every invocation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use super::signal::{parse_signal, Signal, Status};
use crate::args::Args;
use crate::command::{CallOptions, Command};
use crate::error::{Error, Result};

/// Final result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Exit code or terminating signal.
    pub status: Status,
    /// Captured stdout, or `None` when it was redirected.
    pub stdout: Option<Vec<u8>>,
    /// Captured stderr, or `None` when it was redirected.
    pub stderr: Option<Vec<u8>>,
}

impl Output {
    pub const fn success(&self) -> bool {
        self.status.success()
    }

    /// Captured stdout as (lossy) UTF-8.
    pub fn stdout_string(&self) -> Option<String> {
        self.stdout.as_deref().map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Captured stderr as (lossy) UTF-8.
    pub fn stderr_string(&self) -> Option<String> {
        self.stderr.as_deref().map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// A pending invocation.
///
/// Await it to get the [`Output`]. While the process is alive,
/// [`ResultHandle::signal`] forwards signals to it through its session.
#[must_use = "a result handle does nothing unless awaited"]
pub struct ResultHandle {
    pid: Option<u32>,
    control: mpsc::UnboundedSender<Signal>,
    result: oneshot::Receiver<Result<Output>>,
}

impl ResultHandle {
    pub(crate) const fn new(
        pid: Option<u32>,
        control: mpsc::UnboundedSender<Signal>,
        result: oneshot::Receiver<Result<Output>>,
    ) -> Self {
        Self {
            pid,
            control,
            result,
        }
    }

    /// A handle that is already resolved with `err`.
    pub(crate) fn failed(err: Error) -> Self {
        let (control, _) = mpsc::unbounded_channel();
        let (tx, result) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(None, control, result)
    }

    /// OS process id of the child, when it was spawned eagerly.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Send a signal by name (`TERM`, `SIGKILL`, `9`, ...).
    ///
    /// Fails with [`Error::UnknownSignal`] for unrecognized names and with
    /// [`Error::NotRunning`] once the process has exited. The signal reaches
    /// the child's whole process group.
    pub fn signal(&self, name: &str) -> Result<()> {
        self.send_signal(parse_signal(name)?)
    }

    /// Send an already-parsed signal.
    pub fn send_signal(&self, signal: Signal) -> Result<()> {
        self.control.send(signal).map_err(|_| Error::NotRunning)
    }

    /// Feed this handle's stdout into `next`.
    pub fn pipe(self, next: &Command) -> Self {
        next.pipe(self, Args::new(), CallOptions::default())
    }
}

impl Future for ResultHandle {
    type Output = Result<Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::SessionLost)))
    }
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("pid", &self.pid)
            .field("running", &!self.control.is_closed())
            .finish_non_exhaustive()
    }
}
