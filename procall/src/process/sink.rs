//! Output sinks.
//!
//! Every chunk read from a child's stdout or stderr is handed to a sink.
//! Only the default [`Sink::Capture`] keeps the data; every other kind
//! forwards it and reports no final value.

use std::fmt;
use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Per-chunk callback.
pub type ChunkCallback = Box<dyn FnMut(&[u8]) -> io::Result<()> + Send>;

/// Destination for one output stream.
#[derive(Default)]
pub enum Sink {
    /// Accumulate in memory and report the joined bytes at resolution.
    #[default]
    Capture,
    /// Open (create or truncate) this file for binary write.
    Path(PathBuf),
    /// Write every chunk to an async writer.
    Writer(Box<dyn AsyncWrite + Send + Unpin>),
    /// Resolve with the first chunk only; later chunks are ignored.
    Future(oneshot::Sender<Vec<u8>>),
    /// Push every chunk onto a queue.
    Queue(mpsc::UnboundedSender<Vec<u8>>),
    /// Invoke a callback with every chunk.
    Callback(ChunkCallback),
}

impl Sink {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::Writer(Box::new(writer))
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: FnMut(&[u8]) -> io::Result<()> + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// A single-shot sink and the receiver that gets the first chunk.
    pub fn future() -> (Self, oneshot::Receiver<Vec<u8>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Future(tx), rx)
    }

    /// A queue sink and a stream of the chunks pushed onto it.
    ///
    /// The stream ends once the session resolves.
    pub fn queue() -> (Self, UnboundedReceiverStream<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Queue(tx), UnboundedReceiverStream::new(rx))
    }

    pub const fn is_capture(&self) -> bool {
        matches!(self, Self::Capture)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => f.write_str("Capture"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Writer(_) => f.write_str("Writer"),
            Self::Future(_) => f.write_str("Future"),
            Self::Queue(_) => f.write_str("Queue"),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// A sink bound to a running session.
pub(crate) enum SinkState {
    Capture(Vec<u8>),
    Writer(Box<dyn AsyncWrite + Send + Unpin>),
    Future(Option<oneshot::Sender<Vec<u8>>>),
    Queue(mpsc::UnboundedSender<Vec<u8>>),
    Callback(ChunkCallback),
    /// Redirected, but the target failed; chunks are dropped.
    Disabled,
}

impl SinkState {
    /// Bind a sink, opening path targets.
    ///
    /// A path that cannot be opened yields a disabled sink rather than an
    /// error so the session can still report the exit status.
    pub(crate) async fn open(sink: Sink) -> Self {
        match sink {
            Sink::Capture => Self::Capture(Vec::new()),
            Sink::Path(path) => match tokio::fs::File::create(&path).await {
                Ok(file) => Self::Writer(Box::new(file)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to open output file");
                    Self::Disabled
                }
            },
            Sink::Writer(writer) => Self::Writer(writer),
            Sink::Future(tx) => Self::Future(Some(tx)),
            Sink::Queue(tx) => Self::Queue(tx),
            Sink::Callback(cb) => Self::Callback(cb),
        }
    }

    /// Hand one chunk to the sink.
    pub(crate) async fn deliver(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Self::Capture(buf) => buf.extend_from_slice(chunk),
            Self::Writer(writer) => writer.write_all(chunk).await?,
            Self::Future(slot) => {
                if let Some(tx) = slot.take() {
                    // A dropped receiver just means nobody is listening.
                    let _ = tx.send(chunk.to_vec());
                }
            }
            Self::Queue(tx) => tx
                .send(chunk.to_vec())
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "queue receiver dropped"))?,
            Self::Callback(cb) => (*cb)(chunk)?,
            Self::Disabled => {}
        }
        Ok(())
    }

    /// Close the sink and return the captured bytes, if it captures.
    pub(crate) async fn close(self) -> Option<Vec<u8>> {
        match self {
            Self::Capture(buf) => Some(buf),
            Self::Writer(mut writer) => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!(error = %e, "failed to close output writer");
                }
                None
            }
            Self::Future(_) | Self::Queue(_) | Self::Callback(_) | Self::Disabled => None,
        }
    }
}
