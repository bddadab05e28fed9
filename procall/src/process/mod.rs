//! Process sessions and their handles.
//!
//! Every invocation is driven by a session task that owns the child and
//! its output sinks, and is observed through a [`ResultHandle`].

mod handle;
mod pool;
pub(crate) mod session;
mod signal;
mod sink;

pub use handle::{Output, ResultHandle};
pub use pool::{PoolEvent, PooledProcess, ProcessId, ProcessPool};
pub use session::SessionState;
pub use signal::{parse_signal, Signal, Status};
pub use sink::{ChunkCallback, Sink};
