//! Error types for command invocation.

use std::path::PathBuf;

use thiserror::Error;

/// The stage of an invocation in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Looking up the executable or the command name.
    Resolution,
    /// Asking the OS to create the child process.
    Spawn,
    /// Anything after the child was created.
    Runtime,
}

/// Errors surfaced by descriptors, sessions and result handles.
#[derive(Debug, Error)]
pub enum Error {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("'{0}' is a reserved name and cannot be used as a command")]
    Reserved(String),

    #[error("failed to spawn process {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("process is no longer running")]
    NotRunning,

    #[error("upstream command failed: {0}")]
    Upstream(#[source] Box<Error>),

    #[error("session ended without delivering a result")]
    SessionLost,

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Which phase of the invocation this error belongs to.
    ///
    /// Upstream failures report the phase of the command that actually failed.
    pub fn phase(&self) -> Phase {
        match self {
            Self::NotFound(_) | Self::Reserved(_) | Self::ConfigRead { .. } | Self::ConfigParse { .. } => {
                Phase::Resolution
            }
            Self::Spawn { .. } => Phase::Spawn,
            Self::Upstream(inner) => inner.phase(),
            Self::UnknownSignal(_) | Self::NotRunning | Self::SessionLost => Phase::Runtime,
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
