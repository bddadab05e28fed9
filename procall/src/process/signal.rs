//! Signal names and exit status.

use std::fmt;
use std::os::unix::process::ExitStatusExt;

pub use nix::sys::signal::Signal;

use crate::error::{Error, Result};

/// Parse a signal given by name or number.
///
/// Accepts `KILL`, `SIGKILL`, `kill` and `9` alike.
pub fn parse_signal(name: &str) -> Result<Signal> {
    let trimmed = name.trim();

    if let Ok(num) = trimmed.parse::<i32>() {
        return Signal::try_from(num).map_err(|_| Error::UnknownSignal(name.to_string()));
    }

    let upper = trimmed.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };

    full.parse::<Signal>()
        .map_err(|_| Error::UnknownSignal(name.to_string()))
}

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Normal exit with a code.
    Exited(i32),
    /// Terminated by a signal, kept as the raw number so realtime signals
    /// without a [`Signal`] variant are still reported.
    Signaled(i32),
}

impl Status {
    pub(crate) fn from_exit_status(status: std::process::ExitStatus) -> Self {
        match status.signal() {
            Some(n) => Self::Signaled(n),
            None => Self::Exited(status.code().unwrap_or(0)),
        }
    }

    pub const fn killed_by(signal: Signal) -> Self {
        Self::Signaled(signal as i32)
    }

    /// Exit code, if the process exited normally.
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }

    /// Terminating signal number, if any.
    pub const fn signal_number(self) -> Option<i32> {
        match self {
            Self::Exited(_) => None,
            Self::Signaled(n) => Some(n),
        }
    }

    /// Terminating signal, if it is one `nix` knows by name.
    pub fn signal(self) -> Option<Signal> {
        self.signal_number().and_then(|n| Signal::try_from(n).ok())
    }

    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "{code}"),
            Self::Signaled(n) => match Signal::try_from(*n) {
                Ok(sig) => f.write_str(sig.as_str()),
                Err(_) => write!(f, "signal {n}"),
            },
        }
    }
}
