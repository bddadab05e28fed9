//! procall - call external programs like async functions.
//!
//! Invoking a [`Command`] spawns the program and returns a [`ResultHandle`],
//! a future resolving to the exit [`Status`] plus captured stdout and stderr.
//! Output streams can be redirected to any [`Sink`], signals can be sent
//! while the process runs, and one invocation's output can be piped into
//! the next.
//!
//! ```rust,no_run
//! use procall::{Args, CallOptions, Shell};
//!
//! #[tokio::main]
//! async fn main() -> procall::Result<()> {
//!     let shell = Shell::new();
//!     let git = shell.command("git")?;
//!
//!     let log = git
//!         .subcommand("log")
//!         .call(Args::new().flag("oneline").named("n", 5), CallOptions::default());
//!     let count = log.pipe(&shell.command("wc")?.bake(Args::new().flag("l"))).await?;
//!
//!     println!("{}", count.stdout_string().unwrap_or_default().trim());
//!     Ok(())
//! }
//! ```
//!
//! Unix only: exit statuses and signal delivery go through POSIX signals.

pub mod args;
pub mod command;
pub mod config;
pub mod error;
pub mod process;
pub mod resolve;
pub mod shell;

pub use args::{build_arguments, Args, Value};
pub use command::{CallOptions, Command, Defaults};
pub use config::Config;
pub use error::{Error, Phase, Result};
pub use process::{
    parse_signal, Output, PoolEvent, PooledProcess, ProcessPool, ResultHandle, SessionState, Signal, Sink, Status,
};
pub use resolve::{resolve_command, which};
pub use shell::Shell;
