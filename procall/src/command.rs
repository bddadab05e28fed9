//! Command descriptors.
//!
//! A [`Command`] is an executable plus an optional subcommand and a set of
//! baked arguments. Descriptors are values: deriving a subcommand or baking
//! arguments always produces a new descriptor and leaves the original alone.
//!
//! ```rust,no_run
//! use procall::{Args, CallOptions, Command};
//!
//! #[tokio::main]
//! async fn main() -> procall::Result<()> {
//!     let ll = Command::new("ls").bake(Args::new().flag("l"));
//!     let output = ll.call(Args::new().arg("/tmp"), CallOptions::default()).await?;
//!     println!("{}", output.stdout_string().unwrap_or_default());
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::args::Args;
use crate::error::Error;
use crate::process::session::{self, Launch};
use crate::process::{parse_signal, ResultHandle, Signal, Sink};
use crate::resolve::resolve_command;

/// Invocation settings a descriptor carries into every call.
///
/// These come from the [`Shell`](crate::Shell) that created the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    pub env: HashMap<String, String>,
    pub env_remove: Vec<String>,
    pub env_clear: bool,
    pub working_dir: Option<PathBuf>,
    pub debug: bool,
}

/// Per-call options.
///
/// Environment entries extend the descriptor defaults; a working directory
/// here replaces the default one.
#[derive(Debug, Default)]
pub struct CallOptions {
    /// Bytes written to the child's stdin before it is closed.
    pub stdin: Option<Vec<u8>>,
    pub stdout: Sink,
    pub stderr: Sink,
    pub env: HashMap<String, String>,
    pub env_remove: Vec<String>,
    pub env_clear: bool,
    pub working_dir: Option<PathBuf>,
    /// Trace every state transition and chunk.
    pub debug: bool,
    /// Deliver `timeout_signal` after this long.
    pub timeout: Option<Duration>,
    /// Signal used when `timeout` elapses; `SIGTERM` when unset.
    pub timeout_signal: Option<Signal>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `input` to the child's stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Redirect stdout.
    pub fn stdout(mut self, sink: Sink) -> Self {
        self.stdout = sink;
        self
    }

    /// Redirect stderr.
    pub fn stderr(mut self, sink: Sink) -> Self {
        self.stderr = sink;
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Start from an empty environment.
    pub const fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub const fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Signal the child with `SIGTERM` (or `timeout_signal`) after `duration`.
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Pick the signal sent when the timeout elapses, by name.
    pub fn timeout_signal(mut self, name: &str) -> crate::Result<Self> {
        self.timeout_signal = Some(parse_signal(name)?);
        Ok(self)
    }
}

/// An executable with an optional subcommand and baked arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    executable: Option<PathBuf>,
    subcommand: Option<String>,
    baked: Vec<String>,
    defaults: Defaults,
}

impl Command {
    /// Resolve `name` on `PATH`.
    ///
    /// Never fails: an unresolvable name is kept as-is and reported as
    /// [`Error::NotFound`] when the command is called.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let executable = resolve_command(&name);
        Self {
            name,
            executable,
            subcommand: None,
            baked: Vec::new(),
            defaults: Defaults::default(),
        }
    }

    /// Use an explicit executable path without searching `PATH`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            executable: Some(path),
            subcommand: None,
            baked: Vec::new(),
            defaults: Defaults::default(),
        }
    }

    #[must_use]
    pub(crate) fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// The name this descriptor was created from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved executable path, if resolution succeeded.
    pub fn executable(&self) -> Option<&PathBuf> {
        self.executable.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.executable.is_some()
    }

    pub fn subcommand_name(&self) -> Option<&str> {
        self.subcommand.as_deref()
    }

    pub fn baked_args(&self) -> &[String] {
        &self.baked
    }

    pub const fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// A new descriptor for `self` with `name` as subcommand.
    ///
    /// Baked arguments are not carried over.
    #[must_use]
    pub fn subcommand(&self, name: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            executable: self.executable.clone(),
            subcommand: Some(name.into()),
            baked: Vec::new(),
            defaults: self.defaults.clone(),
        }
    }

    /// A new descriptor with `args` baked in.
    ///
    /// Baked arguments replace any previously baked ones and are appended
    /// after call-time arguments on every call.
    #[must_use]
    pub fn bake(&self, args: Args) -> Self {
        Self {
            baked: args.build(),
            ..self.clone()
        }
    }

    /// Drop all baked arguments.
    #[must_use]
    pub fn clear(mut self) -> Self {
        self.baked.clear();
        self
    }

    /// The full argument vector after argv[0] for a call with `args`.
    pub fn argv(&self, args: &Args) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(ref sub) = self.subcommand {
            argv.push(sub.clone());
        }
        argv.extend(args.build());
        argv.extend(self.baked.iter().cloned());
        argv
    }

    /// Spawn the command now.
    ///
    /// Must be called from within a tokio runtime. Resolution and spawn
    /// failures resolve the returned handle with an error.
    pub fn call(&self, args: Args, options: CallOptions) -> ResultHandle {
        match self.launch(&args, options) {
            Ok(launch) => session::start(launch),
            Err(e) => ResultHandle::failed(e),
        }
    }

    /// Run the command once `upstream` resolves, feeding its stdout as stdin.
    ///
    /// Upstream failures propagate as [`Error::Upstream`] and the command is
    /// never spawned. A redirected upstream stdout feeds an empty stdin.
    pub fn pipe(&self, upstream: ResultHandle, args: Args, options: CallOptions) -> ResultHandle {
        let mut launch = match self.launch(&args, options) {
            Ok(launch) => launch,
            Err(e) => return ResultHandle::failed(e),
        };

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let timer_tx = control_tx.clone();

        tokio::spawn(async move {
            let outcome = match upstream.await {
                Ok(output) => {
                    launch.stdin = Some(output.stdout.unwrap_or_default());
                    session::run(launch, &timer_tx, control_rx).await
                }
                Err(e) => Err(Error::Upstream(Box::new(e))),
            };
            let _ = result_tx.send(outcome);
        });

        ResultHandle::new(None, control_tx, result_rx)
    }

    pub(crate) fn launch(&self, args: &Args, options: CallOptions) -> crate::Result<Launch> {
        let executable = self
            .executable
            .clone()
            .ok_or_else(|| Error::NotFound(self.name.clone()))?;

        let mut env = self.defaults.env.clone();
        env.extend(options.env);
        let mut env_remove = self.defaults.env_remove.clone();
        env_remove.extend(options.env_remove);

        Ok(Launch {
            program: self.to_string(),
            executable,
            args: self.argv(args),
            env,
            env_remove,
            env_clear: self.defaults.env_clear || options.env_clear,
            working_dir: options.working_dir.or_else(|| self.defaults.working_dir.clone()),
            stdin: options.stdin,
            stdout: options.stdout,
            stderr: options.stderr,
            debug: self.defaults.debug || options.debug,
            timeout: options
                .timeout
                .map(|after| (after, options.timeout_signal.unwrap_or(Signal::SIGTERM))),
        })
    }
}

impl fmt::Display for Command {
    /// How the command would look typed into a shell.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.executable {
            Some(ref path) => write!(f, "{}", path.display())?,
            None => f.write_str(&self.name)?,
        }
        if let Some(ref sub) = self.subcommand {
            write!(f, " {sub}")?;
        }
        if !self.baked.is_empty() {
            write!(f, " {}", self.baked.join(" "))?;
        }
        Ok(())
    }
}
