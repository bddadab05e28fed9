//! The command namespace.
//!
//! A [`Shell`] hands out [`Command`]s by name, carrying its default
//! invocation settings into each of them. Names in its reserved set never
//! resolve to commands.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::command::{Command, Defaults};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::resolve;

/// Names reserved by every shell.
pub const RESERVED_NAMES: &[&str] = &["cd", "pushd", "which"];

/// Factory for commands sharing the same defaults.
#[derive(Debug, Clone)]
pub struct Shell {
    defaults: Defaults,
    reserved: Arc<BTreeSet<String>>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    pub fn new() -> Self {
        Self {
            defaults: Defaults::default(),
            reserved: Arc::new(RESERVED_NAMES.iter().map(ToString::to_string).collect()),
        }
    }

    /// Build a shell from a loaded [`Config`].
    pub fn from_config(config: Config) -> Self {
        let mut reserved: BTreeSet<String> = RESERVED_NAMES.iter().map(ToString::to_string).collect();
        reserved.extend(config.reserved);

        Self {
            defaults: Defaults {
                env: config.env,
                env_remove: config.env_remove,
                env_clear: config.env_clear,
                working_dir: config.working_dir,
                debug: config.debug,
            },
            reserved: Arc::new(reserved),
        }
    }

    /// Look up a command by name.
    ///
    /// Only empty and reserved names fail here; a name that is not on `PATH`
    /// still yields a descriptor whose calls fail with [`Error::NotFound`].
    pub fn command(&self, name: &str) -> Result<Command> {
        if name.is_empty() || self.is_reserved(name) {
            return Err(Error::Reserved(name.to_string()));
        }
        Ok(Command::new(name).with_defaults(self.defaults.clone()))
    }

    /// Resolve `name` on `PATH` without creating a command.
    pub fn which(&self, name: &str) -> Option<PathBuf> {
        resolve::which(name)
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    pub const fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// A new shell that also sets `key` in every child's environment.
    #[must_use]
    pub fn with_env(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut shell = self.clone();
        shell.defaults.env.insert(key.into(), value.into());
        shell
    }

    /// A new shell whose children replace their environment with `env`.
    #[must_use]
    pub fn with_clean_env(&self, env: HashMap<String, String>) -> Self {
        let mut shell = self.clone();
        shell.defaults.env = env;
        shell.defaults.env_clear = true;
        shell
    }

    /// A new shell whose children start in `dir`.
    #[must_use]
    pub fn with_working_dir(&self, dir: impl Into<PathBuf>) -> Self {
        let mut shell = self.clone();
        shell.defaults.working_dir = Some(dir.into());
        shell
    }

    /// A new shell that traces its sessions.
    #[must_use]
    pub fn with_debug(&self, debug: bool) -> Self {
        let mut shell = self.clone();
        shell.defaults.debug = debug;
        shell
    }
}
